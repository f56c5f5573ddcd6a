extern crate debris_avoid as avoid;

use avoid::prelude::*;

use crate::test_data;

#[test]
fn load_tabular_config() {
    let cfg = TrainingConfig::load(test_data("training.yaml")).unwrap();
    assert_eq!(cfg.episodes, 200);
    assert_eq!(cfg.max_steps, 60);
    assert_eq!(cfg.step, 1.seconds());
    assert_eq!(cfg.actions.len(), 5);
    assert_eq!(cfg.seed, 42);
    assert!(matches!(
        cfg.estimator,
        EstimatorConfig::Tabular {
            max_entries: 50_000,
            ..
        }
    ));
    assert!(cfg.validate().is_ok());
}

#[test]
fn load_approximator_config() {
    let cfg = TrainingConfig::load(test_data("training_approximator.yaml")).unwrap();
    assert_eq!(cfg.step, 2.seconds());
    assert_eq!(cfg.actions.len(), 10);
    // Not in the file
    assert_eq!(cfg.collision_threshold_km, 1.0);
    assert_eq!(cfg.horizon(), 60.seconds());
    match &cfg.estimator {
        EstimatorConfig::Approximator {
            hidden_layers,
            replay_capacity,
            ..
        } => {
            assert_eq!(hidden_layers, &vec![24, 24]);
            assert_eq!(*replay_capacity, 15_000);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(cfg.validate().is_ok());
}

#[test]
fn missing_files() {
    assert!(matches!(
        TrainingConfig::load(test_data("does_not_exist.yaml")),
        Err(ConfigError::ReadConfig { .. })
    ));
    assert!(matches!(
        Catalog::from_state_csv(test_data("does_not_exist.csv")),
        Err(ConfigError::CatalogCsv { .. })
    ));
    assert!(matches!(
        TrainingConfig::loads("episodes: [1, 2]"),
        Err(ConfigError::ParseConfig { .. })
    ));
}

#[test]
fn elements_catalog() {
    let catalog = Catalog::from_elements_csv(test_data("demo_catalog.csv")).unwrap();
    let iss = &catalog.objects()[0];
    assert_eq!(iss.id, "ISS (ZARYA)");
    match &iss.motion {
        ObjectMotion::Keplerian(elements) => {
            assert!((elements.eccentricity - 0.0006703).abs() < 1e-12);
            assert!((elements.sma_km() - 6_731.0).abs() < 5.0);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(iss.position(10.seconds()).is_ok());
}
