extern crate debris_avoid as avoid;

use avoid::linalg::Vector3;
use avoid::prelude::*;
use avoid::rl::EstimatorError;
use rstest::*;

use crate::init_logger;

fn along_x(speed_km_s: f64) -> TrajectoryExpression {
    TrajectoryExpression::new(Vector3::zeros(), speed_km_s, 0.0, 0.0)
}

#[fixture]
fn target_at_five_km() -> Catalog {
    [TrackedObject::stationary("target", Vector3::new(5.0, 0.0, 0.0))]
        .into_iter()
        .collect()
}

fn small_approximator() -> EstimatorConfig {
    EstimatorConfig::Approximator {
        hidden_layers: vec![16],
        replay_capacity: 200,
        batch_size: 8,
        target_sync_interval: 3,
    }
}

#[rstest]
#[case::tabular(EstimatorConfig::default(), 0.1)]
#[case::approximator(small_approximator(), 0.001)]
fn empty_catalog_reaches_maximal_reward(#[case] estimator: EstimatorConfig, #[case] lr: f64) {
    init_logger();
    let cfg = TrainingConfig::builder()
        .episodes(5)
        .max_steps(20)
        .learning_rate(lr)
        .safe_reward(10.0)
        .estimator(estimator)
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(10.0), Catalog::new()).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();

    assert!(rslt.collisions.is_empty());
    assert_eq!(rslt.metrics.episodes, 5);
    assert_eq!(rslt.metrics.evaluated_steps, 100);
    assert_eq!(rslt.metrics.collision_avoidance_rate, 1.0);
    assert!((rslt.metrics.average_reward_per_episode - 200.0).abs() < 1e-9);
    assert_eq!(rslt.metrics.skipped_steps, 0);
    assert!(!rslt.halted_early);
    println!("{rslt}");
}

#[rstest]
fn collision_found_with_noop_only(target_at_five_km: Catalog) {
    init_logger();
    // x = t, so the vehicle is within 1 km of the target at t = 4 s
    let cfg = TrainingConfig::builder()
        .episodes(3)
        .max_steps(10)
        .actions(vec![(0.0, 0.0)])
        .collision_threshold_km(1.0)
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), target_at_five_km).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();

    assert_eq!(rslt.collisions.len(), 3);
    for (episode, event) in rslt.collisions.iter().enumerate() {
        assert_eq!(event.episode, episode);
        assert_eq!(event.step, 3);
        assert_eq!(event.elapsed, 4.seconds());
        assert!(event.distance_km <= 1.0);
    }
    for report in &rslt.episodes {
        assert!(report.collided);
        assert_eq!(report.steps, 4);
        // Three safe steps then the penalty
        assert!((report.total_reward - (30.0 - 100.0)).abs() < 1e-9);
    }
    assert_eq!(rslt.metrics.collisions, 3);
    assert!((rslt.metrics.collision_avoidance_rate - 0.75).abs() < 1e-12);
    assert!(rslt.optimized.offsets.is_identity());
    // The truth stream holds one collision per episode
    let classification = rslt.metrics.classification.unwrap();
    assert_eq!(
        classification.true_positives + classification.false_negatives,
        3
    );
}

#[rstest]
fn no_collision_with_narrow_threshold(target_at_five_km: Catalog) {
    let cfg = TrainingConfig::builder()
        .episodes(2)
        .max_steps(10)
        .actions(vec![(0.0, 0.0)])
        .collision_threshold_km(0.01)
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(10.0), target_at_five_km).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();
    assert!(rslt.collisions.is_empty());
    assert_eq!(rslt.metrics.evaluated_steps, 20);
}

#[rstest]
#[case::tabular(EstimatorConfig::default(), 0.1)]
#[case::approximator(small_approximator(), 0.001)]
fn seeded_runs_are_reproducible(
    target_at_five_km: Catalog,
    #[case] estimator: EstimatorConfig,
    #[case] lr: f64,
) {
    init_logger();
    let cfg = TrainingConfig::builder()
        .episodes(15)
        .max_steps(10)
        .learning_rate(lr)
        .collision_jitter(20.0)
        .safe_jitter(5.0)
        .seed(1234)
        .estimator(estimator)
        .build();
    let trainer = TrainingLoop::new(cfg.clone(), along_x(1.0), target_at_five_km.clone()).unwrap();

    let mut first = trainer.build_estimator().unwrap();
    let rslt_a = trainer.train(&mut first).unwrap();
    let mut second = trainer.build_estimator().unwrap();
    let rslt_b = trainer.train(&mut second).unwrap();

    assert_eq!(rslt_a.actions_taken, rslt_b.actions_taken);
    assert_eq!(rslt_a.optimized.offsets, rslt_b.optimized.offsets);
    assert_eq!(rslt_a.episodes, rslt_b.episodes);
    assert_eq!(rslt_a.collisions, rslt_b.collisions);

    let mut other_cfg = cfg;
    other_cfg.seed = 4321;
    let other = TrainingLoop::new(other_cfg, along_x(1.0), target_at_five_km).unwrap();
    let mut third = other.build_estimator().unwrap();
    let rslt_c = other.train(&mut third).unwrap();
    assert_ne!(rslt_a.actions_taken, rslt_c.actions_taken);
}

#[rstest]
fn exploration_decays_to_floor(target_at_five_km: Catalog) {
    let cfg = TrainingConfig::builder()
        .episodes(60)
        .max_steps(10)
        .exploration_start(0.9)
        .exploration_decay(0.9)
        .exploration_floor(0.05)
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), target_at_five_km).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();

    let mut prev = 0.9;
    for report in &rslt.episodes {
        assert!(report.epsilon <= prev);
        assert!(report.epsilon >= 0.05);
        prev = report.epsilon;
    }
    assert_eq!(rslt.final_epsilon, 0.05);
}

#[rstest]
fn optimized_trajectory_uses_last_episode_offsets(target_at_five_km: Catalog) {
    let cfg = TrainingConfig::builder()
        .episodes(10)
        .max_steps(10)
        .actions(vec![(0.0, 0.0), (0.0, 0.5)])
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), target_at_five_km).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();

    let last = rslt.episodes.last().unwrap();
    assert_eq!(rslt.optimized.offsets, last.offsets);

    // Recompute the last episode offsets from the actions it took
    let taken_before: usize = rslt.episodes[..rslt.episodes.len() - 1]
        .iter()
        .map(|r| r.steps)
        .sum();
    let mut adjuster = TrajectoryAdjuster::default();
    for index in &rslt.actions_taken[taken_before..] {
        adjuster.accumulate(trainer.actions().get(*index).unwrap());
    }
    assert_eq!(adjuster, rslt.optimized.offsets);

    let original = along_x(1.0).position(7.seconds()).unwrap();
    let adjusted = rslt.optimized.position(7.seconds()).unwrap();
    assert!((adjusted.y - original.y - 7.0 * adjuster.y_rate).abs() < 1e-9);

    let action = trainer
        .predict(&estimator, 2.seconds(), &TrajectoryAdjuster::default())
        .unwrap();
    assert!(action.index < 2);
}

#[test]
fn step_budget_halts_at_episode_boundary() {
    let cfg = TrainingConfig::builder()
        .episodes(50)
        .max_steps(10)
        .max_total_steps(25)
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), Catalog::new()).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();
    assert!(rslt.halted_early);
    assert_eq!(rslt.episodes.len(), 3);
    assert_eq!(rslt.metrics.episodes, 3);
}

#[test]
fn invalid_configuration_is_fatal() {
    for cfg in [
        TrainingConfig::builder().episodes(0).build(),
        TrainingConfig::builder().collision_threshold_km(0.0).build(),
        TrainingConfig::builder().actions(Vec::new()).build(),
    ] {
        assert!(matches!(
            TrainingLoop::new(cfg, along_x(1.0), Catalog::new()),
            Err(AvoidanceError::Configuration { .. })
        ));
    }
}

#[test]
fn mismatched_estimator_is_rejected() {
    let trainer = TrainingLoop::new(TrainingConfig::default(), along_x(1.0), Catalog::new()).unwrap();
    let mut estimator = TabularEstimator::new(2, Default::default(), 10, 0.1, 0.9);
    assert!(matches!(
        trainer.train(&mut estimator),
        Err(AvoidanceError::EstimatorInit {
            source: EstimatorError::DimensionMismatch { .. }
        })
    ));
}

#[rstest]
fn unavailable_vehicle_steps_are_skipped(target_at_five_km: Catalog) {
    init_logger();
    // The vehicle position is lost after 5 seconds
    let vehicle = FnTrajectory::new(|t: f64| {
        if t > 5.0 {
            Vector3::new(f64::NAN, 0.0, 0.0)
        } else {
            Vector3::new(0.0, 10.0 + t, 0.0)
        }
    });
    let cfg = TrainingConfig::builder()
        .episodes(2)
        .max_steps(10)
        .build();
    let trainer = TrainingLoop::new(cfg, vehicle, target_at_five_km).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();

    assert_eq!(rslt.metrics.skipped_steps, 10);
    assert_eq!(rslt.metrics.evaluated_steps, 10);
    for report in &rslt.episodes {
        assert_eq!(report.steps, 10);
        assert_eq!(report.skipped_steps, 5);
    }
    // Without a vehicle position, the prediction falls back to the no-data proximity
    let action = trainer
        .predict(&estimator, 8.seconds(), &TrajectoryAdjuster::default())
        .unwrap();
    assert!(action.index < trainer.actions().len());
}

#[rstest]
fn unavailable_objects_are_counted(target_at_five_km: Catalog) {
    let mut catalog = target_at_five_km;
    catalog.push(TrackedObject::keplerian(
        "malformed",
        KeplerianElements {
            inclination_deg: 0.0,
            raan_deg: 0.0,
            eccentricity: 1.5,
            arg_perigee_deg: 0.0,
            mean_anomaly_deg: 0.0,
            mean_motion_rev_day: 15.0,
        },
    ));
    let cfg = TrainingConfig::builder()
        .episodes(1)
        .max_steps(3)
        .actions(vec![(0.0, 0.0)])
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), catalog).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();
    assert_eq!(rslt.metrics.skipped_probes, 3);
    assert_eq!(rslt.metrics.evaluated_steps, 3);
}

#[rstest]
fn approximator_trains_against_collisions(target_at_five_km: Catalog) {
    init_logger();
    let cfg = TrainingConfig::builder()
        .episodes(8)
        .max_steps(12)
        .learning_rate(0.001)
        .actions(vec![
            (0.0, 0.0),
            (0.0, 0.5),
            (0.0, -0.5),
            (0.5, 0.0),
            (-0.5, 0.0),
        ])
        .collision_jitter(50.0)
        .safe_jitter(10.0)
        .estimator(small_approximator())
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), target_at_five_km).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();

    assert_eq!(rslt.metrics.episodes, 8);
    assert!(rslt.metrics.classification.is_some());
    assert!(rslt.metrics.average_reward_per_episode.is_finite());
    match &estimator {
        AnyEstimator::Neural(net) => {
            assert!(net.memory().len() <= 200);
            assert_eq!(net.memory().len(), rslt.metrics.evaluated_steps.min(200));
            assert!(net.last_loss().unwrap().is_finite());
        }
        AnyEstimator::Tabular(_) => panic!("expected the neural estimator"),
    }
}

#[rstest]
fn extreme_rewards_keep_every_collision(target_at_five_km: Catalog) {
    let cfg = TrainingConfig::builder()
        .episodes(20)
        .max_steps(10)
        .actions(vec![(0.0, 0.0)])
        .collision_penalty(1.0e308)
        .collision_jitter(0.5e308)
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), target_at_five_km).unwrap();
    let mut estimator = trainer.build_estimator().unwrap();
    let rslt = trainer.train(&mut estimator).unwrap();

    assert_eq!(rslt.collisions.len(), 20);
    assert_eq!(rslt.metrics.collisions, 20);
    assert_eq!(rslt.metrics.skipped_steps, 0);
    for report in &rslt.episodes {
        assert!(report.collided);
        assert_eq!(report.steps, 4);
        assert!(report.total_reward.is_finite());
    }
}

/// Claims two actions but never values any of them.
struct Mute;

impl ValueEstimator for Mute {
    fn num_actions(&self) -> usize {
        2
    }

    fn estimate(&self, _state: &SimulationState) -> Result<Vec<f64>, EstimatorError> {
        Ok(Vec::new())
    }

    fn update_batch(&mut self, _batch: &[Transition]) -> Result<(), EstimatorError> {
        Ok(())
    }

    fn learn(&mut self, _transition: Transition, _rng: &mut Pcg64Mcg) -> Result<(), EstimatorError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mute"
    }
}

#[test]
fn short_estimate_is_an_estimator_error() {
    let cfg = TrainingConfig::builder()
        .episodes(1)
        .max_steps(3)
        .actions(vec![(0.0, 0.0), (0.0, 1.0)])
        .build();
    let trainer = TrainingLoop::new(cfg, along_x(1.0), Catalog::new()).unwrap();
    assert!(matches!(
        trainer.train(&mut Mute),
        Err(AvoidanceError::EstimatorUpdate {
            episode: 0,
            step: 0,
            source: EstimatorError::DimensionMismatch { expected: 2, got: 0, .. }
        })
    ));
    assert!(matches!(
        trainer.predict(&Mute, 0.seconds(), &TrajectoryAdjuster::default()),
        Err(EstimatorError::DimensionMismatch { .. })
    ));
}
