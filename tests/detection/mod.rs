extern crate debris_avoid as avoid;

use avoid::linalg::Vector3;
use avoid::prelude::*;
use rstest::*;

use crate::{init_logger, test_data};

/// A vehicle flying along the x axis from the origin
fn along_x(speed_km_s: f64) -> TrajectoryExpression {
    TrajectoryExpression::new(Vector3::zeros(), speed_km_s, 0.0, 0.0)
}

#[fixture]
fn single_object() -> Catalog {
    [TrackedObject::stationary("target", Vector3::new(5.0, 0.0, 0.0))]
        .into_iter()
        .collect()
}

#[rstest]
#[case::slow_wide(1.0, 1.0, Some(4))]
#[case::fast_narrow(10.0, 0.01, None)]
#[case::fast_wide(10.0, 1.0, None)]
#[case::slow_narrow(1.0, 0.01, Some(5))]
fn first_collision_over_ten_steps(
    single_object: Catalog,
    #[case] speed_km_s: f64,
    #[case] threshold_km: f64,
    #[case] expected_second: Option<i64>,
) {
    init_logger();
    let detector = CollisionDetector::new(single_object, threshold_km);
    let vehicle = along_x(speed_km_s);

    let first = (0..=10_i64).find_map(|s| detector.check(&vehicle, s.seconds()));

    match expected_second {
        Some(s) => {
            let event = first.expect("a collision should be detected");
            assert_eq!(event.elapsed, s.seconds());
            assert_eq!(event.object_id, "target");
            assert!(event.distance_km <= threshold_km);
        }
        None => assert!(first.is_none(), "unexpected {first:?}"),
    }
}

#[test]
fn empty_catalog_never_collides() {
    let detector = CollisionDetector::new(Catalog::new(), 1_000.0);
    let vehicle = along_x(10.0);
    for s in 0..100_i64 {
        assert!(detector.check(&vehicle, s.seconds()).is_none());
    }
}

#[test]
fn object_at_launch_position() {
    let origin = Vector3::new(6_378.0, 0.0, 0.0);
    let vehicle = TrajectoryExpression::from_degrees(origin, 8.0, 60.0, 30.0);
    let catalog: Catalog = [TrackedObject::stationary("pad", origin)].into_iter().collect();
    let detector = CollisionDetector::new(catalog, 0.1);
    let event = detector.check(&vehicle, Duration::ZERO).unwrap();
    assert!(event.distance_km.abs() < 1e-9);
}

#[test]
fn elements_catalog_screening() {
    init_logger();
    let catalog = Catalog::from_elements_csv(test_data("demo_catalog.csv")).unwrap();
    // The unparseable row is dropped on load
    assert_eq!(catalog.len(), 6);

    // Straight up from the pad, well away from every cataloged orbit for the first minute
    let vehicle = TrajectoryExpression::from_degrees(Vector3::new(6_378.0, 0.0, 0.0), 2.0, 90.0, 0.0);
    let detector = CollisionDetector::new(catalog, 1.0);
    for s in (0..60_i64).step_by(10) {
        let probe = detector.probe(&vehicle, s.seconds()).unwrap();
        assert!(probe.event.is_none());
        // The hyperbolic object has no position
        assert_eq!(probe.unavailable, vec!["HYPERBOLIC DEBRIS".to_string()]);
        let (index, distance) = probe.closest.unwrap();
        assert!(index < 5);
        assert!(distance > 1.0);
    }
}

#[test]
fn state_catalog_collision() {
    init_logger();
    let catalog = Catalog::from_state_csv(test_data("debris_states.csv")).unwrap();
    assert_eq!(catalog.len(), 3);

    let vehicle = TrajectoryExpression::from_degrees(Vector3::new(6_378.0, 0.0, 0.0), 10.0, 90.0, 0.0);
    let detector = CollisionDetector::new(catalog, 1.0);

    let events: Vec<CollisionEvent> = (0..=10_i64)
        .filter_map(|s| detector.check(&vehicle, s.seconds()))
        .collect();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].object_id, "DEB-0003");
    assert_eq!(events[0].elapsed, 5.seconds());
    assert!(events[0].distance_km < 1e-9);
}
