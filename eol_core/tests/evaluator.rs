use eol_config::{PassCriteria, SpecPoint};
use eol_core::{Bounds, EolError, ExceededBound, MeasuredPoint, PassCriteriaEvaluator, evaluator};
use proptest::prelude::*;
use rstest::rstest;

fn sp(temperature: f64, stroke: f64, upper: f64, lower: f64) -> SpecPoint {
    SpecPoint {
        temperature,
        stroke,
        upper,
        lower,
    }
}

fn criteria(points: Vec<SpecPoint>) -> PassCriteria {
    PassCriteria {
        spec_points: points,
        ..PassCriteria::default()
    }
}

fn unit_square() -> PassCriteria {
    criteria(vec![
        sp(0.0, 0.0, 0.0, 0.0),
        sp(0.0, 10.0, 2.0, 0.0),
        sp(10.0, 0.0, 0.0, 2.0),
        sp(10.0, 10.0, 2.0, 2.0),
    ])
}

fn point(temperature: f64, stroke: f64, force: f64) -> MeasuredPoint {
    MeasuredPoint {
        temperature,
        stroke,
        force,
        samples: 1,
    }
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[rstest]
#[case(-40.0, 0.0)]
#[case(30.0, 0.0)]
#[case(200.0, 999.0)]
fn single_point_bounds_apply_everywhere(#[case] t: f64, #[case] s: f64) {
    let ev = PassCriteriaEvaluator::new(&criteria(vec![sp(30.0, 0.0, 10.0, 0.0)]));
    assert_eq!(ev.bounds_at(t, s), Bounds { lower: 0.0, upper: 10.0 });
}

#[test]
fn no_points_fall_back_to_global_limits() {
    let c = PassCriteria {
        force_limit_min: 1.5,
        force_limit_max: 42.0,
        ..PassCriteria::default()
    };
    let ev = PassCriteriaEvaluator::new(&c);
    assert_eq!(ev.bounds_at(12.0, 34.0), Bounds { lower: 1.5, upper: 42.0 });
}

#[test]
fn unit_square_centre_is_linear_blend() {
    let ev = PassCriteriaEvaluator::new(&unit_square());
    assert_eq!(ev.triangle_count(), 2);
    let b = ev.bounds_at(5.0, 5.0);
    // The centre lies on the shared diagonal of both triangles; either
    // triangle gives the average of the diagonal's endpoints.
    assert!(close(b.upper, 1.0), "{b:?}");
    assert!(close(b.lower, 1.0), "{b:?}");
}

#[rstest]
#[case(0.0, 0.0, 0.0, 0.0)]
#[case(0.0, 10.0, 2.0, 0.0)]
#[case(10.0, 10.0, 2.0, 2.0)]
fn vertices_reproduce_their_own_bounds(
    #[case] t: f64,
    #[case] s: f64,
    #[case] upper: f64,
    #[case] lower: f64,
) {
    let b = PassCriteriaEvaluator::new(&unit_square()).bounds_at(t, s);
    assert!(close(b.upper, upper) && close(b.lower, lower), "{b:?}");
}

#[test]
fn edge_midpoint_interpolates_along_edge() {
    let b = PassCriteriaEvaluator::new(&unit_square()).bounds_at(0.0, 5.0);
    assert!(close(b.upper, 1.0), "{b:?}");
    assert!(close(b.lower, 0.0), "{b:?}");
}

#[test]
fn outside_hull_uses_nearest_point() {
    let ev = PassCriteriaEvaluator::new(&unit_square());
    let b = ev.bounds_at(14.0, 11.0);
    assert_eq!(b, Bounds { lower: 2.0, upper: 2.0 });
    let b = ev.bounds_at(-3.0, 9.0);
    assert_eq!(b, Bounds { lower: 0.0, upper: 2.0 });
}

#[test]
fn collinear_points_use_global_limits() {
    let ev = PassCriteriaEvaluator::new(&criteria(vec![
        sp(30.0, 0.0, 10.0, 1.0),
        sp(40.0, 0.0, 20.0, 2.0),
        sp(50.0, 0.0, 30.0, 3.0),
    ]));
    assert_eq!(ev.triangle_count(), 0);
    assert_eq!(ev.bounds_at(41.0, 5.0), Bounds { lower: 0.0, upper: 100.0 });
    assert_eq!(ev.bounds_at(40.0, 0.0), Bounds { lower: 0.0, upper: 100.0 });
}

#[test]
fn two_points_use_global_limits() {
    let ev = PassCriteriaEvaluator::new(&criteria(vec![
        sp(30.0, 0.0, 10.0, 1.0),
        sp(50.0, 200.0, 30.0, 3.0),
    ]));
    assert_eq!(ev.bounds_at(30.0, 0.0), Bounds { lower: 0.0, upper: 100.0 });
    let outcome = ev.evaluate(&[point(30.0, 0.0, 60.0)]);
    assert!(outcome.passed, "{outcome:?}");
}

#[test]
fn insertion_order_does_not_matter() {
    let mut points = unit_square().spec_points;
    points.reverse();
    let a = PassCriteriaEvaluator::new(&unit_square());
    let b = PassCriteriaEvaluator::new(&criteria(points));
    for (t, s) in [(2.0, 3.0), (7.5, 1.0), (9.0, 9.0)] {
        let (x, y) = (a.bounds_at(t, s), b.bounds_at(t, s));
        assert!(close(x.upper, y.upper) && close(x.lower, y.lower), "{x:?} vs {y:?}");
    }
}

#[test]
fn every_violation_is_reported() {
    let ev = PassCriteriaEvaluator::new(&criteria(vec![sp(30.0, 0.0, 10.0, 2.0)]));
    let outcome = ev.evaluate(&[
        point(30.0, 10.0, 11.0),
        point(30.0, 20.0, 5.0),
        point(30.0, 30.0, 1.0),
        point(30.0, 40.0, 12.5),
    ]);
    assert!(!outcome.passed);
    assert_eq!(outcome.checked, 4);
    let exceeded: Vec<_> = outcome.violations.iter().map(|v| (v.stroke, v.exceeded)).collect();
    assert_eq!(
        exceeded,
        vec![
            (10.0, ExceededBound::Upper),
            (30.0, ExceededBound::Lower),
            (40.0, ExceededBound::Upper),
        ]
    );
}

#[test]
fn band_edges_are_inclusive_and_tolerance_does_not_widen_them() {
    let c = PassCriteria {
        measurement_tolerance: 0.5,
        ..criteria(vec![sp(30.0, 0.0, 10.0, 2.0)])
    };
    let outcome = evaluator::evaluate(&[point(30.0, 0.0, 10.0), point(30.0, 0.0, 2.0)], &c);
    assert!(outcome.passed, "{outcome:?}");
    let outcome = evaluator::evaluate(&[point(30.0, 0.0, 10.4), point(30.0, 0.0, 1.6)], &c);
    assert_eq!(outcome.violations.len(), 2, "{outcome:?}");
    assert_eq!(outcome.violations[0].exceeded, ExceededBound::Upper);
    assert_eq!(outcome.violations[1].exceeded, ExceededBound::Lower);
}

#[test]
fn failed_evaluation_names_the_point() {
    let ev = PassCriteriaEvaluator::new(&criteria(vec![sp(30.0, 0.0, 10.0, 0.0)]));
    let err = ev
        .evaluate(&[point(40.0, 100.0, 50.0), point(40.0, 60.0, 4.0)])
        .into_result()
        .unwrap_err();
    match &err {
        EolError::Evaluation {
            failed_points: 1,
            total_points: 2,
            summary,
        } => assert!(summary.contains("40.0°C @ 100.0"), "{summary}"),
        other => panic!("expected Evaluation, got {other:?}"),
    }
}

proptest! {
    #[test]
    fn bounds_stay_within_vertex_range(t in 0.0f64..=10.0, s in 0.0f64..=10.0) {
        let ev = PassCriteriaEvaluator::new(&unit_square());
        let b = ev.bounds_at(t, s);
        prop_assert!((-1e-9..=2.0 + 1e-9).contains(&b.upper), "upper {}", b.upper);
        prop_assert!((-1e-9..=2.0 + 1e-9).contains(&b.lower), "lower {}", b.lower);
    }

    #[test]
    fn scattered_points_never_produce_bounds_outside_their_range(
        raw in prop::collection::vec((0.0f64..100.0, 0.0f64..250.0, 0.0f64..50.0), 3..12),
        t in -20.0f64..120.0,
        s in -20.0f64..270.0,
    ) {
        let points: Vec<SpecPoint> = raw
            .iter()
            .map(|&(temperature, stroke, lower)| sp(temperature, stroke, lower + 10.0, lower))
            .collect();
        let lo = points.iter().map(|p| p.lower).fold(f64::INFINITY, f64::min);
        let hi = points.iter().map(|p| p.upper).fold(f64::NEG_INFINITY, f64::max);
        let ev = PassCriteriaEvaluator::new(&criteria(points));
        prop_assume!(ev.triangle_count() > 0);
        let b = ev.bounds_at(t, s);
        prop_assert!(b.lower >= lo - 1e-6 && b.upper <= hi + 1e-6, "{b:?} outside [{lo}, {hi}]");
    }
}
