mod common;

use blockinv::{InversionOptions, InversionVariant, PivotStrategy, invert_with};
use common::{dominant_matrix, identity_residual};

#[test]
fn options_load_from_json_and_drive_the_dispatch() {
    let opts: InversionOptions =
        serde_json::from_str(r#"{"variant":"ParallelBottomUp","workers":3}"#).expect("parse");
    assert_eq!(opts.variant, InversionVariant::ParallelBottomUp);
    assert_eq!(opts.effective_workers(), 3);

    let a = dominant_matrix(18, 4);
    let inv = invert_with(18, &a, &opts).expect("invertible");
    assert!(identity_residual(&a, &inv) < 1e-10);
}

#[test]
fn options_round_trip_through_json() {
    let opts = InversionOptions::auxiliary().with_pivot(PivotStrategy::AAndD);
    let text = serde_json::to_string(&opts).expect("serialize");
    assert!(text.contains("\"AAndD\""));
    let back: InversionOptions = serde_json::from_str(&text).expect("parse");
    assert_eq!(back, opts);
}

#[test]
fn defaults_are_sequential_in_place_with_pivot_a() {
    let opts = InversionOptions::default();
    assert_eq!(opts.variant, InversionVariant::InPlace);
    assert_eq!(opts.pivot, PivotStrategy::A);
    assert!(opts.workers >= 1);
}
