//! Condition Consolidation Integration Tests
//!
//! Builds condition status series the way the metrics API exports them and
//! checks the consolidated state series.

use chrono::{DateTime, Duration, TimeZone, Utc};
use kuba_labels::condition::{
    condition_float, condition_string, Condition, ConditionStatus, FLOAT_FALSE, FLOAT_TRUE,
    FLOAT_UNKNOWN,
};
use kuba_labels::types::{labels, SamplePair, SampleStream};
use kuba_labels::Error;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs)
}

fn status_series(status: &str, values: &[(i64, f64)]) -> SampleStream {
    SampleStream::new(
        labels(&[
            ("namespace", "default"),
            ("pod", "web-0"),
            ("condition", "Ready"),
            ("status", status),
        ]),
        values
            .iter()
            .map(|(s, v)| SamplePair::new(at(*s), *v))
            .collect(),
    )
}

// =============================================================================
// Consolidation
// =============================================================================

#[test]
fn test_ready_flips_to_not_ready() {
    let mut c = Condition::new();
    c.append(&status_series("true", &[(0, 1.0), (60, 0.0)]))
        .unwrap();
    c.append(&status_series("false", &[(0, 0.0), (60, 1.0)]))
        .unwrap();
    c.append(&status_series("unknown", &[(0, 0.0), (60, 0.0)]))
        .unwrap();

    let out = c.consolidate().unwrap();
    assert_eq!(
        out.values,
        vec![
            SamplePair::new(at(0), FLOAT_TRUE),
            SamplePair::new(at(60), FLOAT_FALSE)
        ]
    );
    assert_eq!(out.metric["condition"], "Ready");
    assert!(!out.metric.contains_key("status"));
}

#[test]
fn test_status_order_does_not_matter() {
    let series = [
        status_series("Unknown", &[(0, 0.0), (30, 1.0), (60, 0.0)]),
        status_series("FALSE", &[(0, 1.0), (30, 0.0), (60, 0.0)]),
        status_series("True", &[(0, 0.0), (30, 0.0), (60, 1.0)]),
    ];

    let mut forward = Condition::new();
    let mut backward = Condition::new();
    for s in &series {
        forward.append(s).unwrap();
    }
    for s in series.iter().rev() {
        backward.append(s).unwrap();
    }

    let out = forward.consolidate().unwrap();
    assert_eq!(out, backward.consolidate().unwrap());
    let values: Vec<f64> = out.values.iter().map(|p| p.value).collect();
    assert_eq!(values, vec![FLOAT_FALSE, FLOAT_UNKNOWN, FLOAT_TRUE]);
}

#[test]
fn test_unsorted_samples_come_out_sorted() {
    let mut c = Condition::new();
    c.append(&status_series("true", &[(60, 1.0), (0, 0.0)]))
        .unwrap();
    c.append(&status_series("false", &[(60, 0.0), (0, 1.0)]))
        .unwrap();
    c.append(&status_series("unknown", &[(60, 0.0), (0, 0.0)]))
        .unwrap();

    let out = c.consolidate().unwrap();
    assert_eq!(out.timestamps(), vec![at(0), at(60)]);
}

// =============================================================================
// Completeness and consistency gates
// =============================================================================

#[test]
fn test_missing_status_blocks_consolidation() {
    let mut c = Condition::new();
    c.append(&status_series("true", &[(0, 1.0)])).unwrap();
    c.append(&status_series("false", &[(0, 0.0)])).unwrap();
    assert!(!c.is_complete());
    assert!(matches!(c.consolidate(), Err(Error::Incomplete)));

    c.append(&status_series("unknown", &[(0, 0.0)])).unwrap();
    assert!(c.is_complete());
    assert!(c.consolidate().is_ok());
}

#[test]
fn test_instant_with_no_status_set_is_rejected() {
    let mut c = Condition::new();
    c.append(&status_series("true", &[(0, 1.0), (30, 0.0)]))
        .unwrap();
    c.append(&status_series("false", &[(0, 0.0), (30, 0.0)]))
        .unwrap();
    c.append(&status_series("unknown", &[(0, 0.0), (30, 0.0)]))
        .unwrap();
    assert!(matches!(
        c.consolidate(),
        Err(Error::LengthMismatch {
            expected: 2,
            actual: 1,
            ..
        })
    ));
}

#[test]
fn test_status_helpers() {
    assert_eq!(condition_float("True"), Some(FLOAT_TRUE));
    assert_eq!(condition_float("unknown"), Some(FLOAT_UNKNOWN));
    assert_eq!(condition_float("yes"), None);
    assert_eq!(condition_string(FLOAT_FALSE), Some("False"));
    assert_eq!(ConditionStatus::True.to_string(), "True");
}
