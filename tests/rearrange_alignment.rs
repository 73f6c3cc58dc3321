//! Rearrange Alignment Integration Tests
//!
//! Drives `rearrange` with ragged, jittered per-entity timelines and checks
//! that the buckets tile the discovery window.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kuba_labels::labels::{Labels, TimeRangeLabels};
use kuba_labels::range::{granularity, Range};
use kuba_labels::rearrange::{
    build_range_labels, compound_key, rearrange, Discovery, MapOfRangeLabels, TimeRangeLabelsMap,
};
use kuba_labels::types::labels;
use kuba_labels::Error;

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

fn hour_discovery() -> Discovery {
    Discovery::new(
        "test-cluster",
        Range::bounded(at(0), at(3600)),
        Some(StdDuration::from_secs(75)),
    )
}

/// History polled every 30 seconds from `first` to `last`, with one value change
fn polled(first: i64, last: i64, change_at: i64) -> Labels {
    let mut history = Labels::new();
    let mut t = first;
    while t <= last {
        let v = if t < change_at { "1" } else { "2" };
        history.append_map(labels(&[("v", v)]), &[at(t)]).unwrap();
        t += 30;
    }
    history
}

fn assert_tiles_window(buckets: &[TimeRangeLabelsMap], d: &Discovery) {
    assert!(!buckets.is_empty());
    assert_eq!(buckets[0].range.start, d.range.start);
    assert_eq!(buckets[buckets.len() - 1].range.end, d.range.end);
    for b in buckets {
        assert!(b.range.start <= b.range.end, "inverted bucket {}", b.range);
    }
    for pair in buckets.windows(2) {
        assert_eq!(
            pair[0].range.end.unwrap() + granularity(),
            pair[1].range.start.unwrap(),
            "gap or overlap between {} and {}",
            pair[0].range,
            pair[1].range
        );
    }
}

// =============================================================================
// Edge correction
// =============================================================================

#[test]
fn test_jittered_first_scrapes_snap_to_window_start() {
    let d = hour_discovery();
    let mut mrl = MapOfRangeLabels::new();
    mrl.insert(
        "a".into(),
        polled(10, 3590, 4000).to_time_range_labels().unwrap(),
    );
    mrl.insert(
        "b".into(),
        polled(12, 3592, 4000).to_time_range_labels().unwrap(),
    );

    let (buckets, errors) = rearrange(mrl, &d);
    assert!(errors.is_none());
    assert_tiles_window(&buckets, &d);

    let first_a = buckets.iter().find(|b| b.map.contains_key("a")).unwrap();
    let first_b = buckets.iter().find(|b| b.map.contains_key("b")).unwrap();
    assert_eq!(first_a.range.start, Some(at(0)));
    assert_eq!(first_b.range.start, Some(at(0)));
    assert_eq!(buckets[0].map["a"], labels(&[("v", "1")]));
    assert_eq!(buckets[0].map["b"], labels(&[("v", "1")]));
}

#[test]
fn test_no_tolerance_pads_with_empty_snapshots() {
    let d = Discovery::new("c", Range::bounded(at(0), at(3600)), None);
    let mut mrl = MapOfRangeLabels::new();
    mrl.insert(
        "a".into(),
        polled(10, 3590, 4000).to_time_range_labels().unwrap(),
    );

    let (buckets, errors) = rearrange(mrl, &d);
    assert!(errors.is_none());
    assert_tiles_window(&buckets, &d);
    assert_eq!(buckets.len(), 3);
    assert!(buckets[0].map["a"].is_empty());
    assert_eq!(buckets[1].map["a"], labels(&[("v", "1")]));
    assert!(buckets[2].map["a"].is_empty());
}

// =============================================================================
// Global partition
// =============================================================================

#[test]
fn test_changes_of_several_entities_merge_into_buckets() {
    let d = hour_discovery();
    let mut mrl = MapOfRangeLabels::new();
    mrl.insert(
        "a".into(),
        polled(5, 3595, 1200).to_time_range_labels().unwrap(),
    );
    mrl.insert(
        "b".into(),
        polled(7, 3597, 2400).to_time_range_labels().unwrap(),
    );
    mrl.insert(
        "late".into(),
        polled(1800, 3598, 4000).to_time_range_labels().unwrap(),
    );

    let (buckets, errors) = rearrange(mrl, &d);
    assert!(errors.is_none());
    assert_tiles_window(&buckets, &d);

    for b in &buckets {
        assert_eq!(b.map.len(), 3, "every entity in every bucket");
    }
    let last = buckets.last().unwrap();
    assert_eq!(last.map["a"], labels(&[("v", "2")]));
    assert_eq!(last.map["b"], labels(&[("v", "2")]));
    assert_eq!(last.map["late"], labels(&[("v", "1")]));

    let first = &buckets[0];
    assert_eq!(first.map["a"], labels(&[("v", "1")]));
    assert!(first.map["late"].is_empty());
}

#[test]
fn test_bucket_snapshots_match_entity_timelines() {
    let d = hour_discovery();
    let histories = [
        ("a", polled(0, 3600, 900)),
        ("b", polled(15, 3585, 2000)),
        ("c", polled(600, 2400, 1500)),
    ];
    let mut mrl = MapOfRangeLabels::new();
    for (k, h) in &histories {
        mrl.insert(k.to_string(), h.to_time_range_labels().unwrap());
    }

    let (buckets, errors) = rearrange(mrl, &d);
    assert!(errors.is_none());
    assert_tiles_window(&buckets, &d);

    // A sample taken well inside a bucket shows the entity's value at that time
    for b in &buckets {
        let mid = b.range.start.unwrap() + (b.range.duration().unwrap() / 2);
        for (k, h) in &histories {
            let rls = h.to_time_range_labels().unwrap();
            if let Some(rl) = rls.iter().find(|rl| {
                rl.range.start.unwrap() + Duration::seconds(30) <= mid
                    && mid + Duration::seconds(30) <= rl.range.end.unwrap()
            }) {
                assert_eq!(b.map[*k], rl.map, "entity {} in bucket {}", k, b.range);
            }
        }
    }
}

// =============================================================================
// Failure isolation
// =============================================================================

#[test]
fn test_overlapping_entity_reported_and_excluded() {
    let d = hour_discovery();
    let mut mrl = MapOfRangeLabels::new();
    mrl.insert(
        "good".into(),
        polled(0, 3600, 1800).to_time_range_labels().unwrap(),
    );
    mrl.insert(
        "bad".into(),
        vec![
            TimeRangeLabels::new(labels(&[("v", "1")]), Range::bounded(at(0), at(2000))),
            TimeRangeLabels::new(labels(&[("v", "2")]), Range::bounded(at(1000), at(3600))),
        ],
    );

    let (buckets, errors) = rearrange(mrl, &d);
    let errors = errors.unwrap();
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors.errors()[0], Error::RangeOverlap { .. }));

    assert_tiles_window(&buckets, &d);
    assert!(buckets.iter().all(|b| !b.map.contains_key("bad")));
    assert!(buckets.iter().all(|b| b.map.contains_key("good")));
}

#[test]
fn test_build_range_labels_keys_and_errors() {
    let mut stores = std::collections::BTreeMap::new();
    let mut pod = kuba_labels::labels::LabelMap::new();
    pod.insert("owner".to_string(), polled(0, 60, 30));

    let mut broken = Labels::new();
    broken
        .append_map(labels(&[("v", "1")]), &[at(0)])
        .unwrap();
    broken.diffs.push(kuba_labels::labels::Diff {
        changelog: vec![kuba_labels::labels::Change::delete("absent", "x")],
        range: Range::instant(at(10)),
    });
    pod.insert("broken".to_string(), broken);
    stores.insert("ns#@#web-0".to_string(), pod);

    let (mrl, errors) = build_range_labels(&stores);
    assert_eq!(mrl.len(), 1);
    assert!(mrl.contains_key(&compound_key(&["ns", "web-0", "owner"])));
    assert!(matches!(
        errors.unwrap().errors()[0],
        Error::PatchFailure(_)
    ));
}

#[test]
fn test_buckets_serialize_keyed_by_entity() {
    let d = hour_discovery();
    let mut mrl = MapOfRangeLabels::new();
    mrl.insert(
        "a".into(),
        polled(0, 3600, 4000).to_time_range_labels().unwrap(),
    );
    let (buckets, _) = rearrange(mrl, &d);

    let json = serde_json::to_value(&buckets).unwrap();
    assert_eq!(json[0]["map"]["a"]["v"], "1");
    assert!(json[0]["range"]["start"].is_string());
}
