//! Fuzz Tests for Label Histories and Alignment
//!
//! Uses property-based testing (proptest) to check the invariants that hold
//! for any input: lossless reconstruction, bounded diff growth, disjoint
//! reconstructed ranges and full coverage of the discovery window.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use kuba_labels::labels::Labels;
use kuba_labels::range::{granularity, Range};
use kuba_labels::rearrange::{rearrange, Discovery, MapOfRangeLabels};
use kuba_labels::types::LabelSet;
use proptest::prelude::*;

fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

fn at_ms(ms: i64) -> DateTime<Utc> {
    t0() + Duration::milliseconds(ms)
}

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Strategy for small label maps over a narrow key/value alphabet, so that
/// consecutive maps are often equal
fn label_map() -> impl Strategy<Value = LabelSet> {
    prop::collection::btree_map(
        prop::sample::select(vec!["app", "tier", "owner", "version"]).prop_map(String::from),
        prop::sample::select(vec!["a", "b", "c"]).prop_map(String::from),
        0..4,
    )
}

/// Strategy for polls: a label map and a strictly increasing timestamp (ms)
fn polls(max_len: usize) -> impl Strategy<Value = Vec<(LabelSet, i64)>> {
    prop::collection::vec((label_map(), 1i64..120_000), 1..max_len).prop_map(|steps| {
        let mut t = 0i64;
        steps
            .into_iter()
            .map(|(map, delta)| {
                t += delta;
                (map, t)
            })
            .collect()
    })
}

fn record(polls: &[(LabelSet, i64)]) -> Labels {
    let mut history = Labels::new();
    for (map, t) in polls {
        history.append_map(map.clone(), &[at_ms(*t)]).unwrap();
    }
    history
}

/// Number of positions where the map differs from the previous one
fn changes(polls: &[(LabelSet, i64)]) -> usize {
    polls.windows(2).filter(|w| w[0].0 != w[1].0).count()
}

// =============================================================================
// Label history properties
// =============================================================================

mod history_fuzz {
    use super::*;

    proptest! {
        /// Every poll is answered by the reconstructed snapshot covering it
        #[test]
        fn reconstruction_matches_every_poll(polls in polls(60)) {
            let history = record(&polls);
            let rls = history.to_time_range_labels().unwrap();

            for (map, t) in &polls {
                let matching: Vec<_> = rls
                    .iter()
                    .filter(|rl| rl.range.contains_instant(at_ms(*t)))
                    .collect();
                prop_assert_eq!(matching.len(), 1);
                prop_assert_eq!(&matching[0].map, map);
            }
        }

        /// Diffs only grow on actual changes
        #[test]
        fn diffs_bounded_by_changes(polls in polls(60)) {
            let history = record(&polls);
            prop_assert_eq!(history.diffs.len(), changes(&polls));
        }

        /// Re-polling the latest map never adds a diff
        #[test]
        fn repeated_poll_is_compressed(polls in polls(30), extra in 1i64..10_000) {
            let mut history = record(&polls);
            let before = history.diffs.len();
            let (last_map, last_t) = polls.last().unwrap().clone();
            history.append_map(last_map, &[at_ms(last_t + extra)]).unwrap();
            prop_assert_eq!(history.diffs.len(), before);
        }

        /// Reconstructed ranges are pairwise disjoint and ordered
        #[test]
        fn reconstructed_ranges_disjoint(polls in polls(60)) {
            let rls = record(&polls).to_time_range_labels().unwrap();
            for pair in rls.windows(2) {
                prop_assert!(pair[0].range.is_distinct(&pair[1].range));
                prop_assert!(pair[0].range.before(&pair[1].range));
            }
        }

        /// Serialized histories reconstruct to the same timeline
        #[test]
        fn json_preserves_timeline(polls in polls(30)) {
            let history = record(&polls);
            let json = serde_json::to_string(&history).unwrap();
            let restored: Labels = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(
                restored.to_time_range_labels().unwrap(),
                history.to_time_range_labels().unwrap()
            );
        }
    }
}

// =============================================================================
// Range properties
// =============================================================================

mod range_fuzz {
    use super::*;

    proptest! {
        /// Stretching two disjoint ranges leaves them adjacent or untouched
        #[test]
        fn stretch_both_closes_gap(
            a_start in 0i64..1000,
            a_len in 0i64..1000,
            gap in 1i64..100_000,
            b_len in 0i64..1000
        ) {
            let a_end = a_start + a_len;
            let b_start = a_end + gap;
            let mut a = Range::bounded(at_ms(a_start), at_ms(a_end));
            let mut b = Range::bounded(at_ms(b_start), at_ms(b_start + b_len));

            a.stretch_both(&mut b);

            prop_assert!(a.is_distinct(&b));
            prop_assert_eq!(a.start, Some(at_ms(a_start)));
            prop_assert_eq!(b.end, Some(at_ms(b_start + b_len)));
            let remaining = b.start.unwrap() - a.end.unwrap();
            prop_assert!(remaining <= granularity() * 2);
        }

        /// Display/FromStr round trip
        #[test]
        fn display_parses_back(start in any::<Option<i64>>(), len in 0i64..1_000_000) {
            let start = start.map(|s| at_ms(s % 1_000_000_000));
            let range = Range::new(start, start.map(|s| s + Duration::milliseconds(len)));
            prop_assert_eq!(range.to_string().parse::<Range>().unwrap(), range);
        }
    }
}

// =============================================================================
// Alignment properties
// =============================================================================

mod rearrange_fuzz {
    use super::*;

    const WINDOW_MS: i64 = 3_600_000;

    /// Polls confined to the window, with some jitter around its edges
    fn entity_polls() -> impl Strategy<Value = Vec<(LabelSet, i64)>> {
        (polls(40), -5_000i64..90_000).prop_map(|(polls, offset)| {
            polls
                .into_iter()
                .map(|(map, t)| (map, offset + t))
                .filter(|(_, t)| *t <= WINDOW_MS + 5_000)
                .collect()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Buckets tile the discovery window, whatever the entities look like
        #[test]
        fn buckets_cover_window(
            entities in prop::collection::vec(entity_polls(), 0..6),
            tolerance_secs in prop::option::of(0u64..120)
        ) {
            let d = Discovery::new(
                "fuzz",
                Range::bounded(t0(), at_ms(WINDOW_MS)),
                tolerance_secs.map(StdDuration::from_secs),
            );
            let mut mrl = MapOfRangeLabels::new();
            for (i, polls) in entities.iter().enumerate() {
                let rls = if polls.is_empty() {
                    Vec::new()
                } else {
                    record(polls).to_time_range_labels().unwrap()
                };
                mrl.insert(format!("entity-{}", i), rls);
            }

            let (buckets, errors) = rearrange(mrl, &d);
            prop_assert!(errors.is_none());
            prop_assert!(!buckets.is_empty());
            prop_assert_eq!(buckets[0].range.start, d.range.start);
            prop_assert_eq!(buckets[buckets.len() - 1].range.end, d.range.end);
            for pair in buckets.windows(2) {
                prop_assert_eq!(
                    pair[0].range.end.unwrap() + granularity(),
                    pair[1].range.start.unwrap()
                );
            }
            for b in &buckets {
                prop_assert_eq!(b.map.len(), entities.len());
            }
        }
    }
}
