//! Global alignment of per-entity timelines
//!
//! Every entity's reconstructed timeline has its own ragged edges: scrapes
//! land a few seconds after the collection window opens, series disappear
//! before it closes, and consecutive snapshots leave small gaps between them.
//! [`rearrange`] turns all of them into one shared sequence of buckets that
//! covers the discovery window exactly. Each bucket holds the label snapshot
//! of every entity during that bucket.
//!
//! # Algorithm
//!
//! ```text
//! entity A:  |--a1--|   |----a2----|
//! entity B:    |----b1----||--b2--|
//! window:   [===========================]
//!
//! 1. snap the outer edges onto the window when within the jitter tolerance
//! 2. close the internal gaps at their midpoint
//! 3. clamp to the window and pad the edges with empty snapshots
//! 4. every distinct start becomes a bucket boundary
//! 5. fill each bucket with the snapshot of each entity containing it
//! ```
//!
//! Entities that fail validation are reported in the returned [`MultiError`]
//! and left out; the remaining entities are still aligned.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, MultiError};
use crate::labels::{LabelMap, TimeRangeLabels};
use crate::metrics;
use crate::range::{granularity, Range};
use crate::types::LabelSet;

/// Separator of the parts of a compound entity key
pub const COMPOUND_KEY_DELIMITER: &str = "#@#";

/// Join key parts into a compound entity key
pub fn compound_key<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(COMPOUND_KEY_DELIMITER)
}

/// Split a compound entity key into its parts
pub fn split_compound_key(key: &str) -> Vec<&str> {
    key.split(COMPOUND_KEY_DELIMITER).collect()
}

/// Collection window of one run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    /// Cluster the data was collected from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_name: String,

    /// Window covered by the run
    #[serde(default)]
    pub range: Range,

    /// Largest expected delay between the window edge and the first or last
    /// scrape of an entity
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::duration::serde_opt"
    )]
    pub max_scrape_interval: Option<Duration>,
}

impl Discovery {
    /// Create a discovery for `range`
    pub fn new(
        cluster_name: impl Into<String>,
        range: Range,
        max_scrape_interval: Option<Duration>,
    ) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            range,
            max_scrape_interval,
        }
    }

    /// Both window bounds, in order
    fn window(&self) -> Result<(DateTime<Utc>, DateTime<Utc>), Error> {
        match (self.range.start, self.range.end) {
            (Some(s), Some(e)) if s <= e => Ok((s, e)),
            (Some(_), Some(_)) => Err(Error::InvalidDiscovery(format!(
                "window {} ends before it starts",
                self.range
            ))),
            _ => Err(Error::InvalidDiscovery(format!(
                "window {} is not bounded",
                self.range
            ))),
        }
    }
}

/// One aligned bucket: the snapshot of every entity during `range`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRangeLabelsMap {
    /// Entity key → label snapshot
    #[serde(default)]
    pub map: BTreeMap<String, LabelSet>,

    /// Bucket range
    #[serde(default)]
    pub range: Range,
}

/// Reconstructed timeline of every entity, keyed by compound entity key
pub type MapOfRangeLabels = BTreeMap<String, Vec<TimeRangeLabels>>;

/// Reconstruct every label history of every entity
///
/// Entities are reconstructed in parallel. Each history is keyed by the
/// compound key of its entity and its name. Histories failing to reconstruct
/// are left out and their errors collected.
pub fn build_range_labels(
    stores: &BTreeMap<String, LabelMap>,
) -> (MapOfRangeLabels, Option<MultiError>) {
    let results: Vec<(String, crate::error::Result<Vec<TimeRangeLabels>>)> = stores
        .par_iter()
        .flat_map_iter(|(entity, label_map)| {
            label_map.iter().map(move |(name, labels)| {
                (
                    compound_key(&[entity.as_str(), name.as_str()]),
                    labels.to_time_range_labels(),
                )
            })
        })
        .collect();

    let mut mrl = MapOfRangeLabels::new();
    let mut errors = MultiError::new();
    for (key, result) in results {
        match result {
            Ok(rls) => {
                mrl.insert(key, rls);
            }
            Err(e) => {
                warn!("Skipping label history {}: {}", key, e);
                metrics::record_error(&e, "reconstruct");
                errors.push(e);
            }
        }
    }
    (mrl, errors.into_option())
}

/// Align every entity onto one shared partition of the discovery window
///
/// Returns the buckets in chronological order. Concatenated, their ranges
/// cover the discovery window without gap or overlap. Per-entity failures are
/// collected into the returned error; affected entities are absent from every
/// bucket.
pub fn rearrange(
    mrl: MapOfRangeLabels,
    discovery: &Discovery,
) -> (Vec<TimeRangeLabelsMap>, Option<MultiError>) {
    let mut errors = MultiError::new();
    let window = match discovery.window() {
        Ok(w) => w,
        Err(e) => {
            metrics::record_error(&e, "rearrange");
            errors.push(e);
            return (Vec::new(), errors.into_option());
        }
    };

    let mut timelines = BTreeMap::new();
    for (key, rls) in mrl {
        match align_entity(&key, rls, window, discovery.max_scrape_interval) {
            Ok(aligned) => {
                timelines.insert(key, aligned);
            }
            Err(e) => {
                warn!("Excluding entity {} from alignment: {}", key, e);
                metrics::record_error(&e, "rearrange");
                errors.push(e);
            }
        }
    }

    let buckets = partition(&timelines, window, discovery);
    let res: Vec<TimeRangeLabelsMap> = buckets
        .into_iter()
        .map(|range| TimeRangeLabelsMap {
            map: timelines
                .iter()
                .filter_map(|(key, rls)| lookup(rls, &range).map(|m| (key.clone(), m.clone())))
                .collect(),
            range,
        })
        .collect();

    metrics::record_rearrange_buckets(res.len());
    info!(
        "Aligned {} entities into {} buckets ({} rejected)",
        timelines.len(),
        res.len(),
        errors.len()
    );
    (res, errors.into_option())
}

/// Steps 1 to 3 for a single entity
fn align_entity(
    key: &str,
    mut rls: Vec<TimeRangeLabels>,
    (start, end): (DateTime<Utc>, DateTime<Utc>),
    max_scrape_interval: Option<Duration>,
) -> Result<Vec<TimeRangeLabels>, Error> {
    let g = granularity();
    let window = Range::bounded(start, end);

    if let Some(rl) = rls.iter().find(|rl| !rl.range.is_bounded()) {
        return Err(Error::UnboundedRange {
            entity: key.to_string(),
            range: rl.range.to_string(),
        });
    }
    rls.sort_by_key(|rl| rl.range.start);
    check_overlaps(&rls)?;

    let n = rls.len();
    for (i, rl) in rls.iter_mut().enumerate() {
        rl.range
            .adjust_range(&window, max_scrape_interval, i == 0, i + 1 == n);
    }
    for i in 1..n {
        let (head, tail) = rls.split_at_mut(i);
        head[i - 1].range.stretch_both(&mut tail[0].range);
    }
    check_overlaps(&rls)?;

    let mut rls: Vec<TimeRangeLabels> = rls
        .into_iter()
        .filter_map(|rl| {
            window
                .intersection(&rl.range)
                .map(|range| TimeRangeLabels::new(rl.map, range))
        })
        .collect();

    let (Some(first), Some(last)) = (
        rls.first().and_then(|rl| rl.range.start),
        rls.last().and_then(|rl| rl.range.end),
    ) else {
        return Ok(vec![TimeRangeLabels::new(LabelSet::new(), window)]);
    };

    if first > start {
        if first - g >= start {
            rls.insert(
                0,
                TimeRangeLabels::new(LabelSet::new(), Range::bounded(start, first - g)),
            );
        } else if let Some(rl) = rls.first_mut() {
            rl.range.start = Some(start);
        }
    }
    if last < end {
        if last + g <= end {
            rls.push(TimeRangeLabels::new(
                LabelSet::new(),
                Range::bounded(last + g, end),
            ));
        } else if let Some(rl) = rls.last_mut() {
            rl.range.end = Some(end);
        }
    }
    Ok(rls)
}

fn check_overlaps(rls: &[TimeRangeLabels]) -> Result<(), Error> {
    match rls
        .windows(2)
        .find(|pair| pair[0].range.overlaps(&pair[1].range))
    {
        Some(pair) => Err(Error::RangeOverlap {
            first: pair[0].range.to_string(),
            second: pair[1].range.to_string(),
        }),
        None => Ok(()),
    }
}

/// Step 4: bucket boundaries from the union of all entity ranges
fn partition(
    timelines: &BTreeMap<String, Vec<TimeRangeLabels>>,
    (start, end): (DateTime<Utc>, DateTime<Utc>),
    discovery: &Discovery,
) -> Vec<Range> {
    // start → smallest end seen for that start
    let mut starts: BTreeMap<DateTime<Utc>, DateTime<Utc>> = BTreeMap::new();
    for rl in timelines.values().flatten() {
        if let (Some(s), Some(e)) = (rl.range.start, rl.range.end) {
            starts
                .entry(s)
                .and_modify(|min| *min = (*min).min(e))
                .or_insert(e);
        }
    }
    if starts.is_empty() {
        starts.insert(start, end);
    }

    let mut buckets: Vec<Range> = starts.keys().map(|s| Range::instant(*s)).collect();
    let n = buckets.len();
    for i in 0..n {
        if i + 1 == n {
            let last = &mut buckets[i];
            last.end = last.start.and_then(|s| starts.get(&s).copied());
            last.adjust_range(&discovery.range, discovery.max_scrape_interval, false, true);
        } else {
            let (head, tail) = buckets.split_at_mut(i + 1);
            head[i].stretch_to(&mut tail[0]);
        }
    }
    buckets
}

/// Step 5: the snapshot whose range contains `bucket`
fn lookup<'a>(rls: &'a [TimeRangeLabels], bucket: &Range) -> Option<&'a LabelSet> {
    let idx = rls.partition_point(|rl| rl.range.start <= bucket.start);
    let candidate = rls.get(idx.checked_sub(1)?)?;
    candidate.range.contains(bucket).then_some(&candidate.map)
}
