//! Reconstruction of a compressed label history into explicit ranges

use serde::{Deserialize, Serialize};

use super::diff::patch;
use super::Labels;
use crate::error::{Error, MultiError, Result};
use crate::range::Range;
use crate::types::LabelSet;

/// A label snapshot and the range during which it was valid
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRangeLabels {
    /// Label snapshot
    #[serde(default)]
    pub map: LabelSet,

    /// Validity range
    #[serde(default)]
    pub range: Range,
}

impl TimeRangeLabels {
    /// Create a new entry
    pub fn new(map: LabelSet, range: Range) -> Self {
        Self { map, range }
    }
}

/// Replay `labels` into one entry per recorded step
///
/// The original snapshot comes first, followed by one entry per diff with the
/// changelog applied to the previous map. The result is sorted by range start.
///
/// # Errors
///
/// - [`Error::PatchFailure`] if a changelog does not apply to the running map
/// - [`Error::RangeOverlap`] if two consecutive ranges overlap (several
///   overlaps are reported together as [`Error::Multiple`])
pub fn to_time_range_labels(labels: &Labels) -> Result<Vec<TimeRangeLabels>> {
    let Some(original) = &labels.original else {
        return Ok(Vec::new());
    };

    let mut res = Vec::with_capacity(labels.diffs.len() + 1);
    res.push(original.clone());
    let mut current = original.map.clone();
    for d in &labels.diffs {
        let mut m = current.clone();
        patch(&d.changelog, &mut m)?;
        res.push(TimeRangeLabels::new(m.clone(), d.range));
        current = m;
    }

    res.sort_by_key(|rl| rl.range.start);

    let overlaps: MultiError = res
        .windows(2)
        .filter(|pair| pair[0].range.overlaps(&pair[1].range))
        .map(|pair| Error::RangeOverlap {
            first: pair[0].range.to_string(),
            second: pair[1].range.to_string(),
        })
        .collect();

    match overlaps.len() {
        0 => Ok(res),
        1 => Err(overlaps.into_errors().remove(0)),
        _ => Err(Error::Multiple(overlaps)),
    }
}

/// Replay `labels` up to the latest step and return the running map
pub(crate) fn replay_current(labels: &Labels) -> Result<Option<LabelSet>> {
    let Some(original) = &labels.original else {
        return Ok(None);
    };
    let mut current = original.map.clone();
    for d in &labels.diffs {
        patch(&d.changelog, &mut current)?;
    }
    Ok(Some(current))
}
