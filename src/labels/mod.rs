//! Diff-compressed label histories
//!
//! A [`Labels`] value records how the label set of one entity evolved over a
//! collection run. It stores the first snapshot it saw plus an ordered list of
//! [`Diff`]s, each tagged with the range during which the resulting map was
//! valid.
//!
//! # Compression
//!
//! Polling produces the same label set over and over. Appending a map equal to
//! the latest one never creates a diff; it only widens the latest range. The
//! number of diffs is therefore bounded by the number of label-set changes,
//! not by the number of polls.
//!
//! ```text
//! poll:   {v:1} {v:1} {v:1} {v:2} {v:2} {v:1}
//! store:  original {v:1} [t0,t2]
//!         diff     v:1→2 [t3,t4]
//!         diff     v:2→1 [t5,t5]
//! ```
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use kuba_labels::labels::Labels;
//! use kuba_labels::types::labels;
//!
//! let t = |s: i64| Utc.timestamp_opt(1_700_000_000 + s, 0).unwrap();
//! let mut history = Labels::new();
//! history.append_map(labels(&[("v", "1")]), &[t(0), t(30)]).unwrap();
//! history.append_map(labels(&[("v", "1")]), &[t(60)]).unwrap();
//! history.append_map(labels(&[("v", "2")]), &[t(90)]).unwrap();
//!
//! assert_eq!(history.diffs.len(), 1);
//! let timeline = history.to_time_range_labels().unwrap();
//! assert_eq!(timeline.len(), 2);
//! ```

pub mod converter;
pub mod diff;
pub mod reconstruct;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::metrics;
use crate::range::Range;
use crate::types::{render_labels, LabelSet, Sample, SampleStream};

pub use converter::Converter;
pub use diff::{Change, ChangeType, Changelog};
pub use reconstruct::{to_time_range_labels, TimeRangeLabels};

/// Label key used by value appends when no key label is given
pub const SINGLE_VALUE_KEY: &str = "value";

/// One recorded change and the range during which its result was valid
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Diff {
    /// Changes relative to the previous map
    #[serde(default)]
    pub changelog: Changelog,

    /// Validity range of the resulting map
    #[serde(default)]
    pub range: Range,
}

/// Compressed label history of one entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Labels {
    /// First snapshot and its range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original: Option<TimeRangeLabels>,

    /// Subsequent changes, in append order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<Diff>,

    /// Running reconstruction; rebuilt on demand after deserialization
    #[serde(skip)]
    current: Option<LabelSet>,
}

/// Named label histories of one entity
pub type LabelMap = BTreeMap<String, Labels>;

/// Get the history stored under `key`, creating an empty one if needed
pub fn ensure_labels<'a>(label_map: &'a mut LabelMap, key: &str) -> &'a mut Labels {
    label_map.entry(key.to_string()).or_default()
}

impl Labels {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// True until the first successful append
    pub fn is_empty(&self) -> bool {
        self.original.is_none()
    }

    /// The most recently appended map
    pub fn current(&mut self) -> Result<Option<&LabelSet>> {
        if self.current.is_none() {
            self.current = reconstruct::replay_current(self)?;
        }
        Ok(self.current.as_ref())
    }

    /// Range of the most recent step
    pub fn current_range(&self) -> Option<&Range> {
        match self.diffs.last() {
            Some(d) => Some(&d.range),
            None => self.original.as_ref().map(|o| &o.range),
        }
    }

    fn current_range_mut(&mut self) -> Option<&mut Range> {
        match self.diffs.last_mut() {
            Some(d) => Some(&mut d.range),
            None => self.original.as_mut().map(|o| &mut o.range),
        }
    }

    /// Record that `map` was observed at `timestamps`
    ///
    /// The observation covers `[min(timestamps), max(timestamps)]`. The first
    /// call sets the original snapshot. Later calls either widen the latest
    /// range (map unchanged) or append a diff (map changed).
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyTimeSeries`] if `timestamps` is empty
    /// - [`Error::PatchFailure`] if a deserialized history cannot be replayed
    pub fn append_map(&mut self, map: LabelSet, timestamps: &[DateTime<Utc>]) -> Result<()> {
        let (Some(start), Some(end)) = (
            timestamps.iter().min().copied(),
            timestamps.iter().max().copied(),
        ) else {
            return Err(Error::EmptyTimeSeries);
        };
        let range = Range::bounded(start, end);

        let Some(current) = self.current()?.cloned() else {
            self.original = Some(TimeRangeLabels::new(map.clone(), range));
            self.current = Some(map);
            metrics::record_label_append(false);
            return Ok(());
        };

        let changelog = diff::diff(&current, &map);
        if changelog.is_empty() {
            if let Some(r) = self.current_range_mut() {
                r.expand_range(&range);
            }
            metrics::record_label_append(false);
        } else {
            debug!(
                "Recorded {} label change(s) at {}",
                changelog.len(),
                range
            );
            self.diffs.push(Diff { changelog, range });
            self.current = Some(map);
            metrics::record_label_append(true);
        }
        Ok(())
    }

    /// Append the full label set of a stream over all of its timestamps
    pub fn append_sample_stream(&mut self, stream: &SampleStream) -> Result<()> {
        self.append_map(stream.metric.clone(), &stream.timestamps())
    }

    /// Append the full label set of a single sample
    pub fn append_sample(&mut self, sample: &Sample) -> Result<()> {
        self.append_map(sample.metric.clone(), &[sample.timestamp])
    }

    /// Like [`Labels::append_sample_stream`], keeping only the `filter` labels
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyFilter`] if `filter` is empty
    /// - [`Error::MissingLabel`] if a filtered label is absent
    pub fn append_sample_stream_with_filter(
        &mut self,
        stream: &SampleStream,
        filter: &[&str],
    ) -> Result<()> {
        let metric = filter_metric(&stream.metric, filter)?;
        self.append_map(metric, &stream.timestamps())
    }

    /// Like [`Labels::append_sample`], keeping only the `filter` labels
    pub fn append_sample_with_filter(&mut self, sample: &Sample, filter: &[&str]) -> Result<()> {
        let metric = filter_metric(&sample.metric, filter)?;
        self.append_map(metric, &[sample.timestamp])
    }

    /// Append each sample value of a stream as a one-key map
    ///
    /// With `key` unset the map key is [`SINGLE_VALUE_KEY`]; otherwise it is
    /// the value of the label named `key`. Stops at the first failing sample.
    ///
    /// # Errors
    ///
    /// - [`Error::KeyNotFound`] if the label named `key` is absent
    pub fn append_sample_stream_with_value(
        &mut self,
        stream: &SampleStream,
        key: Option<&str>,
        converter: &Converter,
    ) -> Result<()> {
        for pair in &stream.values {
            self.append_value(&stream.metric, key, pair.value, converter, pair.timestamp)?;
        }
        Ok(())
    }

    /// Append the value of a single sample as a one-key map
    pub fn append_sample_with_value(
        &mut self,
        sample: &Sample,
        key: Option<&str>,
        converter: &Converter,
    ) -> Result<()> {
        self.append_value(
            &sample.metric,
            key,
            sample.value,
            converter,
            sample.timestamp,
        )
    }

    /// Reconstruct the explicit timeline of this history
    pub fn to_time_range_labels(&self) -> Result<Vec<TimeRangeLabels>> {
        to_time_range_labels(self)
    }

    fn append_value(
        &mut self,
        metric: &LabelSet,
        key: Option<&str>,
        value: f64,
        converter: &Converter,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        let actual_key = match key {
            None => SINGLE_VALUE_KEY.to_string(),
            Some(k) => metric.get(k).cloned().ok_or_else(|| Error::KeyNotFound {
                key: k.to_string(),
                labels: render_labels(metric),
            })?,
        };
        let mut map = LabelSet::new();
        map.insert(actual_key, converter.render(value));
        self.append_map(map, &[timestamp])
    }
}

fn filter_metric(metric: &LabelSet, filter: &[&str]) -> Result<LabelSet> {
    if filter.is_empty() {
        return Err(Error::EmptyFilter);
    }
    filter
        .iter()
        .map(|key| {
            metric
                .get(*key)
                .map(|v| (key.to_string(), v.clone()))
                .ok_or_else(|| Error::MissingLabel(key.to_string()))
        })
        .collect()
}
