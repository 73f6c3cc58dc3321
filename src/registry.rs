//! Per-run store of every entity's label histories and condition series
//!
//! A [`Registry`] is created for one collection run. The polling side feeds it
//! query results; failures on individual series are logged, counted and
//! skipped so that one malformed entity never blocks the others. Once all
//! batches are in, [`Registry::reconcile`] produces the aligned buckets.
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use kuba_labels::range::Range;
//! use kuba_labels::rearrange::Discovery;
//! use kuba_labels::registry::{entity_key, Extract, Registry};
//! use kuba_labels::types::{labels, QueryResult, SamplePair, SampleStream};
//!
//! let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
//! let stream = SampleStream::new(
//!     labels(&[("namespace", "default"), ("pod", "web-0"), ("app", "web")]),
//!     vec![SamplePair::new(t0, 1.0)],
//! );
//!
//! let mut registry = Registry::new();
//! let ingested = registry
//!     .ingest_matrix(
//!         "labels",
//!         QueryResult::Matrix(vec![stream]),
//!         entity_key(&["namespace", "pod"]),
//!         &Extract::Filter(&["app"]),
//!     )
//!     .unwrap();
//! assert_eq!(ingested, 1);
//!
//! let discovery = Discovery::new("c1", Range::instant(t0), None);
//! let (buckets, errors) = registry.reconcile(&discovery);
//! assert!(errors.is_none());
//! assert_eq!(buckets.len(), 1);
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::condition::{Condition, CONDITION_KEY};
use crate::error::{Error, MultiError, Result};
use crate::labels::{ensure_labels, Converter, LabelMap, Labels};
use crate::metrics;
use crate::rearrange::{
    build_range_labels, compound_key, rearrange, Discovery, MapOfRangeLabels, TimeRangeLabelsMap,
};
use crate::types::{LabelSet, QueryResult, SampleStream};

/// Prefix of the label history a consolidated condition is folded into
pub const CONDITION_PREFIX: &str = "condition:";

/// What to record from each ingested sample stream
#[derive(Debug, Clone, Copy)]
pub enum Extract<'a> {
    /// The full label set
    Labels,

    /// Only the listed labels
    Filter(&'a [&'a str]),

    /// The sample values, rendered with `converter`
    Value {
        /// Label whose value becomes the map key; `None` for `"value"`
        key: Option<&'a str>,
        /// Value rendering
        converter: Converter,
    },
}

/// Entity key from the values of `keys`, joined as a compound key
///
/// The returned function fails with [`Error::MissingLabel`] if a key label is
/// absent.
pub fn entity_key<'a>(keys: &'a [&'a str]) -> impl Fn(&LabelSet) -> Result<String> + 'a {
    move |metric| {
        let parts = keys
            .iter()
            .map(|k| {
                metric
                    .get(*k)
                    .map(String::as_str)
                    .ok_or_else(|| Error::MissingLabel(k.to_string()))
            })
            .collect::<Result<Vec<&str>>>()?;
        Ok(compound_key(parts.as_slice()))
    }
}

/// Label histories and condition accumulators of one collection run
#[derive(Debug, Default)]
pub struct Registry {
    labels: BTreeMap<String, LabelMap>,
    conditions: BTreeMap<String, BTreeMap<String, Condition>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities with at least one label history
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// True when no label history has been created
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// All label histories, by entity
    pub fn labels(&self) -> &BTreeMap<String, LabelMap> {
        &self.labels
    }

    /// Label histories of one entity
    pub fn entity(&self, entity: &str) -> Option<&LabelMap> {
        self.labels.get(entity)
    }

    /// Pending condition accumulators, by entity and condition name
    pub fn conditions(&self) -> &BTreeMap<String, BTreeMap<String, Condition>> {
        &self.conditions
    }

    /// Get the history `name` of `entity`, creating it if needed
    pub fn ensure_labels(&mut self, entity: &str, name: &str) -> &mut Labels {
        ensure_labels(self.labels.entry(entity.to_string()).or_default(), name)
    }

    /// Record every stream of a matrix result into the history `name`
    ///
    /// Each stream is attributed to the entity `entity_fn` derives from its
    /// labels. Streams that fail are logged, counted and skipped. Returns the
    /// number of streams recorded.
    ///
    /// # Errors
    ///
    /// [`Error::UnexpectedResultShape`] if `result` is not a matrix.
    pub fn ingest_matrix<F>(
        &mut self,
        name: &str,
        result: QueryResult,
        entity_fn: F,
        extract: &Extract<'_>,
    ) -> Result<usize>
    where
        F: Fn(&LabelSet) -> Result<String>,
    {
        let streams = result.into_matrix()?;
        let total = streams.len();
        let mut ingested = 0;
        for stream in &streams {
            let outcome = entity_fn(&stream.metric).and_then(|entity| {
                self.append_to(&entity, name, |labels| append(labels, stream, extract))
            });
            match outcome {
                Ok(()) => ingested += 1,
                Err(e) => {
                    warn!("Skipping {} series {:?}: {}", name, stream.metric, e);
                    metrics::record_error(&e, "ingest_matrix");
                }
            }
        }
        debug!("Ingested {}/{} {} series", ingested, total, name);
        Ok(ingested)
    }

    /// Record every stream of a matrix result as a condition status series
    ///
    /// Streams are grouped by entity and by the `condition` label. Streams
    /// that fail are logged, counted and skipped. Returns the number of
    /// streams recorded.
    pub fn ingest_condition<F>(&mut self, result: QueryResult, entity_fn: F) -> Result<usize>
    where
        F: Fn(&LabelSet) -> Result<String>,
    {
        let streams = result.into_matrix()?;
        let mut ingested = 0;
        for stream in &streams {
            match self.append_condition(stream, &entity_fn) {
                Ok(()) => ingested += 1,
                Err(e) => {
                    warn!("Skipping condition series {:?}: {}", stream.metric, e);
                    metrics::record_error(&e, "ingest_condition");
                }
            }
        }
        Ok(ingested)
    }

    fn append_condition<F>(&mut self, stream: &SampleStream, entity_fn: &F) -> Result<()>
    where
        F: Fn(&LabelSet) -> Result<String>,
    {
        let entity = entity_fn(&stream.metric)?;
        let name = stream
            .metric
            .get(CONDITION_KEY)
            .ok_or_else(|| Error::MissingRequiredLabel(CONDITION_KEY.to_string()))?;
        self.conditions
            .entry(entity)
            .or_default()
            .entry(name.clone())
            .or_default()
            .append(stream)
    }

    /// Fold every pending condition into a label history
    ///
    /// Each complete condition is consolidated and its values appended to the
    /// history `condition:<name>` of its entity, rendered as `True`, `False`
    /// or `Unknown`. Incomplete or inconsistent conditions are logged and
    /// dropped. Pending conditions are consumed. Returns the number of
    /// conditions folded.
    pub fn consolidate_conditions(&mut self) -> usize {
        let pending = std::mem::take(&mut self.conditions);
        let mut folded = 0;
        for (entity, conditions) in pending {
            for (name, condition) in conditions {
                let outcome = condition.consolidate().and_then(|stream| {
                    let key = format!("{}{}", CONDITION_PREFIX, name);
                    self.append_to(&entity, &key, |labels| {
                        labels.append_sample_stream_with_value(&stream, None, &Converter::Condition)
                    })
                });
                match outcome {
                    Ok(()) => folded += 1,
                    Err(e) => {
                        warn!("Dropping condition {} of {}: {}", name, entity, e);
                        metrics::record_error(&e, "consolidate_condition");
                    }
                }
            }
        }
        folded
    }

    /// Run `f` on the history `name` of `entity`
    ///
    /// A history that does not exist yet is only stored once `f` succeeds, so
    /// a rejected series leaves no trace of its entity.
    fn append_to<F>(&mut self, entity: &str, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Labels) -> Result<()>,
    {
        if let Some(labels) = self.labels.get_mut(entity).and_then(|m| m.get_mut(name)) {
            return f(labels);
        }
        let mut labels = Labels::new();
        f(&mut labels)?;
        self.labels
            .entry(entity.to_string())
            .or_default()
            .insert(name.to_string(), labels);
        Ok(())
    }

    /// Reconstruct every label history
    pub fn range_labels(&self) -> (MapOfRangeLabels, Option<MultiError>) {
        build_range_labels(&self.labels)
    }

    /// Reconstruct every label history and align them onto `discovery`
    ///
    /// Errors from both stages are merged into one [`MultiError`].
    pub fn reconcile(&self, discovery: &Discovery) -> (Vec<TimeRangeLabelsMap>, Option<MultiError>) {
        let (mrl, reconstruct_errors) = self.range_labels();
        let (buckets, rearrange_errors) = rearrange(mrl, discovery);

        let mut errors = reconstruct_errors.unwrap_or_default();
        errors.extend(rearrange_errors.unwrap_or_default());

        info!(
            "Reconciled {} entities into {} buckets with {} errors",
            self.labels.len(),
            buckets.len(),
            errors.len()
        );
        (buckets, errors.into_option())
    }
}

fn append(labels: &mut Labels, stream: &SampleStream, extract: &Extract<'_>) -> Result<()> {
    match extract {
        Extract::Labels => labels.append_sample_stream(stream),
        Extract::Filter(filter) => labels.append_sample_stream_with_filter(stream, filter),
        Extract::Value { key, converter } => {
            labels.append_sample_stream_with_value(stream, *key, converter)
        }
    }
}
