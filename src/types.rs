//! Core sample types handed over by the polling collaborator
//!
//! # Key Types
//!
//! - **`LabelSet`**: sorted label name → value map; used both for sample
//!   metrics and for reconstructed label snapshots
//! - **`SamplePair`**: a single (timestamp, value) measurement
//! - **`Sample`**: one instant sample with its labels
//! - **`SampleStream`**: one labelled series of samples (a "matrix" row)
//! - **`QueryResult`**: the tagged shape of a metrics query result
//!
//! # Example
//!
//! ```rust
//! use kuba_labels::types::{labels, QueryResult, SamplePair, SampleStream};
//!
//! let stream = SampleStream::new(
//!     labels(&[("namespace", "default"), ("pod", "web-0")]),
//!     vec![SamplePair::from_millis(1_700_000_000_000, 1.0)],
//! );
//! let result = QueryResult::Matrix(vec![stream]);
//! assert_eq!(result.into_matrix().unwrap().len(), 1);
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sorted label name → value map
pub type LabelSet = BTreeMap<String, String>;

/// Build a [`LabelSet`] from string pairs
pub fn labels(pairs: &[(&str, &str)]) -> LabelSet {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Render a label set the way the metrics API prints selectors
pub fn render_labels(set: &LabelSet) -> String {
    let body: Vec<String> = set.iter().map(|(k, v)| format!("{}=\"{}\"", k, v)).collect();
    format!("{{{}}}", body.join(", "))
}

/// A single measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplePair {
    /// Sample time
    pub timestamp: DateTime<Utc>,

    /// Sample value
    pub value: f64,
}

impl SamplePair {
    /// Create a new sample pair
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }

    /// Create a sample pair from a Unix timestamp in milliseconds
    pub fn from_millis(millis: i64, value: f64) -> Self {
        Self {
            timestamp: DateTime::from_timestamp_millis(millis).unwrap_or_default(),
            value,
        }
    }
}

/// One instant sample with its label set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Labels identifying the series
    pub metric: LabelSet,

    /// Sample value
    pub value: f64,

    /// Sample time
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    /// Create a new sample
    pub fn new(metric: LabelSet, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            metric,
            value,
            timestamp,
        }
    }
}

/// One labelled series of samples
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SampleStream {
    /// Labels identifying the series
    pub metric: LabelSet,

    /// Samples, normally in timestamp order
    pub values: Vec<SamplePair>,
}

impl SampleStream {
    /// Create a new sample stream
    pub fn new(metric: LabelSet, values: Vec<SamplePair>) -> Self {
        Self { metric, values }
    }

    /// Timestamps of every sample, in stream order
    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.values.iter().map(|p| p.timestamp).collect()
    }

    /// Stable sort of the samples by timestamp
    pub fn sort(&mut self) {
        self.values.sort_by_key(|p| p.timestamp);
    }
}

/// Shape of a metrics query result
///
/// Collectors must match on the variant they expect instead of assuming one;
/// [`QueryResult::into_matrix`] and [`QueryResult::into_vector`] turn a
/// mismatch into a typed error.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum QueryResult {
    /// Range query result: one stream per series
    Matrix(Vec<SampleStream>),

    /// Instant query result: one sample per series
    Vector(Vec<Sample>),

    /// Single scalar value
    Scalar(SamplePair),

    /// No data
    #[default]
    None,
}

impl QueryResult {
    /// Variant name, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            QueryResult::Matrix(_) => "matrix",
            QueryResult::Vector(_) => "vector",
            QueryResult::Scalar(_) => "scalar",
            QueryResult::None => "none",
        }
    }

    /// Take the streams of a matrix result
    pub fn into_matrix(self) -> Result<Vec<SampleStream>> {
        match self {
            QueryResult::Matrix(streams) => Ok(streams),
            other => Err(Error::UnexpectedResultShape {
                expected: "matrix",
                actual: other.kind(),
            }),
        }
    }

    /// Take the samples of a vector result
    pub fn into_vector(self) -> Result<Vec<Sample>> {
        match self {
            QueryResult::Vector(samples) => Ok(samples),
            other => Err(Error::UnexpectedResultShape {
                expected: "vector",
                actual: other.kind(),
            }),
        }
    }
}
