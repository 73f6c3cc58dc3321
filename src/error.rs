//! Error types for label-history reconciliation

use std::fmt;

use thiserror::Error;

/// Main error type for the reconciliation engine
#[derive(Error, Debug)]
pub enum Error {
    /// An append was called without any timestamps
    #[error("Append map called with no time series")]
    EmptyTimeSeries,

    /// A filtered append referenced a label the sample does not carry
    #[error("No value for label '{0}'")]
    MissingLabel(String),

    /// A condition sample stream lacks a label it cannot be stored without
    #[error("Required label '{0}' not found")]
    MissingRequiredLabel(String),

    /// A filtered append was given an empty filter
    #[error("Empty filter provided")]
    EmptyFilter,

    /// The label naming the value key is absent from the sample's label set
    #[error("Key '{key}' not found in label set {labels}")]
    KeyNotFound {
        /// Label that should have held the key
        key: String,
        /// Rendered label set of the offending sample
        labels: String,
    },

    /// Replaying a changelog onto the running map failed
    #[error("Patch failure: {0}")]
    PatchFailure(String),

    /// Two reconstructed ranges of a single entity overlap
    #[error("Range {first} overlaps range {second}")]
    RangeOverlap {
        /// Earlier range, rendered
        first: String,
        /// Later range, rendered
        second: String,
    },

    /// Status series of a condition do not line up
    #[error("Length mismatch for condition '{condition}': expected {expected}, got {actual}")]
    LengthMismatch {
        /// Condition name (empty when unknown)
        condition: String,
        /// Length of the first status series seen
        expected: usize,
        /// Offending length
        actual: usize,
    },

    /// Consolidation attempted before every status was appended
    #[error("Condition is not complete")]
    Incomplete,

    /// A condition status label carries an unrecognised value
    #[error("Invalid status value '{0}'")]
    InvalidStatus(String),

    /// An entity timeline contains a range with an open bound
    #[error("Unbounded range {range} for entity '{entity}'")]
    UnboundedRange {
        /// Entity key
        entity: String,
        /// Offending range, rendered
        range: String,
    },

    /// The discovery window cannot drive alignment
    #[error("Invalid discovery: {0}")]
    InvalidDiscovery(String),

    /// A query result did not have the expected variant
    #[error("Unexpected result shape: expected {expected}, got {actual}")]
    UnexpectedResultShape {
        /// Expected variant name
        expected: &'static str,
        /// Actual variant name
        actual: &'static str,
    },

    /// A range string could not be parsed
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Several independent failures
    #[error(transparent)]
    Multiple(#[from] MultiError),
}

impl Error {
    /// Short, stable name of the error kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Error::EmptyTimeSeries => "empty_time_series",
            Error::MissingLabel(_) => "missing_label",
            Error::MissingRequiredLabel(_) => "missing_required_label",
            Error::EmptyFilter => "empty_filter",
            Error::KeyNotFound { .. } => "key_not_found",
            Error::PatchFailure(_) => "patch_failure",
            Error::RangeOverlap { .. } => "range_overlap",
            Error::LengthMismatch { .. } => "length_mismatch",
            Error::Incomplete => "incomplete",
            Error::InvalidStatus(_) => "invalid_status",
            Error::UnboundedRange { .. } => "unbounded_range",
            Error::InvalidDiscovery(_) => "invalid_discovery",
            Error::UnexpectedResultShape { .. } => "unexpected_result_shape",
            Error::InvalidRange(_) => "invalid_range",
            Error::Configuration(_) => "configuration",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Multiple(_) => "multiple",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Aggregate of independent failures
///
/// Per-entity failures never abort a run; they are collected here and handed
/// back next to whatever output could still be produced.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    /// Create an empty aggregate
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Add an error, flattening nested aggregates
    pub fn push(&mut self, error: Error) {
        match error {
            Error::Multiple(inner) => self.errors.extend(inner.errors),
            other => self.errors.push(other),
        }
    }

    /// Merge another aggregate into this one
    pub fn extend(&mut self, other: MultiError) {
        self.errors.extend(other.errors);
    }

    /// Number of collected errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when nothing failed
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collected errors in insertion order
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    /// Consume into the collected errors
    pub fn into_errors(self) -> Vec<Error> {
        self.errors
    }

    /// `None` when empty, otherwise `Some(self)`
    pub fn into_option(self) -> Option<MultiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.errors.len())?;
        for e in &self.errors {
            write!(f, "\n\t* {}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {}

impl FromIterator<Error> for MultiError {
    fn from_iter<I: IntoIterator<Item = Error>>(iter: I) -> Self {
        let mut multi = MultiError::new();
        for e in iter {
            multi.push(e);
        }
        multi
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
