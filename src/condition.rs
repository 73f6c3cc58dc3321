//! Reconstruction of Kubernetes condition series
//!
//! The metrics API exports one boolean series per condition status
//! (`status="true"`, `status="false"`, `status="unknown"`). At any instant
//! exactly one of them is set. A [`Condition`] gathers the three series and
//! [`Condition::consolidate`] folds them into a single series whose value is
//! the status that was active:
//!
//! | status  | value |
//! |---------|-------|
//! | True    | 1.0   |
//! | False   | 0.0   |
//! | Unknown | -1.0  |

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::labels::converter::to_bool;
use crate::types::{LabelSet, SamplePair, SampleStream};

/// Label holding the condition name
pub const CONDITION_KEY: &str = "condition";

/// Label holding the status of a condition series
pub const STATUS_KEY: &str = "status";

/// Encoded value of [`ConditionStatus::True`]
pub const FLOAT_TRUE: f64 = 1.0;

/// Encoded value of [`ConditionStatus::False`]
pub const FLOAT_FALSE: f64 = 0.0;

/// Encoded value of [`ConditionStatus::Unknown`]
pub const FLOAT_UNKNOWN: f64 = -1.0;

/// Status of a Kubernetes condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Condition state cannot be determined
    Unknown,
}

impl ConditionStatus {
    /// Every status, in encoding order
    pub const ALL: [ConditionStatus; 3] = [
        ConditionStatus::True,
        ConditionStatus::False,
        ConditionStatus::Unknown,
    ];

    /// Parse a status label value, ignoring case
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }

    /// Decode an encoded status value
    pub fn from_float(value: f64) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_float() == value)
    }

    /// Canonical spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }

    /// Encoded value
    pub fn as_float(&self) -> f64 {
        match self {
            ConditionStatus::True => FLOAT_TRUE,
            ConditionStatus::False => FLOAT_FALSE,
            ConditionStatus::Unknown => FLOAT_UNKNOWN,
        }
    }
}

impl fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded value of a status string, ignoring case
pub fn condition_float(s: &str) -> Option<f64> {
    ConditionStatus::parse(s).map(|status| status.as_float())
}

/// Canonical status string of an encoded value
pub fn condition_string(value: f64) -> Option<&'static str> {
    ConditionStatus::from_float(value).map(|status| status.as_str())
}

/// Samples of each status series
pub type StatusMap = BTreeMap<ConditionStatus, Vec<SamplePair>>;

/// Accumulator for the status series of one condition of one entity
#[derive(Debug, Clone, Default)]
pub struct Condition {
    metric: LabelSet,
    status_map: StatusMap,
}

impl Condition {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity labels: those of the first appended series, minus `status`
    pub fn metric(&self) -> &LabelSet {
        &self.metric
    }

    /// Samples gathered so far, per status
    pub fn status_map(&self) -> &StatusMap {
        &self.status_map
    }

    /// Condition name, if the series carried one
    pub fn name(&self) -> Option<&str> {
        self.metric.get(CONDITION_KEY).map(String::as_str)
    }

    /// Store the samples of one status series
    ///
    /// A later series with the same status replaces the earlier one.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingRequiredLabel`] if the series has no `status` label
    /// - [`Error::InvalidStatus`] if the status is not True, False or Unknown
    pub fn append(&mut self, stream: &SampleStream) -> Result<()> {
        let raw = stream
            .metric
            .get(STATUS_KEY)
            .ok_or_else(|| Error::MissingRequiredLabel(STATUS_KEY.to_string()))?;
        let status = ConditionStatus::parse(raw).ok_or_else(|| Error::InvalidStatus(raw.clone()))?;

        if self.metric.is_empty() {
            self.metric = stream.metric.clone();
            self.metric.remove(STATUS_KEY);
        }
        self.status_map.insert(status, stream.values.clone());
        Ok(())
    }

    /// True once all three status series have been appended
    pub fn is_complete(&self) -> bool {
        self.status_map.len() == ConditionStatus::ALL.len()
    }

    /// Fold the status series into a single series
    ///
    /// Each set sample of a status series contributes that status's encoded
    /// value at its timestamp. The result is sorted by timestamp and carries
    /// the identity labels.
    ///
    /// # Errors
    ///
    /// - [`Error::Incomplete`] unless all three statuses are present
    /// - [`Error::LengthMismatch`] if the series differ in length, or if the
    ///   number of set samples differs from the series length
    pub fn consolidate(&self) -> Result<SampleStream> {
        if !self.is_complete() {
            return Err(Error::Incomplete);
        }
        let condition = self.name().unwrap_or_default().to_string();

        let mut expected = None;
        let mut values = Vec::new();
        for (status, samples) in &self.status_map {
            match expected {
                None => expected = Some(samples.len()),
                Some(l) if l != samples.len() => {
                    return Err(Error::LengthMismatch {
                        condition,
                        expected: l,
                        actual: samples.len(),
                    });
                }
                Some(_) => {}
            }
            values.extend(
                samples
                    .iter()
                    .filter(|p| to_bool(p.value))
                    .map(|p| SamplePair::new(p.timestamp, status.as_float())),
            );
        }

        let expected = expected.unwrap_or_default();
        if values.len() != expected {
            return Err(Error::LengthMismatch {
                condition,
                expected,
                actual: values.len(),
            });
        }

        let mut stream = SampleStream::new(self.metric.clone(), values);
        stream.sort();
        Ok(stream)
    }
}
