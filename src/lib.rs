//! Kuba Labels - label-history reconciliation for Kubernetes metrics exports
//!
//! This library turns polled metrics samples into compact, gap-free label
//! timelines:
//! - Diff-compressed per-entity label histories (snapshot + changelogs)
//! - Reconstruction of histories into explicit time ranges
//! - Consolidation of Kubernetes condition status series
//! - Alignment of every entity onto one shared partition of the collection window

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod condition;
pub mod duration;
pub mod error;
pub mod labels;
pub mod range;
pub mod rearrange;
pub mod types;

/// Per-run entity store and ingestion entry points
pub mod registry;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

/// Tracing subscriber setup
pub mod logging;

// Re-export main types
pub use condition::{Condition, ConditionStatus};
pub use error::{Error, MultiError, Result};
pub use labels::{Converter, Labels, TimeRangeLabels};
pub use range::Range;
pub use rearrange::{rearrange, Discovery, MapOfRangeLabels, TimeRangeLabelsMap};
pub use registry::Registry;
