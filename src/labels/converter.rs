//! Rendering of sample values as label values
//!
//! Value-based appends store a single rendered scalar as a one-key label map.
//! A [`Converter`] decides how the numeric value becomes a string.

use chrono::DateTime;

use crate::condition::ConditionStatus;

/// Numeric → string rendering used by value appends
#[derive(Debug, Clone, Copy, Default)]
pub enum Converter {
    /// Metrics API float formatting
    #[default]
    Identity,

    /// Transform the value, then format it like [`Converter::Identity`]
    Value(fn(f64) -> f64),

    /// Render with an arbitrary function
    Custom(fn(f64) -> String),

    /// `true` for any non-zero value, `false` otherwise
    Boolean,

    /// Seconds since the Unix epoch, rendered as RFC 3339 with nanoseconds
    Timestamp,

    /// Condition encoding: 1 → `True`, 0 → `False`, -1 → `Unknown`
    Condition,
}

impl Converter {
    /// Render `value`
    pub fn render(&self, value: f64) -> String {
        match self {
            Converter::Identity => format_value(value),
            Converter::Value(f) => format_value(f(value)),
            Converter::Custom(f) => f(value),
            Converter::Boolean => to_bool(value).to_string(),
            Converter::Timestamp => format_timestamp(value).unwrap_or_else(|| format_value(value)),
            Converter::Condition => ConditionStatus::from_float(value)
                .map(|s| s.as_str().to_string())
                .unwrap_or_else(|| format_value(value)),
        }
    }
}

/// Boolean convention for sample values: anything non-zero is true
pub fn to_bool(value: f64) -> bool {
    value != 0.0
}

/// Format a float the way the metrics API prints sample values
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// RFC 3339 with up to nine fractional digits, trailing zeros trimmed
fn format_timestamp(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let secs = value.floor();
    let nanos = ((value - secs) * 1e9).round().min(999_999_999.0) as u32;
    let t = DateTime::from_timestamp(secs as i64, nanos)?;

    let base = t.format("%Y-%m-%dT%H:%M:%S").to_string();
    let frac = format!("{:09}", nanos);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        Some(format!("{}Z", base))
    } else {
        Some(format!("{}.{}Z", base, frac))
    }
}
