//! Inclusive, optionally open time ranges
//!
//! A [`Range`] is the unit every label history is tagged with. Both bounds are
//! optional; a missing bound means the range is unbounded on that side. When
//! both are set, `start <= end`, and both ends are inclusive.
//!
//! Besides the usual ordering and containment predicates, ranges know how to
//! grow ([`Range::expand`], [`Range::expand_range`]), how to absorb scrape
//! jitter at the edge of a discovery window ([`Range::adjust_range`]), and how
//! to close the gap to the chronologically next range
//! ([`Range::stretch_to`], [`Range::stretch_other`], [`Range::stretch_both`]).
//!
//! # Example
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use kuba_labels::range::Range;
//!
//! let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
//! let t1 = Utc.timestamp_opt(1_700_000_060, 0).unwrap();
//!
//! let mut range = Range::instant(t0);
//! range.expand(Some(t1));
//! assert!(range.contains_instant(t0));
//! assert!(range.contains_instant(t1));
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

const OPEN_BOUND: &str = "<nil>";
const DELIMITER: char = '-';

/// Resolution of metrics API timestamps
///
/// Two ranges are adjacent when one ends exactly one granule before the other
/// starts.
pub fn granularity() -> Duration {
    Duration::milliseconds(1)
}

/// Inclusive time range with optional bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    /// Inclusive start, `None` for unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,

    /// Inclusive end, `None` for unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stretch {
    Own,
    Other,
    Both,
}

impl Range {
    /// Create a range from optional bounds
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Create a fully bounded range
    pub fn bounded(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Create a range unbounded on both sides
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Create a zero-width range at `t`
    pub fn instant(t: DateTime<Utc>) -> Self {
        Self::bounded(t, t)
    }

    /// True when both bounds are set
    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    /// Length of a bounded range
    pub fn duration(&self) -> Option<Duration> {
        match (self.start, self.end) {
            (Some(s), Some(e)) => Some(e - s),
            _ => None,
        }
    }

    /// Inclusive membership test; an open bound admits everything on its side
    pub fn contains_instant(&self, t: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| s <= t) && self.end.map_or(true, |e| e >= t)
    }

    /// Start-only ordering: true when this range starts strictly earlier
    ///
    /// An open start sorts before any bounded start. Only meaningful for
    /// non-overlapping ranges.
    pub fn before(&self, other: &Range) -> bool {
        match (self.start, other.start) {
            (None, Some(_)) => true,
            (Some(a), Some(b)) => a < b,
            _ => false,
        }
    }

    /// Start-only ordering: true when this range starts strictly later
    pub fn after(&self, other: &Range) -> bool {
        other.before(self)
    }

    /// True when the ranges share no instant
    pub fn is_distinct(&self, other: &Range) -> bool {
        ends_before(self.end, other.start) || ends_before(other.end, self.start)
    }

    /// True when the ranges share at least one instant
    pub fn overlaps(&self, other: &Range) -> bool {
        !self.is_distinct(other)
    }

    /// True when `other` lies entirely within this range
    pub fn contains(&self, other: &Range) -> bool {
        let start_ok = match (self.start, other.start) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a <= b,
        };
        let end_ok = match (self.end, other.end) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => a >= b,
        };
        start_ok && end_ok
    }

    /// The shared part of two ranges, if any
    pub fn intersection(&self, other: &Range) -> Option<Range> {
        if self.is_distinct(other) {
            return None;
        }
        let start = match (self.start, other.start) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let end = match (self.end, other.end) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Some(Range { start, end })
    }

    /// Grow the range minimally so that it includes `t`
    ///
    /// - `None` is a no-op
    /// - both bounds unset: both become `t`
    /// - only the end set: the end moves forward if `t` is after it
    /// - start set: the start moves back if `t` is before it, otherwise a set
    ///   end moves forward if `t` is after it
    pub fn expand(&mut self, t: Option<DateTime<Utc>>) {
        let Some(t) = t else {
            return;
        };
        match (self.start, self.end) {
            (None, None) => {
                self.start = Some(t);
                self.end = Some(t);
            }
            (None, Some(e)) => {
                if e < t {
                    self.end = Some(t);
                }
            }
            (Some(s), end) => {
                if s > t {
                    self.start = Some(t);
                } else if let Some(e) = end {
                    if e < t {
                        self.end = Some(t);
                    }
                }
            }
        }
    }

    /// Grow the range to cover both bounds of `other`
    pub fn expand_range(&mut self, other: &Range) {
        self.expand(other.start);
        self.expand(other.end);
    }

    /// Snap an edge onto the discovery window to absorb scrape jitter
    ///
    /// With `adjust_start`, a start lying within `max_deviation` after
    /// `discovery.start` is moved to `discovery.start`; with `adjust_end`, an
    /// end lying within `max_deviation` before `discovery.end` is moved to
    /// `discovery.end`. Nothing happens when the deviation is missing or zero,
    /// or when the discovery window is shorter than the deviation. The range
    /// is never widened past the discovery window.
    pub fn adjust_range(
        &mut self,
        discovery: &Range,
        max_deviation: Option<std::time::Duration>,
        adjust_start: bool,
        adjust_end: bool,
    ) {
        if !(adjust_start || adjust_end) {
            return;
        }
        let Some(dev) = max_deviation.and_then(|d| Duration::from_std(d).ok()) else {
            return;
        };
        if dev <= Duration::zero() {
            return;
        }
        if let Some(window) = discovery.duration() {
            if window < dev {
                return;
            }
        }
        if adjust_start {
            if let (Some(ds), Some(s)) = (discovery.start, self.start) {
                if Range::bounded(ds, ds + dev).contains_instant(s) {
                    self.start = Some(ds);
                }
            }
        }
        if adjust_end {
            if let (Some(de), Some(e)) = (discovery.end, self.end) {
                if Range::bounded(de - dev, de).contains_instant(e) {
                    self.end = Some(de);
                }
            }
        }
    }

    /// Close the gap to `next` by moving this range's end
    pub fn stretch_to(&mut self, next: &mut Range) {
        self.stretch(next, Stretch::Own);
    }

    /// Close the gap to `next` by moving `next`'s start
    pub fn stretch_other(&mut self, next: &mut Range) {
        self.stretch(next, Stretch::Other);
    }

    /// Close the gap to `next` by meeting at its midpoint
    ///
    /// This range's end moves forward by half the gap, rounded down to the
    /// granularity, and `next` starts one granule later, so no instant is
    /// covered twice.
    pub fn stretch_both(&mut self, next: &mut Range) {
        self.stretch(next, Stretch::Both);
    }

    fn stretch(&mut self, next: &mut Range, how: Stretch) {
        let g = granularity();
        let (Some(end), Some(next_start)) = (self.end, next.start) else {
            return;
        };
        if next_start <= end + g {
            return;
        }
        match how {
            Stretch::Own => self.end = Some(next_start - g),
            Stretch::Other => next.start = Some(end + g),
            Stretch::Both => {
                let half = truncate_to_granularity((next_start - end) / 2);
                if half >= g {
                    let new_end = end + half;
                    self.end = Some(new_end);
                    next.start = Some(new_end + g);
                }
            }
        }
    }
}

fn truncate_to_granularity(d: Duration) -> Duration {
    match (d.num_nanoseconds(), granularity().num_nanoseconds()) {
        (Some(n), Some(g)) if g > 0 => Duration::nanoseconds(n - n % g),
        _ => d,
    }
}

fn ends_before(end: Option<DateTime<Utc>>, start: Option<DateTime<Utc>>) -> bool {
    matches!((end, start), (Some(e), Some(s)) if e < s)
}

fn format_bound(t: Option<DateTime<Utc>>) -> String {
    match t.and_then(|t| t.timestamp_nanos_opt()) {
        Some(n) => n.to_string(),
        None => OPEN_BOUND.to_string(),
    }
}

fn parse_bound(s: &str) -> Result<Option<DateTime<Utc>>, Error> {
    if s == OPEN_BOUND {
        return Ok(None);
    }
    let nanos: i64 = s
        .parse()
        .map_err(|e| Error::InvalidRange(format!("'{}' is not a nanosecond timestamp: {}", s, e)))?;
    Ok(Some(DateTime::from_timestamp_nanos(nanos)))
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            format_bound(self.start),
            DELIMITER,
            format_bound(self.end)
        )
    }
}

impl FromStr for Range {
    type Err = Error;

    /// Parse `"<nanos|<nil>>-<nanos|<nil>>"`, the [`Display`](fmt::Display) form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(DELIMITER).collect();
        if parts.len() != 2 {
            return Err(Error::InvalidRange(format!(
                "{} fails to meet format nanotimestamp/{}{}nanotimestamp/{}",
                s, OPEN_BOUND, DELIMITER, OPEN_BOUND
            )));
        }
        Ok(Range {
            start: parse_bound(parts[0])?,
            end: parse_bound(parts[1])?,
        })
    }
}
