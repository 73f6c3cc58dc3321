//! Human-readable duration strings
//!
//! Durations are written as a sequence of decimal numbers with unit suffixes,
//! largest unit first: `"75ms"`, `"1.5s"`, `"1m15s"`, `"2h0m0s"`. Parsing
//! accepts any such sequence (`"75s"` and `"1m15s"` are the same duration).
//!
//! Valid units: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`.

use std::time::Duration;

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, digit0, digit1},
    combinator::{all_consuming, map, opt, value},
    multi::many1,
    sequence::preceded,
    IResult, Parser,
};

use crate::error::{Error, Result};

const NANOS_PER_MICRO: u128 = 1_000;
const NANOS_PER_MILLI: u128 = 1_000_000;
const NANOS_PER_SEC: u128 = 1_000_000_000;
const NANOS_PER_MIN: u128 = 60 * NANOS_PER_SEC;
const NANOS_PER_HOUR: u128 = 60 * NANOS_PER_MIN;

/// Fraction digits beyond this cannot change the result at nanosecond precision
const MAX_FRACTION_DIGITS: usize = 20;

/// Render a duration, e.g. `1m15s`
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < NANOS_PER_MICRO {
        return format!("{}ns", nanos);
    }
    if nanos < NANOS_PER_MILLI {
        return format!("{}µs", fraction(nanos, NANOS_PER_MICRO));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", fraction(nanos, NANOS_PER_MILLI));
    }

    let hours = nanos / NANOS_PER_HOUR;
    let minutes = (nanos % NANOS_PER_HOUR) / NANOS_PER_MIN;
    let seconds = fraction(nanos % NANOS_PER_MIN, NANOS_PER_SEC);
    if hours > 0 {
        format!("{}h{}m{}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m{}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// `value / unit` with the fractional digits trimmed
fn fraction(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let rest = value % unit;
    if rest == 0 {
        return whole.to_string();
    }
    let width = (unit as f64).log10().round() as usize;
    let frac = format!("{:0width$}", rest, width = width);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Parse a duration string, e.g. `75s` or `1m15s`
///
/// # Errors
///
/// [`Error::Configuration`] if the string is empty, negative, lacks a unit,
/// uses an unknown one or does not fit in 64-bit nanoseconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let invalid = |why: &str| Error::Configuration(format!("invalid duration '{}': {}", s, why));

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    let rest = s.strip_prefix('+').unwrap_or(s);
    if rest.starts_with('-') {
        return Err(invalid("negative durations are not supported"));
    }
    if rest.is_empty() {
        return Err(invalid("empty"));
    }

    let (_, terms) = all_consuming(many1(term))
        .parse(rest)
        .map_err(|_| invalid("expected <number><unit>[<number><unit>...]"))?;

    let total = terms
        .into_iter()
        .try_fold(0u128, |acc, t| acc.checked_add(t.nanos()?))
        .ok_or_else(|| invalid("overflow"))?;
    let nanos = u64::try_from(total).map_err(|_| invalid("overflow"))?;
    Ok(Duration::from_nanos(nanos))
}

/// One `<number><unit>` component of a duration string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Term<'a> {
    whole: &'a str,
    fraction: &'a str,
    scale: u128,
}

impl Term<'_> {
    /// Value in nanoseconds, `None` on overflow; excess precision truncates
    fn nanos(&self) -> Option<u128> {
        let whole: u128 = if self.whole.is_empty() {
            0
        } else {
            self.whole.parse().ok()?
        };

        let mut numerator = 0u128;
        let mut denominator = 1u128;
        for digit in self.fraction.bytes().take(MAX_FRACTION_DIGITS) {
            numerator = numerator * 10 + u128::from(digit - b'0');
            denominator *= 10;
        }

        whole
            .checked_mul(self.scale)?
            .checked_add(numerator * self.scale / denominator)
    }
}

/// `1`, `1.`, `1.5` or `.5`, followed by a unit
fn term(input: &str) -> IResult<&str, Term<'_>> {
    let (input, (whole, fraction)) = alt((
        (digit1, opt(preceded(char('.'), digit0))),
        (digit0, map(preceded(char('.'), digit1), Some)),
    ))
    .parse(input)?;
    let (input, scale) = unit(input)?;

    Ok((
        input,
        Term {
            whole,
            fraction: fraction.unwrap_or(""),
            scale,
        },
    ))
}

/// Unit suffix as its length in nanoseconds
fn unit(input: &str) -> IResult<&str, u128> {
    alt((
        value(1u128, tag("ns")),
        value(NANOS_PER_MICRO, tag("us")),
        value(NANOS_PER_MICRO, tag("µs")),
        value(NANOS_PER_MILLI, tag("ms")),
        value(NANOS_PER_SEC, tag("s")),
        value(NANOS_PER_MIN, tag("m")),
        value(NANOS_PER_HOUR, tag("h")),
    ))
    .parse(input)
}

/// Serde support for `Option<Duration>` fields
///
/// Serializes as a duration string; deserializes from a duration string or
/// from an integer number of nanoseconds.
pub mod serde_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Nanos(u64),
        Text(String),
    }

    /// Write as a duration string
    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_str(&super::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    /// Read a duration string or integer nanoseconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Repr::Nanos(n)) => Ok(Some(Duration::from_nanos(n))),
            Some(Repr::Text(s)) => super::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
