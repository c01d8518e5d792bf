//! Canonical daily-series normalization.
//!
//! Converts [`RawBar`] rows into an [`idt_schemas::TimeSeries`]:
//! integer-micro prices, ascending dates with no duplicates, trimmed to the
//! trailing history window, volume synthesized for currency pairs.
//!
//! It does **not** fetch data or touch storage.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use idt_schemas::{DailyBar, TimeSeries};

use crate::ingest_csv::RawBar;

/// Where the volume column comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumePolicy {
    /// Use the provider's `volume` column (0 when the column is absent).
    FromProvider,
    /// Currency pairs: always 0.
    Zero,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizerError {
    /// A price string was empty.
    EmptyPrice { field: &'static str },
    /// A price string could not be parsed as a decimal number.
    InvalidPrice { field: &'static str, raw: String },
    /// A price had more than 6 decimal places (ambiguous micro conversion).
    TooManyDecimalPlaces { field: &'static str, raw: String },
    /// Volume is not an integer.
    InvalidVolume(String),
    /// Volume is negative.
    NegativeVolume(i64),
    /// Nothing left after windowing.
    EmptySeries { key: String },
}

impl fmt::Display for NormalizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizerError::EmptyPrice { field } => {
                write!(f, "price field '{field}' is empty")
            }
            NormalizerError::InvalidPrice { field, raw } => {
                write!(f, "price field '{field}' could not be parsed: '{raw}'")
            }
            NormalizerError::TooManyDecimalPlaces { field, raw } => {
                write!(
                    f,
                    "price field '{field}' has more than 6 decimal places \
                     (ambiguous micro conversion): '{raw}'"
                )
            }
            NormalizerError::InvalidVolume(raw) => {
                write!(f, "volume could not be parsed: '{raw}'")
            }
            NormalizerError::NegativeVolume(v) => {
                write!(f, "volume must be >= 0, got {v}")
            }
            NormalizerError::EmptySeries { key } => {
                write!(f, "no daily bars for '{key}' inside the history window")
            }
        }
    }
}

impl std::error::Error for NormalizerError {}

// ---------------------------------------------------------------------------
// Price conversion
// ---------------------------------------------------------------------------

/// Convert a decimal price string to integer micros deterministically.
///
/// Rules:
/// - Accepts optional leading `+` or `-`.
/// - Accepts an optional fractional part separated by `.`.
/// - Rejects strings with more than 6 decimal places (would require rounding).
/// - Rejects empty strings, non-numeric characters, or multiple `.` separators.
/// - Does **not** use floating-point at any stage.
pub fn price_to_micros(s: &str, field: &'static str) -> Result<i64, NormalizerError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(NormalizerError::EmptyPrice { field });
    }

    let invalid = || NormalizerError::InvalidPrice {
        field,
        raw: s.to_string(),
    };

    let (negative, digits) = if let Some(rest) = s.strip_prefix('-') {
        (true, rest)
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest)
    } else {
        (false, s)
    };

    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    let all_digits = |p: &str| p.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !all_digits(int_part) || !all_digits(frac_part) {
        return Err(invalid());
    }

    if frac_part.len() > 6 {
        return Err(NormalizerError::TooManyDecimalPlaces {
            field,
            raw: s.to_string(),
        });
    }

    let int_val: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse::<i64>().map_err(|_| invalid())?
    };

    // Pad fractional part to exactly 6 digits.
    let frac_val: i64 = format!("{frac_part:0<6}").parse::<i64>().map_err(|_| invalid())?;

    let micros = int_val
        .checked_mul(1_000_000)
        .and_then(|v| v.checked_add(frac_val))
        .ok_or_else(invalid)?;

    Ok(if negative { -micros } else { micros })
}

fn parse_volume(raw: Option<&str>, policy: VolumePolicy) -> Result<i64, NormalizerError> {
    if policy == VolumePolicy::Zero {
        return Ok(0);
    }
    let s = match raw.map(str::trim) {
        None | Some("") => return Ok(0),
        Some(s) => s,
    };
    let v: i64 = s
        .parse()
        .map_err(|_| NormalizerError::InvalidVolume(s.to_string()))?;
    if v < 0 {
        return Err(NormalizerError::NegativeVolume(v));
    }
    Ok(v)
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Normalize a single [`RawBar`].
pub fn normalize(bar: &RawBar, policy: VolumePolicy) -> Result<DailyBar, NormalizerError> {
    Ok(DailyBar {
        date: bar.date,
        open_micros: price_to_micros(&bar.open, "open")?,
        high_micros: price_to_micros(&bar.high, "high")?,
        low_micros: price_to_micros(&bar.low, "low")?,
        close_micros: price_to_micros(&bar.close, "close")?,
        volume: parse_volume(bar.volume.as_deref(), policy)?,
    })
}

/// Build the canonical series for `key`.
///
/// All-or-nothing: one bad price fails the whole series. Bars dated before
/// `window_start` (compared at 00:00 UTC of the bar date) are dropped. When
/// the provider repeats a date, the first occurrence in delivery order wins.
pub fn build_series(
    key: &str,
    raw: &[RawBar],
    policy: VolumePolicy,
    window_start: DateTime<Utc>,
) -> Result<TimeSeries, NormalizerError> {
    let mut seen: HashSet<NaiveDate> = HashSet::new();
    let mut bars: Vec<DailyBar> = Vec::with_capacity(raw.len());

    for r in raw {
        let bar = normalize(r, policy)?;
        if !in_window(bar.date, window_start) {
            continue;
        }
        if seen.insert(bar.date) {
            bars.push(bar);
        }
    }

    if bars.is_empty() {
        return Err(NormalizerError::EmptySeries {
            key: key.to_string(),
        });
    }

    bars.sort_by_key(|b| b.date);
    Ok(TimeSeries::new(key, bars))
}

fn in_window(date: NaiveDate, window_start: DateTime<Utc>) -> bool {
    match date.and_hms_opt(0, 0, 0) {
        Some(midnight) => midnight.and_utc() >= window_start,
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
