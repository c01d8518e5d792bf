//! CSV decoding for daily time-series payloads.
//!
//! Converts the provider's CSV body into [`RawBar`] values. It is the **read**
//! side only: no normalization to micros, no sorting, no windowing (see
//! `normalizer.rs`).
//!
//! ## CSV column contract (case-insensitive, order-independent)
//!
//! | Column      | Example      | Notes                                 |
//! |-------------|--------------|---------------------------------------|
//! | `timestamp` | `2024-02-16` | Date; a trailing time part is ignored |
//! | `open`      | `182.34`     | Decimal string                        |
//! | `high`      | `185.00`     | Decimal string                        |
//! | `low`       | `181.00`     | Decimal string                        |
//! | `close`     | `184.50`     | Decimal string                        |
//! | `volume`    | `1000000`    | Optional (absent for FX)              |
//!
//! Any other column (`dividend_amount`, `split_coefficient`, ...) is ignored.

use std::collections::HashMap;
use std::fmt;

use chrono::NaiveDate;

const REQUIRED_COLUMNS: [&str; 5] = ["timestamp", "open", "high", "low", "close"];

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsvIngestError {
    /// The body is not well-formed CSV.
    Malformed(String),
    /// The header row is missing a required column.
    MissingHeader(String),
    /// A record is shorter than the header.
    MissingField { row: usize, field: &'static str },
}

impl fmt::Display for CsvIngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsvIngestError::Malformed(msg) => write!(f, "csv malformed: {msg}"),
            CsvIngestError::MissingHeader(col) => {
                write!(f, "csv missing required header column: '{col}'")
            }
            CsvIngestError::MissingField { row, field } => {
                write!(f, "csv row {row}: missing field '{field}'")
            }
        }
    }
}

impl std::error::Error for CsvIngestError {}

// ---------------------------------------------------------------------------
// Raw bar
// ---------------------------------------------------------------------------

/// A single daily row exactly as delivered, prices still decimal strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Parse a daily CSV body into raw bars, in the order delivered.
///
/// Rows whose `timestamp` does not parse as a date are skipped; structural
/// problems (bad header, short records, malformed CSV) are errors.
pub fn parse_daily_csv(src: &str) -> Result<Vec<RawBar>, CsvIngestError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(src.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|e| CsvIngestError::Malformed(e.to_string()))?
        .clone();
    let col_idx = build_col_index(&headers)?;
    let volume_idx = col_idx.get("volume").copied();

    let mut out = Vec::new();

    for (i, rec) in rdr.records().enumerate() {
        let row_num = i + 1;
        let rec = rec.map_err(|e| CsvIngestError::Malformed(e.to_string()))?;

        let get = |name: &'static str| -> Result<&str, CsvIngestError> {
            let idx = col_idx[name];
            rec.get(idx)
                .ok_or(CsvIngestError::MissingField { row: row_num, field: name })
        };

        let date = match parse_date(get("timestamp")?) {
            Some(d) => d,
            // Unparseable date: skip the row.
            None => continue,
        };

        out.push(RawBar {
            date,
            open: get("open")?.to_string(),
            high: get("high")?.to_string(),
            low: get("low")?.to_string(),
            close: get("close")?.to_string(),
            volume: volume_idx.and_then(|i| rec.get(i)).map(str::to_string),
        });
    }

    Ok(out)
}

/// Parse `YYYY-MM-DD`, tolerating a trailing ` HH:MM:SS`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let day = s.trim().split(|c: char| c == ' ' || c == 'T').next()?;
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_col_index(headers: &csv::StringRecord) -> Result<HashMap<String, usize>, CsvIngestError> {
    let mut idx: HashMap<String, usize> = HashMap::new();
    for (i, col) in headers.iter().enumerate() {
        // First occurrence wins on duplicated header names.
        idx.entry(col.trim().to_ascii_lowercase()).or_insert(i);
    }

    for req in REQUIRED_COLUMNS {
        if !idx.contains_key(req) {
            return Err(CsvIngestError::MissingHeader(req.to_string()));
        }
    }

    Ok(idx)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const STOCK_HEADER: &str = "timestamp,open,high,low,close,volume";
    const FX_HEADER: &str = "timestamp,open,high,low,close";

    #[test]
    fn stock_rows_parsed_in_delivery_order() {
        let csv = format!(
            "{STOCK_HEADER}\n2024-02-16,182.34,185.00,181.00,184.50,1000000\n2024-02-15,180,183,179,182,900000\n"
        );
        let bars = parse_daily_csv(&csv).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 2, 16).unwrap());
        assert_eq!(bars[0].open, "182.34");
        assert_eq!(bars[0].close, "184.50");
        assert_eq!(bars[0].volume.as_deref(), Some("1000000"));
        assert_eq!(bars[1].date, NaiveDate::from_ymd_opt(2024, 2, 15).unwrap());
    }

    #[test]
    fn fx_rows_have_no_volume() {
        let csv = format!("{FX_HEADER}\n2024-02-16,1.0771,1.0805,1.0761,1.0776\n");
        let bars = parse_daily_csv(&csv).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume, None);
    }

    #[test]
    fn header_is_case_insensitive_and_order_independent() {
        let csv = "Close,Timestamp,Low,High,Open\n11,2024-01-02,9,12,10\n";
        let bars = parse_daily_csv(csv).unwrap();
        assert_eq!(bars[0].open, "10");
        assert_eq!(bars[0].high, "12");
        assert_eq!(bars[0].low, "9");
        assert_eq!(bars[0].close, "11");
    }

    #[test]
    fn extra_columns_ignored() {
        let csv = "timestamp,open,high,low,close,adjusted_close,volume,dividend_amount,split_coefficient\n\
                   2024-01-02,10,12,9,11,11,500,0.0000,1.0\n";
        let bars = parse_daily_csv(csv).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].volume.as_deref(), Some("500"));
    }

    #[test]
    fn missing_close_header_returns_err() {
        let csv = "timestamp,open,high,low,volume\n2024-01-02,10,12,9,5\n";
        let err = parse_daily_csv(csv).unwrap_err();
        assert_eq!(err, CsvIngestError::MissingHeader("close".to_string()));
    }

    #[test]
    fn empty_body_is_missing_header() {
        let err = parse_daily_csv("").unwrap_err();
        assert!(matches!(err, CsvIngestError::MissingHeader(_)));
    }

    #[test]
    fn short_record_is_malformed() {
        let csv = format!("{STOCK_HEADER}\n2024-01-02,10,12\n");
        let err = parse_daily_csv(&csv).unwrap_err();
        assert!(matches!(err, CsvIngestError::Malformed(_)));
    }

    #[test]
    fn unparseable_timestamp_skips_row() {
        let csv = format!("{STOCK_HEADER}\nnot-a-date,10,12,9,11,5\n2024-01-02,10,12,9,11,5\n");
        let bars = parse_daily_csv(&csv).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn header_only_returns_empty_vec() {
        let bars = parse_daily_csv(STOCK_HEADER).unwrap();
        assert!(bars.is_empty());
    }

    #[test]
    fn parse_date_variants() {
        let d = NaiveDate::from_ymd_opt(2024, 2, 16).unwrap();
        assert_eq!(parse_date("2024-02-16"), Some(d));
        assert_eq!(parse_date(" 2024-02-16 16:00:00 "), Some(d));
        assert_eq!(parse_date("2024-02-16T16:00:00"), Some(d));
        assert_eq!(parse_date("16/02/2024"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn error_display_missing_field() {
        let e = CsvIngestError::MissingField { row: 5, field: "close" };
        let s = e.to_string();
        assert!(s.contains("row 5"));
        assert!(s.contains("close"));
    }
}
