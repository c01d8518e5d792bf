//! idt-schemas
//!
//! Shared data model for the ticker import pipeline: validated portfolio rows,
//! normalized daily time series, and the per-row import outcome handed to
//! downstream chart / notification consumers.
//!
//! Nothing in this crate performs I/O.

pub mod result;
pub mod row;
pub mod series;

pub use result::{ImportFailure, ImportKind, ImportResult, ImportSuccess};
pub use row::{PortfolioRow, RowError, RowShape, RowType};
pub use series::{DailyBar, TimeSeries, MICROS_PER_UNIT};

/// Prefix of every stored time-series blob key.
pub const SERIES_KEY_PREFIX: &str = "data-daily-";

/// Longest key a blob store accepts.
pub const MAX_BLOB_KEY_LEN: usize = 200;

/// Longest ticker a row may carry: two of them joined into a pair key,
/// plus the series prefix, still fit in [`MAX_BLOB_KEY_LEN`].
pub const MAX_TICKER_LEN: usize = (MAX_BLOB_KEY_LEN - SERIES_KEY_PREFIX.len() - 1) / 2;

/// Combined key for a currency pair row (`EUR`, `USD` -> `EUR-USD`).
pub fn pair_key(ticker1: &str, ticker2: &str) -> String {
    format!("{ticker1}-{ticker2}")
}

/// Blob key under which the series for `id` (a ticker or pair key) is stored.
pub fn series_blob_key(id: &str) -> String {
    format!("{SERIES_KEY_PREFIX}{id}")
}
