use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 1 unit of the quote currency = 1_000_000 micros.
pub const MICROS_PER_UNIT: i64 = 1_000_000;

/// One normalized daily OHLCV record.
///
/// Prices are integer micros so a stored series round-trips exactly; use the
/// float accessors for charting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open_micros: i64,
    pub high_micros: i64,
    pub low_micros: i64,
    pub close_micros: i64,
    /// Always 0 for currency pairs.
    pub volume: i64,
}

impl DailyBar {
    pub fn open(&self) -> f64 {
        micros_to_f64(self.open_micros)
    }

    pub fn high(&self) -> f64 {
        micros_to_f64(self.high_micros)
    }

    pub fn low(&self) -> f64 {
        micros_to_f64(self.low_micros)
    }

    pub fn close(&self) -> f64 {
        micros_to_f64(self.close_micros)
    }
}

fn micros_to_f64(v: i64) -> f64 {
    v as f64 / MICROS_PER_UNIT as f64
}

/// A daily series for one ticker or currency pair, ascending by date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Ticker or pair key the series belongs to (e.g. `AAPL`, `EUR-USD`).
    pub key: String,
    pub bars: Vec<DailyBar>,
}

impl TimeSeries {
    pub fn new(key: impl Into<String>, bars: Vec<DailyBar>) -> Self {
        Self {
            key: key.into(),
            bars,
        }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// Dates strictly increasing (which also rules out duplicates).
    pub fn is_strictly_ascending(&self) -> bool {
        self.bars.windows(2).all(|w| w[0].date < w[1].date)
    }
}
