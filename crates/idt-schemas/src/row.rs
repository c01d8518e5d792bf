//! Portfolio rows as handed over by the spreadsheet stage.
//!
//! Rows are validated once, at construction. Everything downstream of
//! [`PortfolioRow`] can rely on:
//! - `ticker1` is non-empty
//! - a `Forex` row always carries `ticker2`
//! - tickers never contain the pair separator `-` or path separators
//! - tickers are short enough that any series key built from them is a
//!   valid blob key

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MAX_TICKER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RowType {
    #[serde(rename = "Forex")]
    Forex,
    #[serde(rename = "Stocks_ETFs")]
    StocksEtfs,
}

impl RowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowType::Forex => "Forex",
            RowType::StocksEtfs => "Stocks_ETFs",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RowError> {
        match s.trim() {
            "Forex" => Ok(RowType::Forex),
            "Stocks_ETFs" => Ok(RowType::StocksEtfs),
            other => Err(RowError::UnknownType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowError {
    /// `Type` is neither `Forex` nor `Stocks_ETFs`.
    UnknownType(String),
    /// `Ticker1` is empty after trimming.
    MissingTicker1,
    /// A `Forex` row without `Ticker2`.
    MissingForexTicker2,
    /// A ticker contains characters outside `[A-Za-z0-9._^]`.
    InvalidTicker { field: &'static str, value: String },
    /// A ticker longer than [`MAX_TICKER_LEN`].
    TickerTooLong { field: &'static str, len: usize },
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowError::UnknownType(t) => {
                write!(f, "row type '{t}' not allowed; expected Forex | Stocks_ETFs")
            }
            RowError::MissingTicker1 => write!(f, "Ticker1 must not be empty"),
            RowError::MissingForexTicker2 => write!(f, "Forex rows require Ticker2"),
            RowError::InvalidTicker { field, value } => {
                write!(f, "{field} '{value}' contains characters outside [A-Za-z0-9._^]")
            }
            RowError::TickerTooLong { field, len } => {
                write!(f, "{field} is {len} characters long; at most {MAX_TICKER_LEN} allowed")
            }
        }
    }
}

impl std::error::Error for RowError {}

/// One validated portfolio idea.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPortfolioRow", into = "RawPortfolioRow")]
pub struct PortfolioRow {
    row_type: RowType,
    ticker1: String,
    ticker2: Option<String>,
    note: String,
}

/// How a row has to be imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowShape<'a> {
    /// `Stocks_ETFs` with an empty `Ticker2`.
    Single { ticker: &'a str },
    /// `Stocks_ETFs` with both tickers: two independent series.
    RelativePair { ticker1: &'a str, ticker2: &'a str },
    /// `Forex`: one series stored under the combined pair key.
    Fx { from: &'a str, to: &'a str },
}

impl PortfolioRow {
    /// Build a row from raw spreadsheet cells. Whitespace around every cell is
    /// dropped (copy-pasted tickers frequently carry it); an empty `ticker2`
    /// means "no second ticker".
    pub fn new(row_type: RowType, ticker1: &str, ticker2: &str, note: &str) -> Result<Self, RowError> {
        let ticker1 = ticker1.trim();
        if ticker1.is_empty() {
            return Err(RowError::MissingTicker1);
        }
        validate_ticker("Ticker1", ticker1)?;

        let ticker2 = match ticker2.trim() {
            "" => None,
            t => {
                validate_ticker("Ticker2", t)?;
                Some(t.to_string())
            }
        };

        if row_type == RowType::Forex && ticker2.is_none() {
            return Err(RowError::MissingForexTicker2);
        }

        Ok(Self {
            row_type,
            ticker1: ticker1.to_string(),
            ticker2,
            note: note.trim().to_string(),
        })
    }

    pub fn row_type(&self) -> RowType {
        self.row_type
    }

    pub fn ticker1(&self) -> &str {
        &self.ticker1
    }

    pub fn ticker2(&self) -> Option<&str> {
        self.ticker2.as_deref()
    }

    pub fn note(&self) -> &str {
        &self.note
    }

    pub fn shape(&self) -> RowShape<'_> {
        match (self.row_type, self.ticker2.as_deref()) {
            (RowType::Forex, Some(to)) => RowShape::Fx {
                from: &self.ticker1,
                to,
            },
            (RowType::StocksEtfs, Some(t2)) => RowShape::RelativePair {
                ticker1: &self.ticker1,
                ticker2: t2,
            },
            // Forex without ticker2 is rejected by `new`.
            (_, None) => RowShape::Single {
                ticker: &self.ticker1,
            },
        }
    }
}

fn validate_ticker(field: &'static str, value: &str) -> Result<(), RowError> {
    if value.len() > MAX_TICKER_LEN {
        return Err(RowError::TickerTooLong {
            field,
            len: value.len(),
        });
    }
    let ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '^'));
    if ok {
        Ok(())
    } else {
        Err(RowError::InvalidTicker {
            field,
            value: value.to_string(),
        })
    }
}

/// Wire form of a row: `{"Type", "Ticker1", "Ticker2", "Note"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawPortfolioRow {
    #[serde(rename = "Type")]
    row_type: String,
    #[serde(rename = "Ticker1", default)]
    ticker1: String,
    #[serde(rename = "Ticker2", default)]
    ticker2: String,
    #[serde(rename = "Note", default)]
    note: String,
}

impl TryFrom<RawPortfolioRow> for PortfolioRow {
    type Error = RowError;

    fn try_from(raw: RawPortfolioRow) -> Result<Self, Self::Error> {
        let row_type = RowType::parse(&raw.row_type)?;
        PortfolioRow::new(row_type, &raw.ticker1, &raw.ticker2, &raw.note)
    }
}

impl From<PortfolioRow> for RawPortfolioRow {
    fn from(row: PortfolioRow) -> Self {
        RawPortfolioRow {
            row_type: row.row_type.as_str().to_string(),
            ticker1: row.ticker1,
            ticker2: row.ticker2.unwrap_or_default(),
            note: row.note,
        }
    }
}
