//! Provider boundary for daily market-data ingestion.
//!
//! This module defines **only** the fetch request, the error type and the
//! client trait. No HTTP, no CSV, no caching belong here.

use std::fmt;

use idt_schemas::{pair_key, TimeSeries};

use crate::ingest_csv::CsvIngestError;
use crate::normalizer::{NormalizerError, VolumePolicy};

// ---------------------------------------------------------------------------
// Fetch request
// ---------------------------------------------------------------------------

/// What to fetch: one stock/ETF symbol, or one currency pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchRequest {
    Stock { symbol: String },
    Fx { from_symbol: String, to_symbol: String },
}

impl FetchRequest {
    pub fn stock(symbol: &str) -> Self {
        FetchRequest::Stock {
            symbol: symbol.to_string(),
        }
    }

    pub fn fx(from_symbol: &str, to_symbol: &str) -> Self {
        FetchRequest::Fx {
            from_symbol: from_symbol.to_string(),
            to_symbol: to_symbol.to_string(),
        }
    }

    /// Ticker, or `FROM-TO` for a pair. Used as the series key.
    pub fn series_key(&self) -> String {
        match self {
            FetchRequest::Stock { symbol } => symbol.clone(),
            FetchRequest::Fx {
                from_symbol,
                to_symbol,
            } => pair_key(from_symbol, to_symbol),
        }
    }

    pub fn volume_policy(&self) -> VolumePolicy {
        match self {
            FetchRequest::Stock { .. } => VolumePolicy::FromProvider,
            FetchRequest::Fx { .. } => VolumePolicy::Zero,
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that a [`MarketDataClient`] implementation may return.
///
/// None of these are retried by the client itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network or transport failure.
    Transport(String),
    /// The request did not complete within its deadline.
    Timeout { after_ms: u64 },
    /// The upstream API returned an application-level error (HTTP status or
    /// an error document in place of data).
    Api { code: Option<i64>, message: String },
    /// The payload was not tabular, lacked OHLC columns, or held values that
    /// could not be normalized.
    DataShape(String),
    /// A required configuration value (e.g. API key) is missing or invalid.
    Config(String),
}

impl ProviderError {
    /// `true` for transport / upstream failures, `false` for shape problems.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ProviderError::Transport(_) | ProviderError::Timeout { .. } | ProviderError::Api { .. }
        )
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "transport error: {msg}"),
            ProviderError::Timeout { after_ms } => {
                write!(f, "request timed out after {after_ms}ms")
            }
            ProviderError::Api {
                code: Some(c),
                message,
            } => {
                write!(f, "provider api error code={c}: {message}")
            }
            ProviderError::Api {
                code: None,
                message,
            } => {
                write!(f, "provider api error: {message}")
            }
            ProviderError::DataShape(msg) => write!(f, "data shape error: {msg}"),
            ProviderError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<CsvIngestError> for ProviderError {
    fn from(e: CsvIngestError) -> Self {
        ProviderError::DataShape(e.to_string())
    }
}

impl From<NormalizerError> for ProviderError {
    fn from(e: NormalizerError) -> Self {
        ProviderError::DataShape(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Upstream daily time-series source.
///
/// One call = one upstream request. Implementations must be object-safe and
/// `Send + Sync` so a row processor can hold an `Arc<dyn MarketDataClient>`.
#[async_trait::async_trait]
pub trait MarketDataClient: Send + Sync {
    /// Human-readable name identifying this provider (e.g. `"alphavantage"`).
    fn name(&self) -> &'static str;

    /// Fetch and normalize the full daily history window for `req`.
    async fn fetch(&self, req: &FetchRequest) -> Result<TimeSeries, ProviderError>;

    async fn fetch_stock(&self, ticker: &str) -> Result<TimeSeries, ProviderError> {
        self.fetch(&FetchRequest::stock(ticker)).await
    }

    async fn fetch_fx(&self, from_symbol: &str, to_symbol: &str) -> Result<TimeSeries, ProviderError> {
        self.fetch(&FetchRequest::fx(from_symbol, to_symbol)).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
