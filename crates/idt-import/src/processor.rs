//! Per-row import state machine.
//!
//! For every key a row needs (one ticker, two tickers, or one pair key):
//!
//! ```text
//! CheckNegative ──hit──▶ Failure (0 calls)
//!      │
//! CheckFresh ────hit──▶ Success (0 calls)
//!      │
//!    Fetch ──err──▶ RecordFailure ─▶ Failure (1 call)
//!      │
//!     Put ─────────────▶ Success (1 call)
//! ```
//!
//! Relative stock pairs run the sequence for each ticker in turn and stop at
//! the first failure; FX rows run it once for the combined key.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use idt_md::{FetchRequest, MarketDataClient, ProviderError};
use idt_schemas::{
    pair_key, series_blob_key, ImportFailure, ImportKind, ImportResult, ImportSuccess,
    PortfolioRow, RowShape, TimeSeries,
};
use idt_store::{Freshness, NegativeCache, TimeSeriesStore};
use tracing::{debug, info, warn};

use crate::error::ImportError;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Outcome for one key inside a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyState {
    Cached,
    Fetched,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KeyOutcome {
    state: KeyState,
    api_calls: u32,
}

impl KeyOutcome {
    fn ok(&self) -> bool {
        self.state != KeyState::Failed
    }
}

#[derive(Clone)]
pub struct RowProcessor {
    series: TimeSeriesStore,
    negative: NegativeCache,
    client: Arc<dyn MarketDataClient>,
    fetch_timeout: Duration,
}

impl RowProcessor {
    pub fn new(series: TimeSeriesStore, negative: NegativeCache, client: Arc<dyn MarketDataClient>) -> Self {
        Self {
            series,
            negative,
            client,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Import one row.
    ///
    /// Fetch and data-shape problems become a `Failure` result; only store
    /// failures and an unusable provider are returned as `Err`.
    pub async fn process(&self, row: &PortfolioRow) -> Result<ImportResult, ImportError> {
        let now = Utc::now();
        // Snapshot of the shared list, plus whatever fails during this row.
        let mut failed = self.negative.load(now).await?;

        let result = match row.shape() {
            RowShape::Single { ticker } => {
                let out = self.import_key(ticker, FetchRequest::stock(ticker), &mut failed, now).await?;
                if out.ok() {
                    success(row, ImportKind::StocksSingle, ticker, None, out.api_calls)
                } else {
                    failure(row, ticker, out.api_calls)
                }
            }
            RowShape::RelativePair { ticker1, ticker2 } => {
                let first = self.import_key(ticker1, FetchRequest::stock(ticker1), &mut failed, now).await?;
                if !first.ok() {
                    failure(row, ticker1, first.api_calls)
                } else {
                    let second = self.import_key(ticker2, FetchRequest::stock(ticker2), &mut failed, now).await?;
                    let calls = first.api_calls + second.api_calls;
                    if second.ok() {
                        success(row, ImportKind::StocksRelativeTwo, ticker1, Some(ticker2), calls)
                    } else {
                        failure(row, ticker2, calls)
                    }
                }
            }
            RowShape::Fx { from, to } => {
                let key = pair_key(from, to);
                let out = self.import_key(&key, FetchRequest::fx(from, to), &mut failed, now).await?;
                if out.ok() {
                    fx_success(row, from, to, &key, out.api_calls)
                } else {
                    failure(row, &key, out.api_calls)
                }
            }
        };

        info!(
            row_type = row.row_type().as_str(),
            ticker = row.ticker1(),
            success = result.is_success(),
            api_calls = result.api_call_count(),
            "row processed"
        );
        Ok(result)
    }

    async fn import_key(
        &self,
        key: &str,
        req: FetchRequest,
        failed: &mut BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> Result<KeyOutcome, ImportError> {
        if failed.contains(key) {
            debug!(key, "negative cache hit; skipping fetch");
            return Ok(KeyOutcome {
                state: KeyState::Failed,
                api_calls: 0,
            });
        }

        match self.series.freshness(key, now).await? {
            Freshness::Fresh { age } => {
                debug!(key, age_secs = age.num_seconds(), "fresh cached series");
                return Ok(KeyOutcome {
                    state: KeyState::Cached,
                    api_calls: 0,
                });
            }
            Freshness::Stale { age } => debug!(key, age_secs = age.num_seconds(), "cached series is stale"),
            Freshness::Absent => debug!(key, "no cached series"),
        }

        let fetched = match tokio::time::timeout(self.fetch_timeout, self.client.fetch(&req)).await {
            Ok(res) => res,
            Err(_) => Err(ProviderError::Timeout {
                after_ms: self.fetch_timeout.as_millis() as u64,
            }),
        };

        match fetched {
            Ok(series) => {
                self.store_series(key, series).await?;
                Ok(KeyOutcome {
                    state: KeyState::Fetched,
                    api_calls: 1,
                })
            }
            Err(e) => {
                if let Some(fatal) = ImportError::from_provider(&e) {
                    return Err(fatal);
                }
                warn!(key, provider = self.client.name(), error = %e, "import failed");
                failed.insert(key.to_string());
                self.negative.record_failure(key, now).await?;
                Ok(KeyOutcome {
                    state: KeyState::Failed,
                    api_calls: 1,
                })
            }
        }
    }

    async fn store_series(&self, key: &str, mut series: TimeSeries) -> Result<(), ImportError> {
        if series.key != key {
            debug!(key, returned = %series.key, "provider returned a different series key; storing under requested key");
            series.key = key.to_string();
        }
        self.series.put(&series).await?;
        Ok(())
    }
}

fn success(row: &PortfolioRow, kind: ImportKind, t1: &str, t2: Option<&str>, api_calls: u32) -> ImportResult {
    ImportResult::Success(ImportSuccess {
        kind,
        note: row.note().to_string(),
        ticker_1: t1.to_string(),
        ticker_2: t2.map(str::to_string),
        file_1: series_blob_key(t1),
        file_2: t2.map(series_blob_key),
        api_call_count: api_calls,
    })
}

fn fx_success(row: &PortfolioRow, from: &str, to: &str, key: &str, api_calls: u32) -> ImportResult {
    ImportResult::Success(ImportSuccess {
        kind: ImportKind::Fx,
        note: row.note().to_string(),
        ticker_1: from.to_string(),
        ticker_2: Some(to.to_string()),
        file_1: series_blob_key(key),
        file_2: None,
        api_call_count: api_calls,
    })
}

fn failure(row: &PortfolioRow, failed_ticker: &str, api_calls: u32) -> ImportResult {
    ImportResult::Failure(ImportFailure {
        failed_ticker: failed_ticker.to_string(),
        note: row.note().to_string(),
        api_call_count: api_calls,
    })
}
