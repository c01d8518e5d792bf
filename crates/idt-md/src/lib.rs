//! idt-md
//!
//! Daily market-data retrieval: the provider abstraction plus the Alpha
//! Vantage client that fetches, decodes and normalizes daily series.
//!
//! This crate does **not** cache or persist anything; callers decide when a
//! fetch is needed and hand the resulting [`TimeSeries`] to the store.

pub mod ingest_csv;
pub mod normalizer;
pub mod provider;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use idt_schemas::TimeSeries;
use serde::Deserialize;
use tracing::debug;

pub use provider::{FetchRequest, MarketDataClient, ProviderError};

/// Default trailing window: one and a half years.
pub const DEFAULT_HISTORY_WINDOW_HOURS: i64 = 13_140;

pub const ALPHA_VANTAGE_BASE_URL: &str = "https://www.alphavantage.co";

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Alpha Vantage daily time-series client.
///
/// The API key is passed in by the caller and never logged.
#[derive(Clone)]
pub struct AlphaVantageClient {
    api_key: String,
    http: reqwest::Client,
    base_url: String,
    history_window: chrono::Duration,
    request_timeout: Duration,
}

impl fmt::Debug for AlphaVantageClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlphaVantageClient")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .field("history_window", &self.history_window)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl AlphaVantageClient {
    pub fn new(api_key: String) -> Self {
        Self::new_with_base_url(api_key, ALPHA_VANTAGE_BASE_URL.to_string())
    }

    pub fn new_with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            api_key,
            http: reqwest::Client::new(),
            base_url,
            history_window: chrono::Duration::hours(DEFAULT_HISTORY_WINDOW_HOURS),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_history_window(mut self, window: chrono::Duration) -> Self {
        self.history_window = window;
        self
    }

    /// Per-request deadline. Exceeding it yields [`ProviderError::Timeout`].
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    fn window_start(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, ProviderError> {
        now.checked_sub_signed(self.history_window).ok_or_else(|| {
            ProviderError::Config(format!(
                "history window of {} hours reaches before the earliest representable date",
                self.history_window.num_hours()
            ))
        })
    }

    fn build_query_url(&self) -> String {
        format!("{}/query", self.base_url.trim_end_matches('/'))
    }

    fn query_params<'a>(&'a self, req: &'a FetchRequest) -> Vec<(&'static str, &'a str)> {
        let mut params: Vec<(&'static str, &'a str)> = match req {
            FetchRequest::Stock { symbol } => vec![
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol.as_str()),
            ],
            FetchRequest::Fx {
                from_symbol,
                to_symbol,
            } => vec![
                ("function", "FX_DAILY"),
                ("from_symbol", from_symbol.as_str()),
                ("to_symbol", to_symbol.as_str()),
            ],
        };
        params.push(("outputsize", "full"));
        params.push(("datatype", "csv"));
        params.push(("apikey", self.api_key.as_str()));
        params
    }

    fn map_transport(&self, e: reqwest::Error) -> ProviderError {
        if e.is_timeout() {
            ProviderError::Timeout {
                after_ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            // The URL carries the API key.
            ProviderError::Transport(e.without_url().to_string())
        }
    }
}

#[async_trait::async_trait]
impl MarketDataClient for AlphaVantageClient {
    fn name(&self) -> &'static str {
        "alphavantage"
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<TimeSeries, ProviderError> {
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::Config("alpha vantage api key is empty".to_string()));
        }

        let window_start = self.window_start(Utc::now())?;
        let key = req.series_key();
        debug!(provider = self.name(), series = %key, "requesting daily series");

        let resp = self
            .http
            .get(self.build_query_url())
            .query(&self.query_params(req))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.map_transport(e))?;

        if !status.is_success() {
            return Err(ProviderError::Api {
                code: Some(i64::from(status.as_u16())),
                message: error_document_message(&body)
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("http error").to_string()),
            });
        }

        let series = series_from_body(&key, &body, req, window_start)?;
        debug!(series = %key, bars = series.len(), "daily series normalized");
        Ok(series)
    }
}

/// Decode a successful response body into a normalized series.
///
/// Alpha Vantage answers errors and rate limits with HTTP 200 and a JSON
/// document in place of the CSV table; those become [`ProviderError::Api`].
pub fn series_from_body(
    key: &str,
    body: &str,
    req: &FetchRequest,
    window_start: DateTime<Utc>,
) -> Result<TimeSeries, ProviderError> {
    if body.trim_start().starts_with('{') {
        let message = error_document_message(body)
            .unwrap_or_else(|| "unexpected JSON document instead of CSV".to_string());
        return Err(ProviderError::Api {
            code: None,
            message,
        });
    }

    let raw = ingest_csv::parse_daily_csv(body)?;
    Ok(normalizer::build_series(key, &raw, req.volume_policy(), window_start)?)
}

#[derive(Debug, Deserialize)]
struct AlphaVantageErrorDocument {
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

fn error_document_message(body: &str) -> Option<String> {
    let doc: AlphaVantageErrorDocument = serde_json::from_str(body).ok()?;
    doc.error_message.or(doc.note).or(doc.information)
}

// -----------------
// Tests (no network)
// -----------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn query_params_for_stock() {
        let c = AlphaVantageClient::new("k".to_string());
        let req = FetchRequest::stock("AAPL");
        let p = c.query_params(&req);
        assert!(p.contains(&("function", "TIME_SERIES_DAILY")));
        assert!(p.contains(&("symbol", "AAPL")));
        assert!(p.contains(&("outputsize", "full")));
        assert!(p.contains(&("datatype", "csv")));
        assert!(p.contains(&("apikey", "k")));
    }

    #[test]
    fn query_params_for_fx() {
        let c = AlphaVantageClient::new("k".to_string());
        let req = FetchRequest::fx("EUR", "USD");
        let p = c.query_params(&req);
        assert!(p.contains(&("function", "FX_DAILY")));
        assert!(p.contains(&("from_symbol", "EUR")));
        assert!(p.contains(&("to_symbol", "USD")));
    }

    #[test]
    fn debug_redacts_api_key() {
        let c = AlphaVantageClient::new("super-secret".to_string());
        let s = format!("{c:?}");
        assert!(!s.contains("super-secret"));
        assert!(s.contains("<REDACTED>"));
    }

    #[test]
    fn url_trims_trailing_slash() {
        let c = AlphaVantageClient::new_with_base_url("k".to_string(), "http://h/".to_string());
        assert_eq!(c.build_query_url(), "http://h/query");
    }

    #[test]
    fn json_error_document_is_api_error() {
        let body = r#"{"Error Message": "Invalid API call."}"#;
        let err = series_from_body("X", body, &FetchRequest::stock("X"), epoch()).unwrap_err();
        assert_eq!(
            err,
            ProviderError::Api {
                code: None,
                message: "Invalid API call.".to_string()
            }
        );
    }

    #[test]
    fn rate_limit_note_is_api_error() {
        let body = r#"{"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute."}"#;
        let err = series_from_body("X", body, &FetchRequest::stock("X"), epoch()).unwrap_err();
        assert!(matches!(err, ProviderError::Api { code: None, .. }));
        assert!(err.to_string().contains("call frequency"));
    }

    #[test]
    fn csv_without_close_is_data_shape() {
        let body = "timestamp,open,high,low\n2024-01-02,1,2,0.5\n";
        let err = series_from_body("X", body, &FetchRequest::stock("X"), epoch()).unwrap_err();
        assert!(matches!(err, ProviderError::DataShape(_)));
    }

    #[test]
    fn fx_body_normalized_with_zero_volume() {
        let body = "timestamp,open,high,low,close\n2024-01-03,1.1,1.2,1.0,1.15\n2024-01-02,1.0,1.1,0.9,1.05\n";
        let s = series_from_body("EUR-USD", body, &FetchRequest::fx("EUR", "USD"), epoch()).unwrap();
        assert_eq!(s.key, "EUR-USD");
        assert_eq!(s.len(), 2);
        assert!(s.is_strictly_ascending());
        assert!(s.bars.iter().all(|b| b.volume == 0));
        assert_eq!(s.bars[1].close_micros, 1_150_000);
    }

    #[tokio::test]
    async fn oversized_history_window_is_config_error() {
        let c = AlphaVantageClient::new_with_base_url("k".to_string(), "http://127.0.0.1:9".to_string())
            .with_history_window(chrono::Duration::milliseconds(i64::MAX));
        let err = c.fetch_stock("AAPL").await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(ref m) if m.contains("history window")));
    }

    #[tokio::test]
    async fn empty_api_key_is_config_error() {
        let c = AlphaVantageClient::new_with_base_url("  ".to_string(), "http://127.0.0.1:9".to_string());
        let err = c.fetch_stock("AAPL").await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }
}
