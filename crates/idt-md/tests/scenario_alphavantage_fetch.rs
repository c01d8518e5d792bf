//! Alpha Vantage client against a local mock server.
//!
//! Dates are generated relative to today so the history window never drifts
//! out from under the fixtures.

use chrono::{Duration, Utc};
use httpmock::prelude::*;
use idt_md::{AlphaVantageClient, MarketDataClient, ProviderError};

fn day(offset_days: i64) -> String {
    (Utc::now().date_naive() - Duration::days(offset_days))
        .format("%Y-%m-%d")
        .to_string()
}

fn stock_csv() -> String {
    format!(
        "timestamp,open,high,low,close,volume\n\
         {},182.34,185.00,181.00,184.50,1000000\n\
         {},180.00,183.00,179.00,182.00,900000\n\
         {},170.00,171.00,169.00,170.50,800000\n",
        day(1),
        day(2),
        // Outside an 18-month window.
        day(700),
    )
}

fn client(server: &MockServer) -> AlphaVantageClient {
    AlphaVantageClient::new_with_base_url("test-key".to_string(), server.base_url())
}

#[tokio::test]
async fn stock_fetch_sends_expected_query_and_normalizes() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/query")
                .query_param("function", "TIME_SERIES_DAILY")
                .query_param("symbol", "AAPL")
                .query_param("outputsize", "full")
                .query_param("datatype", "csv")
                .query_param("apikey", "test-key");
            then.status(200)
                .header("content-type", "application/x-download")
                .body(stock_csv());
        })
        .await;

    let series = client(&server).fetch_stock("AAPL").await.unwrap();
    mock.assert_async().await;

    assert_eq!(series.key, "AAPL");
    assert_eq!(series.len(), 2, "bar older than the window must be dropped");
    assert!(series.is_strictly_ascending());
    assert_eq!(series.bars[0].close_micros, 182_000_000);
    assert_eq!(series.bars[1].close_micros, 184_500_000);
    assert_eq!(series.bars[1].volume, 1_000_000);
}

#[tokio::test]
async fn fx_fetch_uses_fx_daily_and_zero_volume() {
    let server = MockServer::start_async().await;
    let body = format!(
        "timestamp,open,high,low,close\n{},1.0771,1.0805,1.0761,1.0776\n",
        day(1)
    );
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/query")
                .query_param("function", "FX_DAILY")
                .query_param("from_symbol", "EUR")
                .query_param("to_symbol", "USD");
            then.status(200).body(body);
        })
        .await;

    let series = client(&server).fetch_fx("EUR", "USD").await.unwrap();
    mock.assert_async().await;

    assert_eq!(series.key, "EUR-USD");
    assert_eq!(series.len(), 1);
    assert_eq!(series.bars[0].volume, 0);
    assert_eq!(series.bars[0].close_micros, 1_077_600);
}

#[tokio::test]
async fn invalid_symbol_error_document_maps_to_api_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/query");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"Error Message": "Invalid API call. Please retry or visit the documentation."}"#);
        })
        .await;

    let err = client(&server).fetch_stock("NOPE").await.unwrap_err();
    assert!(matches!(err, ProviderError::Api { code: None, .. }), "got {err:?}");
    assert!(err.is_upstream());
}

#[tokio::test]
async fn http_status_error_maps_to_api_error_with_code() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/query");
            then.status(503).body("upstream unavailable");
        })
        .await;

    let err = client(&server).fetch_stock("AAPL").await.unwrap_err();
    match err {
        ProviderError::Api { code, .. } => assert_eq!(code, Some(503)),
        other => panic!("expected Api error, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_upstream_maps_to_timeout() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/query");
            then.status(200)
                .delay(std::time::Duration::from_millis(500))
                .body(stock_csv());
        })
        .await;

    let c = client(&server).with_request_timeout(std::time::Duration::from_millis(50));
    let err = c.fetch_stock("AAPL").await.unwrap_err();
    assert_eq!(err, ProviderError::Timeout { after_ms: 50 });
}

#[tokio::test]
async fn all_bars_outside_window_is_data_shape_error() {
    let server = MockServer::start_async().await;
    let body = format!("timestamp,open,high,low,close,volume\n{},1,1,1,1,1\n", day(900));
    server
        .mock_async(|when, then| {
            when.method(GET).path("/query");
            then.status(200).body(body);
        })
        .await;

    let err = client(&server).fetch_stock("OLD").await.unwrap_err();
    assert!(matches!(err, ProviderError::DataShape(_)), "got {err:?}");
}

#[tokio::test]
async fn transport_error_does_not_leak_api_key() {
    // Nothing listens on port 9 (discard) in the test environment.
    let c = AlphaVantageClient::new_with_base_url(
        "leaky-key-123".to_string(),
        "http://127.0.0.1:9".to_string(),
    );
    let err = c.fetch_stock("AAPL").await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)), "got {err:?}");
    assert!(!err.to_string().contains("leaky-key-123"));
}
