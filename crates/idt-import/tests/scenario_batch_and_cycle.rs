//! Fan-out driver, ledger recording and cycle reset.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use idt_import::{import_rows, record_outcome, reset_cycle, ImportError, RowProcessor};
use idt_md::{FetchRequest, MarketDataClient, ProviderError};
use idt_schemas::{DailyBar, ImportResult, PortfolioRow, RowType, TimeSeries};
use idt_store::{
    AppendOutcome, MemoryBlobStore, NegativeCache, SuccessLedger, TimeSeriesStore,
    NEGATIVE_CACHE_KEY, SUCCESS_LEDGER_KEY,
};

struct SlowClient {
    failing: HashSet<String>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl MarketDataClient for SlowClient {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<TimeSeries, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Stagger completions so rows finish out of input order.
        let key = req.series_key();
        let jitter = (key.len() as u64 * 7) % 30;
        tokio::time::sleep(Duration::from_millis(jitter)).await;
        if self.failing.contains(&key) {
            return Err(ProviderError::Transport("connection reset".to_string()));
        }
        Ok(TimeSeries::new(
            key,
            vec![DailyBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open_micros: 1,
                high_micros: 1,
                low_micros: 1,
                close_micros: 1,
                volume: 0,
            }],
        ))
    }
}

struct Fixture {
    mem: Arc<MemoryBlobStore>,
    client: Arc<SlowClient>,
    series: TimeSeriesStore,
    negative: NegativeCache,
    ledger: SuccessLedger,
    processor: RowProcessor,
}

fn fixture(failing: &[&str]) -> Fixture {
    let mem = Arc::new(MemoryBlobStore::new());
    let client = Arc::new(SlowClient {
        failing: failing.iter().map(|s| s.to_string()).collect(),
        calls: AtomicUsize::new(0),
    });
    let series = TimeSeriesStore::new(mem.clone(), chrono::Duration::minutes(10));
    let negative = NegativeCache::new(mem.clone(), chrono::Duration::minutes(10)).with_cas_max_attempts(64);
    let ledger = SuccessLedger::new(mem.clone()).with_cas_max_attempts(64);
    let processor = RowProcessor::new(series.clone(), negative.clone(), client.clone());
    Fixture {
        mem,
        client,
        series,
        negative,
        ledger,
        processor,
    }
}

fn row(t: RowType, t1: &str, t2: &str, note: &str) -> PortfolioRow {
    PortfolioRow::new(t, t1, t2, note).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn outcomes_come_back_in_input_order() {
    let f = fixture(&["BAD"]);
    let rows = vec![
        row(RowType::StocksEtfs, "AAPL", "", "a"),
        row(RowType::StocksEtfs, "BAD", "", "b"),
        row(RowType::Forex, "EUR", "USD", "c"),
        row(RowType::StocksEtfs, "XLE", "SPY", "d"),
        row(RowType::StocksEtfs, "MSFTX", "", "e"),
    ];

    let outcomes = import_rows(&f.processor, &f.ledger, rows.clone(), 3).await;
    assert_eq!(outcomes.len(), rows.len());
    for (o, r) in outcomes.iter().zip(&rows) {
        assert_eq!(&o.row, r);
    }

    let notes_ok: Vec<bool> = outcomes
        .iter()
        .map(|o| o.result.as_ref().unwrap().is_success())
        .collect();
    assert_eq!(notes_ok, vec![true, false, true, true, true]);

    // Only successes reach the ledger.
    assert!(outcomes[1].recorded.is_none());
    let ledger = f.ledger.load().await.unwrap();
    let mut ledger_notes: Vec<&str> = ledger.iter().map(|e| e.note.as_str()).collect();
    ledger_notes.sort();
    assert_eq!(ledger_notes, vec!["a", "c", "d", "e"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_type_and_note_is_recorded_once() {
    let f = fixture(&[]);
    let rows = vec![
        row(RowType::StocksEtfs, "AAPL", "", "same"),
        row(RowType::StocksEtfs, "MSFT", "", "same"),
    ];
    let outcomes = import_rows(&f.processor, &f.ledger, rows, 1).await;

    assert_eq!(outcomes[0].recorded, Some(AppendOutcome::Appended { len: 1 }));
    assert_eq!(outcomes[1].recorded, Some(AppendOutcome::Duplicate { len: 1 }));
    let ledger = f.ledger.load().await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].ticker_1, "AAPL");
}

#[tokio::test]
async fn ledger_write_failure_is_attached_to_its_row() {
    let f = fixture(&[]);
    // Series is already fresh so the row itself needs no write; the ledger
    // append is the first write and fails.
    f.series
        .put(&TimeSeries::new(
            "AAPL",
            vec![DailyBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                open_micros: 1,
                high_micros: 1,
                low_micros: 1,
                close_micros: 1,
                volume: 0,
            }],
        ))
        .await
        .unwrap();
    f.mem.set_fail_writes(true);

    let outcomes = import_rows(
        &f.processor,
        &f.ledger,
        vec![row(RowType::StocksEtfs, "AAPL", "", "x")],
        2,
    )
    .await;
    assert!(matches!(outcomes[0].result, Err(ImportError::Store(_))));
    assert_eq!(f.client.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn record_outcome_ignores_failures() {
    let f = fixture(&[]);
    let failure = ImportResult::Failure(idt_schemas::ImportFailure {
        failed_ticker: "X".to_string(),
        note: "n".to_string(),
        api_call_count: 1,
    });
    assert_eq!(record_outcome(&f.ledger, &failure).await.unwrap(), None);
    assert!(f.mem.raw(SUCCESS_LEDGER_KEY).is_none());
}

#[tokio::test]
async fn reset_cycle_clears_state_and_purges_old_series() {
    let f = fixture(&["BAD"]);
    import_rows(
        &f.processor,
        &f.ledger,
        vec![
            row(RowType::StocksEtfs, "AAPL", "", "a"),
            row(RowType::StocksEtfs, "BAD", "", "b"),
            row(RowType::StocksEtfs, "OLD", "", "c"),
        ],
        2,
    )
    .await;
    f.mem.backdate("data-daily-OLD", chrono::Duration::hours(13));

    let report = reset_cycle(
        &f.series,
        &f.negative,
        &f.ledger,
        chrono::Duration::hours(12),
        Utc::now(),
    )
    .await
    .unwrap();

    assert!(report.negative_cache_cleared);
    assert!(report.ledger_cleared);
    assert_eq!(report.purged_series, vec!["data-daily-OLD".to_string()]);
    assert!(f.mem.raw(NEGATIVE_CACHE_KEY).is_none());
    assert!(f.mem.raw(SUCCESS_LEDGER_KEY).is_none());
    assert_eq!(f.mem.keys(), vec!["data-daily-AAPL".to_string()]);

    // BAD is retried in the new cycle.
    let before = f.client.calls.load(Ordering::SeqCst);
    f.processor
        .process(&row(RowType::StocksEtfs, "BAD", "", "b"))
        .await
        .unwrap();
    assert_eq!(f.client.calls.load(Ordering::SeqCst), before + 1);
}
