//! Fan-out over many rows with bounded concurrency.

use futures_util::stream::{self, StreamExt};
use idt_schemas::{ImportResult, PortfolioRow};
use idt_store::{AppendOutcome, StoreError, SuccessLedger};
use tracing::{error, info};

use crate::error::ImportError;
use crate::processor::RowProcessor;

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug)]
pub struct RowOutcome {
    pub row: PortfolioRow,
    pub result: Result<ImportResult, ImportError>,
    /// Ledger outcome for successful rows.
    pub recorded: Option<AppendOutcome>,
}

/// Append `result` to the ledger if it is a success.
pub async fn record_outcome(
    ledger: &SuccessLedger,
    result: &ImportResult,
) -> Result<Option<AppendOutcome>, StoreError> {
    match result.as_success() {
        Some(s) => ledger.append_dedup(s).await.map(Some),
        None => Ok(None),
    }
}

/// Process every row, record successes, and return outcomes in input order.
///
/// A fatal error is attached to its own row; the other rows still run.
pub async fn import_rows(
    processor: &RowProcessor,
    ledger: &SuccessLedger,
    rows: Vec<PortfolioRow>,
    concurrency: usize,
) -> Vec<RowOutcome> {
    let total = rows.len();

    let mut indexed: Vec<(usize, RowOutcome)> = stream::iter(rows.into_iter().enumerate())
        .map(|(idx, row)| async move {
            let (result, recorded) = match processor.process(&row).await {
                Ok(res) => match record_outcome(ledger, &res).await {
                    Ok(recorded) => (Ok(res), recorded),
                    Err(e) => (Err(ImportError::Store(e)), None),
                },
                Err(e) => (Err(e), None),
            };
            if let Err(e) = &result {
                error!(row = idx, ticker = row.ticker1(), error = %e, "row aborted");
            }
            (idx, RowOutcome { row, result, recorded })
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    indexed.sort_by_key(|(idx, _)| *idx);
    let outcomes: Vec<RowOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

    let mut succeeded = 0;
    let mut failed = 0;
    let mut aborted = 0;
    let mut api_calls = 0u32;
    for o in &outcomes {
        match &o.result {
            Ok(r) if r.is_success() => succeeded += 1,
            Ok(_) => failed += 1,
            Err(_) => aborted += 1,
        }
        if let Ok(r) = &o.result {
            api_calls += r.api_call_count();
        }
    }
    info!(total, succeeded, failed, aborted, api_calls, "batch import finished");

    outcomes
}
