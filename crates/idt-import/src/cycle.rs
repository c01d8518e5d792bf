use chrono::{DateTime, Utc};
use idt_store::{NegativeCache, StoreError, SuccessLedger, TimeSeriesStore};
use serde::Serialize;
use tracing::info;

/// Default age past which cached series are purged at cycle start.
pub const DEFAULT_PURGE_SERIES_OLDER_THAN_HOURS: i64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleResetReport {
    pub negative_cache_cleared: bool,
    pub ledger_cleared: bool,
    pub purged_series: Vec<String>,
}

/// Start a new cycle: forget failures and successes of the previous one and
/// drop series too old to be worth keeping.
pub async fn reset_cycle(
    series: &TimeSeriesStore,
    negative: &NegativeCache,
    ledger: &SuccessLedger,
    purge_series_older_than: chrono::Duration,
    now: DateTime<Utc>,
) -> Result<CycleResetReport, StoreError> {
    let negative_cache_cleared = negative.reset().await?;
    let ledger_cleared = ledger.reset().await?;
    let purged_series = series.purge_older_than(purge_series_older_than, now).await?;

    info!(
        negative_cache_cleared,
        ledger_cleared,
        purged = purged_series.len(),
        "cycle reset"
    );
    Ok(CycleResetReport {
        negative_cache_cleared,
        ledger_cleared,
        purged_series,
    })
}
