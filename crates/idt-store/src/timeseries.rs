//! Positive cache: one normalized series per ticker or pair key.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use idt_schemas::{series_blob_key, TimeSeries, SERIES_KEY_PREFIX};
use tracing::{debug, info, warn};

use crate::blob::{BlobMeta, BlobStore};
use crate::error::{with_deadline, StoreError};
use crate::StoreTimeouts;

/// Result of the metadata probe for one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh { age: chrono::Duration },
    Stale { age: chrono::Duration },
    Absent,
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh { .. })
    }
}

#[derive(Clone)]
pub struct TimeSeriesStore {
    store: Arc<dyn BlobStore>,
    max_age: chrono::Duration,
    timeouts: StoreTimeouts,
}

impl TimeSeriesStore {
    pub fn new(store: Arc<dyn BlobStore>, max_age: chrono::Duration) -> Self {
        Self {
            store,
            max_age,
            timeouts: StoreTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: StoreTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn max_age(&self) -> chrono::Duration {
        self.max_age
    }

    /// Fresh iff `now - last_modified < max_age`. Only the metadata probe
    /// is issued; the payload is not downloaded.
    pub async fn freshness(&self, key: &str, now: DateTime<Utc>) -> Result<Freshness, StoreError> {
        let blob_key = series_blob_key(key);
        let meta = with_deadline("head", self.timeouts.probe, self.store.head(&blob_key)).await?;
        Ok(classify(meta.as_ref(), now, self.max_age))
    }

    /// Read a stored series.
    ///
    /// A blob that does not decode, belongs to a different key, or is not
    /// strictly ascending is reported as absent.
    pub async fn lookup(&self, key: &str) -> Result<Option<(TimeSeries, BlobMeta)>, StoreError> {
        let blob_key = series_blob_key(key);
        let Some(blob) = with_deadline("get", self.timeouts.read, self.store.get(&blob_key)).await? else {
            return Ok(None);
        };

        match decode_series(key, &blob.bytes) {
            Ok(series) => Ok(Some((series, blob.meta))),
            Err(e) => {
                warn!(key, error = %e, "ignoring corrupt cached series");
                Ok(None)
            }
        }
    }

    /// Replace the stored series for `series.key`. Returns the blob key.
    pub async fn put(&self, series: &TimeSeries) -> Result<String, StoreError> {
        let blob_key = series_blob_key(&series.key);
        let bytes = serde_json::to_vec(series)
            .map_err(|e| StoreError::Persistence(format!("encode series '{}': {e}", series.key)))?;
        with_deadline("put", self.timeouts.write, self.store.put(&blob_key, bytes)).await?;
        debug!(key = %series.key, bars = series.len(), "series cached");
        Ok(blob_key)
    }

    /// Delete every series blob last modified more than `older_than` ago.
    pub async fn purge_older_than(
        &self,
        older_than: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        let entries = with_deadline("list", self.timeouts.read, self.store.list()).await?;
        let doomed: Vec<String> = entries
            .into_iter()
            .filter(|e| e.key.starts_with(SERIES_KEY_PREFIX))
            .filter(|e| now - e.meta.last_modified > older_than)
            .map(|e| e.key)
            .collect();

        if !doomed.is_empty() {
            with_deadline("delete", self.timeouts.write, self.store.delete_many(&doomed)).await?;
            info!(count = doomed.len(), "purged old series");
        }
        Ok(doomed)
    }
}

fn classify(meta: Option<&BlobMeta>, now: DateTime<Utc>, max_age: chrono::Duration) -> Freshness {
    match meta {
        None => Freshness::Absent,
        Some(m) => {
            let age = now - m.last_modified;
            if age < max_age {
                Freshness::Fresh { age }
            } else {
                Freshness::Stale { age }
            }
        }
    }
}

fn decode_series(key: &str, bytes: &[u8]) -> Result<TimeSeries, StoreError> {
    let corrupt = |reason: String| StoreError::Corruption {
        key: series_blob_key(key),
        reason,
    };
    let series: TimeSeries = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    if series.key != key {
        return Err(corrupt(format!("holds series for '{}'", series.key)));
    }
    if !series.is_strictly_ascending() {
        return Err(corrupt("dates not strictly ascending".to_string()));
    }
    Ok(series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use chrono::NaiveDate;
    use idt_schemas::DailyBar;

    fn bar(d: u32, close: i64) -> DailyBar {
        DailyBar {
            date: NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            open_micros: close,
            high_micros: close,
            low_micros: close,
            close_micros: close,
            volume: 10,
        }
    }

    fn setup() -> (Arc<MemoryBlobStore>, TimeSeriesStore) {
        let mem = Arc::new(MemoryBlobStore::new());
        let ts = TimeSeriesStore::new(mem.clone(), chrono::Duration::minutes(10));
        (mem, ts)
    }

    #[tokio::test]
    async fn put_then_lookup_round_trips() {
        let (_, ts) = setup();
        let s = TimeSeries::new("AAPL", vec![bar(2, 1_500_000), bar(3, 1_600_000)]);
        let blob_key = ts.put(&s).await.unwrap();
        assert_eq!(blob_key, "data-daily-AAPL");

        let (back, _) = ts.lookup("AAPL").await.unwrap().unwrap();
        assert_eq!(back, s);
    }

    #[tokio::test]
    async fn freshness_fresh_then_stale_then_absent() {
        let (mem, ts) = setup();
        assert_eq!(ts.freshness("AAPL", Utc::now()).await.unwrap(), Freshness::Absent);

        ts.put(&TimeSeries::new("AAPL", vec![bar(2, 1)])).await.unwrap();
        assert!(ts.freshness("AAPL", Utc::now()).await.unwrap().is_fresh());

        mem.backdate("data-daily-AAPL", chrono::Duration::minutes(10));
        assert!(matches!(
            ts.freshness("AAPL", Utc::now()).await.unwrap(),
            Freshness::Stale { .. }
        ));
    }

    #[test]
    fn exactly_max_age_is_stale() {
        let now = Utc::now();
        let meta = BlobMeta {
            last_modified: now - chrono::Duration::minutes(10),
            size: 1,
        };
        assert_eq!(
            classify(Some(&meta), now, chrono::Duration::minutes(10)),
            Freshness::Stale {
                age: chrono::Duration::minutes(10)
            }
        );
    }

    #[tokio::test]
    async fn corrupt_blob_reads_as_absent() {
        let (mem, ts) = setup();
        mem.insert_raw("data-daily-AAPL", b"not json");
        assert!(ts.lookup("AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn descending_blob_reads_as_absent() {
        let (mem, ts) = setup();
        let s = TimeSeries::new("AAPL", vec![bar(3, 1), bar(2, 1)]);
        mem.insert_raw("data-daily-AAPL", &serde_json::to_vec(&s).unwrap());
        assert!(ts.lookup("AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn purge_only_touches_old_series() {
        let (mem, ts) = setup();
        ts.put(&TimeSeries::new("OLD", vec![bar(2, 1)])).await.unwrap();
        ts.put(&TimeSeries::new("NEW", vec![bar(2, 1)])).await.unwrap();
        mem.insert_raw("failed_imports", b"[]");
        mem.backdate("data-daily-OLD", chrono::Duration::hours(13));
        mem.backdate("failed_imports", chrono::Duration::hours(13));

        let purged = ts
            .purge_older_than(chrono::Duration::hours(12), Utc::now())
            .await
            .unwrap();
        assert_eq!(purged, vec!["data-daily-OLD".to_string()]);
        assert_eq!(
            mem.keys(),
            vec!["data-daily-NEW".to_string(), "failed_imports".to_string()]
        );
    }

    #[tokio::test]
    async fn write_failure_is_persistence_error() {
        let (mem, ts) = setup();
        mem.set_fail_writes(true);
        let err = ts.put(&TimeSeries::new("AAPL", vec![bar(2, 1)])).await.unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
    }
}
