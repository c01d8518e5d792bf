//! idt-store
//!
//! Persistent state shared by every row invocation: the series cache, the
//! per-cycle negative cache and the success ledger, all on top of a
//! key-addressed [`BlobStore`].
//!
//! This crate does **not** fetch market data and does not decide when a
//! fetch is needed; it only answers "what is stored, and how old is it".

pub mod blob;
pub mod error;
pub mod ledger;
pub mod negative;
pub mod timeseries;

mod cas;

use std::time::Duration;

pub use blob::{etag_for, Blob, BlobEntry, BlobMeta, BlobStore, FsBlobStore, PutCondition};
#[cfg(any(test, feature = "testkit"))]
pub use blob::MemoryBlobStore;
pub use error::StoreError;
pub use ledger::{AppendOutcome, SuccessLedger};
pub use negative::NegativeCache;
pub use timeseries::{Freshness, TimeSeriesStore};

/// Blob holding the per-cycle list of failing tickers / pair keys.
pub const NEGATIVE_CACHE_KEY: &str = "failed_imports";
/// Blob holding the deduplicated list of successful imports.
pub const SUCCESS_LEDGER_KEY: &str = "success_imports";

pub const DEFAULT_CAS_MAX_ATTEMPTS: u32 = 8;

/// Deadlines for store I/O. The metadata probe is expected to be much
/// cheaper than a payload read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreTimeouts {
    pub probe: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for StoreTimeouts {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(2),
            read: Duration::from_secs(10),
            write: Duration::from_secs(10),
        }
    }
}
