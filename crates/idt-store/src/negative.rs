//! Per-cycle negative cache: keys that already failed to import.
//!
//! Stored as a JSON array of strings under [`NEGATIVE_CACHE_KEY`]. The list
//! is a best-effort hint: a lost marker costs one redundant upstream call,
//! so corruption, staleness and an exhausted CAS budget all degrade to
//! "not recorded" rather than erroring. Store I/O failures still propagate.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::blob::{Blob, BlobStore};
use crate::cas::{self, Mutation};
use crate::error::{with_deadline, StoreError};
use crate::{StoreTimeouts, DEFAULT_CAS_MAX_ATTEMPTS, NEGATIVE_CACHE_KEY};

#[derive(Clone)]
pub struct NegativeCache {
    store: Arc<dyn BlobStore>,
    max_age: chrono::Duration,
    cas_max_attempts: u32,
    timeouts: StoreTimeouts,
}

impl NegativeCache {
    pub fn new(store: Arc<dyn BlobStore>, max_age: chrono::Duration) -> Self {
        Self {
            store,
            max_age,
            cas_max_attempts: DEFAULT_CAS_MAX_ATTEMPTS,
            timeouts: StoreTimeouts::default(),
        }
    }

    pub fn with_cas_max_attempts(mut self, n: u32) -> Self {
        self.cas_max_attempts = n;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StoreTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Current set of failed keys. Absent, stale or corrupt lists are empty.
    pub async fn load(&self, now: DateTime<Utc>) -> Result<BTreeSet<String>, StoreError> {
        let blob = with_deadline("get", self.timeouts.read, self.store.get(NEGATIVE_CACHE_KEY)).await?;
        Ok(self.live_entries(blob.as_ref(), now).into_iter().collect())
    }

    /// Add `key` to the list. Returns `false` if the marker could not be
    /// written within the CAS budget (logged, not an error).
    pub async fn record_failure(&self, key: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let res = cas::update(
            self.store.as_ref(),
            NEGATIVE_CACHE_KEY,
            self.cas_max_attempts,
            &self.timeouts,
            |current| {
                let mut list = self.live_entries(current, now);
                if list.iter().any(|k| k == key) {
                    return Ok(Mutation::Keep(()));
                }
                list.push(key.to_string());
                let bytes = serde_json::to_vec(&list)
                    .map_err(|e| StoreError::Persistence(format!("encode negative cache: {e}")))?;
                Ok(Mutation::Write(bytes, ()))
            },
        )
        .await?;

        match res {
            Some(()) => {
                info!(key, "recorded failed import");
                Ok(true)
            }
            None => {
                warn!(
                    key,
                    attempts = self.cas_max_attempts,
                    "negative cache contended; failure marker dropped"
                );
                Ok(false)
            }
        }
    }

    /// Drop the whole list. Returns whether anything was deleted.
    pub async fn reset(&self) -> Result<bool, StoreError> {
        let keys = [NEGATIVE_CACHE_KEY.to_string()];
        let n = with_deadline("delete", self.timeouts.write, self.store.delete_many(&keys)).await?;
        Ok(n > 0)
    }

    fn live_entries(&self, blob: Option<&Blob>, now: DateTime<Utc>) -> Vec<String> {
        let Some(blob) = blob else {
            return Vec::new();
        };
        if now - blob.meta.last_modified >= self.max_age {
            return Vec::new();
        }
        match serde_json::from_slice::<Vec<String>>(&blob.bytes) {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "negative cache is not a list of keys; treating as empty");
                Vec::new()
            }
        }
    }
}
