//! Success ledger: the deduplicated list of successful imports for the
//! current cycle, stored as a JSON array under [`SUCCESS_LEDGER_KEY`].
//!
//! Uniqueness is on [`ImportSuccess::dedup_key`]; the first entry seen for
//! a key is kept. Unlike the negative cache, losing an append here is not
//! acceptable, so an exhausted CAS budget is a persistence error.

use std::sync::Arc;

use idt_schemas::ImportSuccess;
use tracing::{debug, warn};

use crate::blob::{Blob, BlobStore};
use crate::cas::{self, Mutation};
use crate::error::{with_deadline, StoreError};
use crate::{StoreTimeouts, DEFAULT_CAS_MAX_ATTEMPTS, SUCCESS_LEDGER_KEY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended { len: usize },
    /// An entry with the same dedup key already existed; ledger unchanged.
    Duplicate { len: usize },
}

impl AppendOutcome {
    pub fn len(&self) -> usize {
        match self {
            AppendOutcome::Appended { len } | AppendOutcome::Duplicate { len } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insert `entry` unless its dedup key is already present. Returns whether
/// the list changed.
pub fn dedup_insert(list: &mut Vec<ImportSuccess>, entry: ImportSuccess) -> bool {
    let key = entry.dedup_key();
    if list.iter().any(|e| e.dedup_key() == key) {
        return false;
    }
    list.push(entry);
    true
}

#[derive(Clone)]
pub struct SuccessLedger {
    store: Arc<dyn BlobStore>,
    cas_max_attempts: u32,
    timeouts: StoreTimeouts,
}

impl SuccessLedger {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self {
            store,
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

    /// Entries in insertion order. Absent or corrupt ledgers are empty.
    pub async fn load(&self) -> Result<Vec<ImportSuccess>, StoreError> {
        let blob = with_deadline("get", self.timeouts.read, self.store.get(SUCCESS_LEDGER_KEY)).await?;
        Ok(entries_of(blob.as_ref()))
    }

    pub async fn append_dedup(&self, entry: &ImportSuccess) -> Result<AppendOutcome, StoreError> {
        let res = cas::update(
            self.store.as_ref(),
            SUCCESS_LEDGER_KEY,
            self.cas_max_attempts,
            &self.timeouts,
            |current| {
                let mut list = entries_of(current);
                if !dedup_insert(&mut list, entry.clone()) {
                    return Ok(Mutation::Keep(AppendOutcome::Duplicate { len: list.len() }));
                }
                let bytes = serde_json::to_vec(&list)
                    .map_err(|e| StoreError::Persistence(format!("encode success ledger: {e}")))?;
                Ok(Mutation::Write(bytes, AppendOutcome::Appended { len: list.len() }))
            },
        )
        .await?;

        match res {
            Some(outcome) => {
                debug!(dedup_key = %entry.dedup_key(), ?outcome, "ledger append");
                Ok(outcome)
            }
            None => Err(StoreError::Persistence(format!(
                "success ledger update lost {} consecutive write races",
                self.cas_max_attempts
            ))),
        }
    }

    pub async fn reset(&self) -> Result<bool, StoreError> {
        let keys = [SUCCESS_LEDGER_KEY.to_string()];
        let n = with_deadline("delete", self.timeouts.write, self.store.delete_many(&keys)).await?;
        Ok(n > 0)
    }
}

fn entries_of(blob: Option<&Blob>) -> Vec<ImportSuccess> {
    let Some(blob) = blob else {
        return Vec::new();
    };
    match serde_json::from_slice::<Vec<ImportSuccess>>(&blob.bytes) {
        Ok(list) => list,
        Err(e) => {
            warn!(error = %e, "success ledger is corrupt; treating as empty");
            Vec::new()
        }
    }
}
