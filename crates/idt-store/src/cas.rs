//! Compare-and-swap update loop shared by the negative cache and the ledger.

use tracing::debug;

use crate::blob::{Blob, BlobStore, PutCondition};
use crate::error::{with_deadline, StoreError};
use crate::StoreTimeouts;

/// What the mutation closure wants done with the object it was shown.
pub(crate) enum Mutation<T> {
    /// Replace the object with these bytes, then report `T`.
    Write(Vec<u8>, T),
    /// Leave the object as it is and report `T`.
    Keep(T),
}

/// Read `key`, let `mutate` decide, write back conditioned on what was read.
///
/// Retries from a fresh read whenever another writer got in between.
/// Returns `Ok(None)` once `max_attempts` writes have lost the race.
pub(crate) async fn update<T, F>(
    store: &dyn BlobStore,
    key: &str,
    max_attempts: u32,
    timeouts: &StoreTimeouts,
    mut mutate: F,
) -> Result<Option<T>, StoreError>
where
    F: FnMut(Option<&Blob>) -> Result<Mutation<T>, StoreError>,
{
    for attempt in 1..=max_attempts.max(1) {
        let current = with_deadline("get", timeouts.read, store.get(key)).await?;

        let cond = match &current {
            Some(b) => PutCondition::Matches(b.etag.clone()),
            None => PutCondition::Absent,
        };

        let (bytes, out) = match mutate(current.as_ref())? {
            Mutation::Keep(out) => return Ok(Some(out)),
            Mutation::Write(bytes, out) => (bytes, out),
        };

        let written = with_deadline("put", timeouts.write, store.put_if(key, bytes, cond)).await?;
        if written.is_some() {
            return Ok(Some(out));
        }
        debug!(key, attempt, "conditional write lost the race; retrying");
    }
    Ok(None)
}
