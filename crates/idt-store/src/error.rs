use std::fmt;

/// Errors surfaced by the blob store and the caches built on it.
///
/// `Corruption` is mostly handled inside this crate (a corrupt blob reads as
/// absent); everything else means the store could not be trusted and is
/// fatal for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Read, write, rename or delete failed.
    Persistence(String),
    /// Stored bytes do not decode to the expected shape.
    Corruption { key: String, reason: String },
    /// A store operation exceeded its deadline.
    Timeout { op: &'static str, after_ms: u64 },
    /// Key is empty, hidden, or contains a path separator.
    InvalidKey(String),
}

impl StoreError {
    pub fn persistence(context: &str, e: impl fmt::Display) -> Self {
        StoreError::Persistence(format!("{context}: {e}"))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Persistence(msg) => write!(f, "store persistence error: {msg}"),
            StoreError::Corruption { key, reason } => {
                write!(f, "stored blob '{key}' is corrupt: {reason}")
            }
            StoreError::Timeout { op, after_ms } => {
                write!(f, "store {op} timed out after {after_ms}ms")
            }
            StoreError::InvalidKey(key) => write!(f, "invalid blob key: '{key}'"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Run `fut` under a deadline, mapping expiry to [`StoreError::Timeout`].
pub async fn with_deadline<T, F>(
    op: &'static str,
    budget: std::time::Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: std::future::Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(budget, fut).await {
        Ok(res) => res,
        Err(_) => Err(StoreError::Timeout {
            op,
            after_ms: budget.as_millis() as u64,
        }),
    }
}
