use std::fmt;

use idt_md::ProviderError;
use idt_store::StoreError;

/// Errors that abort a row instead of producing an [`idt_schemas::ImportResult`].
///
/// Upstream and data-shape problems for a ticker are *not* errors here:
/// they become a `Failure` outcome plus a negative-cache marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportError {
    /// A cache, negative-cache or ledger read/write failed or timed out.
    Store(StoreError),
    /// The provider cannot be used at all (e.g. no API key). Recording
    /// every ticker as failed would poison the cycle, so this is fatal.
    ProviderConfig(String),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::Store(e) => write!(f, "{e}"),
            ImportError::ProviderConfig(msg) => write!(f, "provider misconfigured: {msg}"),
        }
    }
}

impl std::error::Error for ImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ImportError::Store(e) => Some(e),
            ImportError::ProviderConfig(_) => None,
        }
    }
}

impl From<StoreError> for ImportError {
    fn from(e: StoreError) -> Self {
        ImportError::Store(e)
    }
}

impl ImportError {
    /// Returns `Some` only for provider errors that cannot be pinned on a
    /// single ticker.
    pub(crate) fn from_provider(e: &ProviderError) -> Option<Self> {
        match e {
            ProviderError::Config(msg) => Some(ImportError::ProviderConfig(msg.clone())),
            _ => None,
        }
    }
}
