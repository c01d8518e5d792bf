//! idt-import
//!
//! Row-level orchestration: decide per ticker whether the cached series can
//! be reused, fetch it otherwise, and keep the negative cache and success
//! ledger consistent across many concurrent rows.
//!
//! It does **not** read the portfolio source or render anything; rows come
//! in already validated and results go out as [`idt_schemas::ImportResult`].

pub mod batch;
pub mod cycle;
pub mod error;
pub mod processor;

pub use batch::{import_rows, record_outcome, RowOutcome, DEFAULT_CONCURRENCY};
pub use cycle::{reset_cycle, CycleResetReport, DEFAULT_PURGE_SERIES_OLDER_THAN_HOURS};
pub use error::ImportError;
pub use processor::{RowProcessor, DEFAULT_FETCH_TIMEOUT};
