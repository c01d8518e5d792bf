//! Typed view of the pipeline config.
//!
//! Every pointer read here must also appear in [`crate::CONSUMED_POINTERS`].
//! Missing optional keys fall back to the defaults below; present keys with
//! the wrong type or a zero value are errors (`CONFIG_INVALID`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::Value;

pub const DEFAULT_ALPHA_VANTAGE_BASE_URL: &str = "https://www.alphavantage.co";
pub const DEFAULT_ALPHA_VANTAGE_API_KEY_ENV: &str = "ALPHA_VANTAGE_API_KEY";

const DEFAULT_SERIES_MAX_AGE_SECS: u64 = 600;
const DEFAULT_NEGATIVE_CACHE_MAX_AGE_SECS: u64 = 600;
const DEFAULT_HISTORY_WINDOW_HOURS: u64 = 13_140;
const DEFAULT_CACHE_PROBE_MS: u64 = 2_000;
const DEFAULT_CACHE_READ_MS: u64 = 10_000;
const DEFAULT_FETCH_MS: u64 = 60_000;
const DEFAULT_STORE_WRITE_MS: u64 = 10_000;
const DEFAULT_PURGE_SERIES_OLDER_THAN_HOURS: u64 = 12;
const DEFAULT_CAS_MAX_ATTEMPTS: u64 = 8;
const DEFAULT_BATCH_CONCURRENCY: u64 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTimeouts {
    pub cache_probe: Duration,
    pub cache_read: Duration,
    pub fetch: Duration,
    pub store_write: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub store_root: PathBuf,
    pub series_max_age: Duration,
    pub negative_cache_max_age: Duration,
    pub alpha_vantage_base_url: String,
    /// Env var NAME holding the API key; see [`crate::resolve_secrets`].
    pub alpha_vantage_api_key_env: String,
    pub history_window: Duration,
    pub timeouts: PipelineTimeouts,
    pub purge_series_older_than: Duration,
    pub cas_max_attempts: u32,
    pub batch_concurrency: usize,
}

impl PipelineSettings {
    pub fn from_config_json(config: &Value) -> Result<Self> {
        let Some(store_root) = read_str(config, "/store/root")? else {
            bail!("CONFIG_MISSING pointer=/store/root: blob store directory is required");
        };

        let secs = |ptr: &str, default: u64| read_positive(config, ptr, default).map(Duration::from_secs);
        let millis = |ptr: &str, default: u64| read_positive(config, ptr, default).map(Duration::from_millis);
        let hours = |ptr: &str, default: u64| {
            read_positive(config, ptr, default).map(|h| Duration::from_secs(h.saturating_mul(3_600)))
        };

        let cas_max_attempts = read_positive(config, "/store/cas_max_attempts", DEFAULT_CAS_MAX_ATTEMPTS)?;
        let batch_concurrency = read_positive(config, "/batch/concurrency", DEFAULT_BATCH_CONCURRENCY)?;

        Ok(Self {
            store_root: PathBuf::from(store_root),
            series_max_age: secs("/freshness/series_max_age_secs", DEFAULT_SERIES_MAX_AGE_SECS)?,
            negative_cache_max_age: secs("/negative_cache/max_age_secs", DEFAULT_NEGATIVE_CACHE_MAX_AGE_SECS)?,
            alpha_vantage_base_url: read_str(config, "/provider/alpha_vantage/base_url")?
                .unwrap_or_else(|| DEFAULT_ALPHA_VANTAGE_BASE_URL.to_string()),
            alpha_vantage_api_key_env: read_str(config, "/provider/alpha_vantage/api_key_env")?
                .unwrap_or_else(|| DEFAULT_ALPHA_VANTAGE_API_KEY_ENV.to_string()),
            history_window: hours("/provider/history_window_hours", DEFAULT_HISTORY_WINDOW_HOURS)?,
            timeouts: PipelineTimeouts {
                cache_probe: millis("/timeouts/cache_probe_ms", DEFAULT_CACHE_PROBE_MS)?,
                cache_read: millis("/timeouts/cache_read_ms", DEFAULT_CACHE_READ_MS)?,
                fetch: millis("/timeouts/fetch_ms", DEFAULT_FETCH_MS)?,
                store_write: millis("/timeouts/store_write_ms", DEFAULT_STORE_WRITE_MS)?,
            },
            purge_series_older_than: hours(
                "/cycle/purge_series_older_than_hours",
                DEFAULT_PURGE_SERIES_OLDER_THAN_HOURS,
            )?,
            cas_max_attempts: u32::try_from(cas_max_attempts).unwrap_or(u32::MAX),
            batch_concurrency: usize::try_from(batch_concurrency).unwrap_or(usize::MAX),
        })
    }
}

/// Non-blank string at `pointer`, trimmed. Absent or null is `None`.
fn read_str(config: &Value, pointer: &str) -> Result<Option<String>> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(Some(s.trim().to_string())),
        Some(_) => bail!("CONFIG_INVALID pointer={pointer}: expected a non-empty string"),
    }
}

fn read_positive(config: &Value, pointer: &str, default: u64) -> Result<u64> {
    match config.pointer(pointer) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => Ok(n),
            _ => bail!("CONFIG_INVALID pointer={pointer}: expected a positive integer, got {v}"),
        },
    }
}
