//! Command handler modules for the `idt` binary.
//!
//! Shared wiring (config -> settings -> stores -> provider) lives here.
//! Command-specific logic lives in the submodules.

pub mod cycle;
pub mod import;

use std::fs;
use std::sync::Arc;

use anyhow::{Context, Result};
use idt_config::{report_unused_keys, resolve_secrets, LoadedConfig, PipelineSettings, UnusedKeyPolicy};
use idt_import::RowProcessor;
use idt_md::AlphaVantageClient;
use idt_store::{BlobStore, FsBlobStore, NegativeCache, StoreTimeouts, SuccessLedger, TimeSeriesStore};
use tracing::debug;

// ---------------------------------------------------------------------------
// Pipeline wiring
// ---------------------------------------------------------------------------

/// Everything one invocation needs, built from layered config.
pub struct Pipeline {
    pub loaded: LoadedConfig,
    pub settings: PipelineSettings,
    pub series: TimeSeriesStore,
    pub negative: NegativeCache,
    pub ledger: SuccessLedger,
}

impl Pipeline {
    pub async fn open(config_paths: &[String]) -> Result<Self> {
        let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
        let loaded = idt_config::load_layered_yaml(&path_refs)?;

        // Logs a warning per unused leaf set; never fails under Warn.
        report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;

        let settings = PipelineSettings::from_config_json(&loaded.config_json)?;

        let blobs: Arc<dyn BlobStore> = Arc::new(
            FsBlobStore::open(&settings.store_root)
                .await
                .with_context(|| format!("open blob store at {}", settings.store_root.display()))?
                .with_lock_stale_after(settings.timeouts.store_write),
        );
        let timeouts = StoreTimeouts {
            probe: settings.timeouts.cache_probe,
            read: settings.timeouts.cache_read,
            write: settings.timeouts.store_write,
        };

        let series = TimeSeriesStore::new(blobs.clone(), chrono_duration(settings.series_max_age, "series max age")?)
            .with_timeouts(timeouts);
        let negative = NegativeCache::new(
            blobs.clone(),
            chrono_duration(settings.negative_cache_max_age, "negative cache max age")?,
        )
        .with_cas_max_attempts(settings.cas_max_attempts)
        .with_timeouts(timeouts);
        let ledger = SuccessLedger::new(blobs)
            .with_cas_max_attempts(settings.cas_max_attempts)
            .with_timeouts(timeouts);

        debug!(
            config_hash = %loaded.config_hash,
            store_root = %settings.store_root.display(),
            "pipeline ready"
        );
        Ok(Self {
            loaded,
            settings,
            series,
            negative,
            ledger,
        })
    }

    /// Row processor backed by Alpha Vantage. Fails with `SECRETS_MISSING`
    /// when the key env var is not set.
    pub fn processor(&self) -> Result<RowProcessor> {
        let secrets = resolve_secrets(&self.loaded.config_json, true)?;
        let api_key = secrets
            .alpha_vantage_api_key
            .context("SECRETS_MISSING: alpha vantage api key not resolved")?;

        let client = AlphaVantageClient::new_with_base_url(api_key, self.settings.alpha_vantage_base_url.clone())
            .with_history_window(chrono_duration(self.settings.history_window, "history window")?)
            .with_request_timeout(self.settings.timeouts.fetch);

        Ok(RowProcessor::new(self.series.clone(), self.negative.clone(), Arc::new(client))
            .with_fetch_timeout(self.settings.timeouts.fetch))
    }
}

pub fn chrono_duration(d: std::time::Duration, what: &str) -> Result<chrono::Duration> {
    chrono::Duration::from_std(d).with_context(|| format!("{what} out of range"))
}

// ---------------------------------------------------------------------------
// Input helpers
// ---------------------------------------------------------------------------

/// Load JSON from either an inline string or a file path. A UTF-8 BOM is
/// stripped (spreadsheet exports carry one).
pub fn load_json_arg(inline: Option<String>, file: Option<String>, flag: &str) -> Result<String> {
    if let Some(p) = file {
        let bytes = fs::read(&p).with_context(|| format!("read {flag}-file failed: {}", p))?;
        let bytes = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(&bytes);
        let raw = String::from_utf8(bytes.to_vec()).with_context(|| format!("{flag}-file must be UTF-8 text"))?;
        return Ok(raw.trim().to_string());
    }

    let raw = inline.with_context(|| format!("must provide --{flag} or --{flag}-file"))?;
    Ok(raw.trim().trim_start_matches('\u{feff}').to_string())
}
