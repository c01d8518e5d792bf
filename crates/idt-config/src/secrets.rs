//! Runtime secret resolution.
//!
//! Config YAML stores only env var NAMES. Callers resolve secrets once at
//! startup via [`resolve_secrets`] and pass the result into constructors.
//! `Debug` output redacts values, and errors name the variable, never its
//! value.

use anyhow::{bail, Result};
use serde_json::Value;

use crate::settings::DEFAULT_ALPHA_VANTAGE_API_KEY_ENV;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// `None` if the named env var was absent or blank.
    pub alpha_vantage_api_key: Option<String>,
    /// Name the key was looked up under.
    pub alpha_vantage_api_key_env: String,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "alpha_vantage_api_key",
                &self.alpha_vantage_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("alpha_vantage_api_key_env", &self.alpha_vantage_api_key_env)
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the provider key from the environment.
///
/// With `require_provider_key`, a missing key fails with `SECRETS_MISSING`.
/// Commands that never reach the provider (ledger, reset) pass `false`.
pub fn resolve_secrets(config_json: &Value, require_provider_key: bool) -> Result<ResolvedSecrets> {
    let var = read_str_at(config_json, "/provider/alpha_vantage/api_key_env")
        .unwrap_or_else(|| DEFAULT_ALPHA_VANTAGE_API_KEY_ENV.to_string());

    let key = resolve_env(&var);
    if require_provider_key && key.is_none() {
        bail!("SECRETS_MISSING: required env var '{var}' (Alpha Vantage api key) is not set or empty");
    }

    Ok(ResolvedSecrets {
        alpha_vantage_api_key: key,
        alpha_vantage_api_key_env: var,
    })
}
