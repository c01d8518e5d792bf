//! Per-row import outcome.
//!
//! The wire form is a flat JSON object keyed by `import_success`, which is
//! what the chart, email and snapshot stages consume:
//!
//! ```text
//! {"import_success":true,"type":"Stocks_single","note":"x","ticker_1":"AAPL",
//!  "file_1":"data-daily-AAPL","api_call_count":1}
//! {"import_success":false,"failed_ticker":"EUR-USD","note":"y","api_call_count":0}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportKind {
    #[serde(rename = "Stocks_single")]
    StocksSingle,
    #[serde(rename = "Stocks_relative_two")]
    StocksRelativeTwo,
    #[serde(rename = "FX")]
    Fx,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::StocksSingle => "Stocks_single",
            ImportKind::StocksRelativeTwo => "Stocks_relative_two",
            ImportKind::Fx => "FX",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireResult", into = "WireResult")]
pub struct ImportSuccess {
    pub kind: ImportKind,
    pub note: String,
    pub ticker_1: String,
    pub ticker_2: Option<String>,
    pub file_1: String,
    /// Only set for relative stock pairs; FX rows store one combined series.
    pub file_2: Option<String>,
    pub api_call_count: u32,
}

impl ImportSuccess {
    /// Ledger uniqueness key: `type + note`, concatenated without separator.
    ///
    /// Two different rows of the same type sharing a note collapse into one
    /// ledger entry. Kept as-is because the snapshot stage keys on it.
    pub fn dedup_key(&self) -> String {
        format!("{}{}", self.kind.as_str(), self.note)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireResult", into = "WireResult")]
pub struct ImportFailure {
    /// Ticker or pair key that could not be imported.
    pub failed_ticker: String,
    pub note: String,
    pub api_call_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WireResult", into = "WireResult")]
pub enum ImportResult {
    Success(ImportSuccess),
    Failure(ImportFailure),
}

impl ImportResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportResult::Success(_))
    }

    pub fn api_call_count(&self) -> u32 {
        match self {
            ImportResult::Success(s) => s.api_call_count,
            ImportResult::Failure(f) => f.api_call_count,
        }
    }

    pub fn note(&self) -> &str {
        match self {
            ImportResult::Success(s) => &s.note,
            ImportResult::Failure(f) => &f.note,
        }
    }

    pub fn as_success(&self) -> Option<&ImportSuccess> {
        match self {
            ImportResult::Success(s) => Some(s),
            ImportResult::Failure(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireResult {
    import_success: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<ImportKind>,
    #[serde(default)]
    note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ticker_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ticker_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file_2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failed_ticker: Option<String>,
    api_call_count: u32,
}

impl From<ImportSuccess> for WireResult {
    fn from(s: ImportSuccess) -> Self {
        WireResult {
            import_success: true,
            kind: Some(s.kind),
            note: s.note,
            ticker_1: Some(s.ticker_1),
            ticker_2: s.ticker_2,
            file_1: Some(s.file_1),
            file_2: s.file_2,
            failed_ticker: None,
            api_call_count: s.api_call_count,
        }
    }
}

impl From<ImportFailure> for WireResult {
    fn from(f: ImportFailure) -> Self {
        WireResult {
            import_success: false,
            kind: None,
            note: f.note,
            ticker_1: None,
            ticker_2: None,
            file_1: None,
            file_2: None,
            failed_ticker: Some(f.failed_ticker),
            api_call_count: f.api_call_count,
        }
    }
}

impl From<ImportResult> for WireResult {
    fn from(r: ImportResult) -> Self {
        match r {
            ImportResult::Success(s) => s.into(),
            ImportResult::Failure(f) => f.into(),
        }
    }
}

impl TryFrom<WireResult> for ImportSuccess {
    type Error = String;

    fn try_from(w: WireResult) -> Result<Self, Self::Error> {
        if !w.import_success {
            return Err("expected import_success=true".to_string());
        }
        let kind = w.kind.ok_or("success result missing 'type'")?;
        let ticker_1 = w.ticker_1.ok_or("success result missing 'ticker_1'")?;
        let file_1 = w.file_1.ok_or("success result missing 'file_1'")?;
        match kind {
            ImportKind::StocksSingle => {}
            ImportKind::StocksRelativeTwo => {
                if w.ticker_2.is_none() || w.file_2.is_none() {
                    return Err("Stocks_relative_two requires 'ticker_2' and 'file_2'".to_string());
                }
            }
            ImportKind::Fx => {
                if w.ticker_2.is_none() {
                    return Err("FX requires 'ticker_2'".to_string());
                }
            }
        }
        Ok(ImportSuccess {
            kind,
            note: w.note,
            ticker_1,
            ticker_2: w.ticker_2,
            file_1,
            file_2: w.file_2,
            api_call_count: w.api_call_count,
        })
    }
}

impl TryFrom<WireResult> for ImportFailure {
    type Error = String;

    fn try_from(w: WireResult) -> Result<Self, Self::Error> {
        if w.import_success {
            return Err("expected import_success=false".to_string());
        }
        let failed_ticker = w
            .failed_ticker
            .ok_or("failure result missing 'failed_ticker'")?;
        Ok(ImportFailure {
            failed_ticker,
            note: w.note,
            api_call_count: w.api_call_count,
        })
    }
}

impl TryFrom<WireResult> for ImportResult {
    type Error = String;

    fn try_from(w: WireResult) -> Result<Self, Self::Error> {
        if w.import_success {
            ImportSuccess::try_from(w).map(ImportResult::Success)
        } else {
            ImportFailure::try_from(w).map(ImportResult::Failure)
        }
    }
}
