//! Import command handlers: `import-row`, `import-all`, `record-success`.
//!
//! Results go to stdout as JSON; everything else is logged to stderr.

use anyhow::{bail, Context, Result};
use idt_import::import_rows;
use idt_schemas::{ImportResult, PortfolioRow};
use idt_store::AppendOutcome;
use serde::Serialize;
use serde_json::Value;

use super::{load_json_arg, Pipeline};

// ---------------------------------------------------------------------------
// import-row
// ---------------------------------------------------------------------------

pub async fn import_row(config_paths: &[String], row: Option<String>, row_file: Option<String>) -> Result<()> {
    let raw = load_json_arg(row, row_file, "row")?;
    let row: PortfolioRow = serde_json::from_str(&raw).context("ROW_INVALID: --row must be a portfolio row object")?;

    let pipeline = Pipeline::open(config_paths).await?;
    let processor = pipeline.processor()?;

    let result = processor.process(&row).await?;
    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// import-all
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct BatchLine {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    row: Option<PortfolioRow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ImportResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recorded: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn recorded_label(outcome: AppendOutcome) -> &'static str {
    match outcome {
        AppendOutcome::Appended { .. } => "appended",
        AppendOutcome::Duplicate { .. } => "duplicate",
    }
}

/// Import every row in the file (an array, or a single row object). Invalid rows and aborted rows are reported
/// in place and make the command exit non-zero once all rows have run.
pub async fn import_all(config_paths: &[String], rows: String, concurrency: Option<usize>) -> Result<()> {
    let raw = load_json_arg(None, Some(rows), "rows")?;
    let values = match serde_json::from_str::<Value>(&raw).context("ROW_INVALID: rows file must hold JSON")? {
        Value::Array(items) => items,
        single => vec![single],
    };

    let pipeline = Pipeline::open(config_paths).await?;
    let processor = pipeline.processor()?;
    let concurrency = concurrency.unwrap_or(pipeline.settings.batch_concurrency);

    let mut lines: Vec<BatchLine> = Vec::with_capacity(values.len());
    let mut valid: Vec<(usize, PortfolioRow)> = Vec::new();
    for (index, v) in values.into_iter().enumerate() {
        match serde_json::from_value::<PortfolioRow>(v) {
            Ok(row) => valid.push((index, row)),
            Err(e) => lines.push(BatchLine {
                index,
                row: None,
                result: None,
                recorded: None,
                error: Some(format!("ROW_INVALID: {e}")),
            }),
        }
    }

    let (indices, rows): (Vec<usize>, Vec<PortfolioRow>) = valid.into_iter().unzip();
    let outcomes = import_rows(&processor, &pipeline.ledger, rows, concurrency).await;

    for (index, o) in indices.into_iter().zip(outcomes) {
        let (result, error) = match o.result {
            Ok(r) => (Some(r), None),
            Err(e) => (None, Some(e.to_string())),
        };
        lines.push(BatchLine {
            index,
            row: Some(o.row),
            result,
            recorded: o.recorded.map(recorded_label),
            error,
        });
    }
    lines.sort_by_key(|l| l.index);

    println!("{}", serde_json::to_string(&lines)?);

    let errors = lines.iter().filter(|l| l.error.is_some()).count();
    if errors > 0 {
        bail!("{errors} of {} rows did not complete", lines.len());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// record-success
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RecordLine {
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ledger_len: Option<usize>,
}

pub async fn record_success(config_paths: &[String], result: &str) -> Result<()> {
    let result: ImportResult =
        serde_json::from_str(result.trim()).context("--result must be an ImportResult JSON object")?;

    let pipeline = Pipeline::open(config_paths).await?;

    let line = match result.as_success() {
        Some(s) => {
            let outcome = pipeline.ledger.append_dedup(s).await?;
            RecordLine {
                outcome: recorded_label(outcome),
                ledger_len: Some(outcome.len()),
            }
        }
        None => RecordLine {
            outcome: "skipped",
            ledger_len: None,
        },
    };

    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
