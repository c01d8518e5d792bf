//! Ledger inspection and cycle reset.

use anyhow::Result;
use chrono::Utc;
use idt_import::reset_cycle;

use super::{chrono_duration, Pipeline};

pub async fn print_ledger(config_paths: &[String]) -> Result<()> {
    let pipeline = Pipeline::open(config_paths).await?;
    let entries = pipeline.ledger.load().await?;
    println!("{}", serde_json::to_string(&entries)?);
    Ok(())
}

/// Clear the negative cache and the ledger, then purge old series.
pub async fn reset(config_paths: &[String]) -> Result<()> {
    let pipeline = Pipeline::open(config_paths).await?;
    let older_than = chrono_duration(pipeline.settings.purge_series_older_than, "purge age")?;

    let report = reset_cycle(
        &pipeline.series,
        &pipeline.negative,
        &pipeline.ledger,
        older_than,
        Utc::now(),
    )
    .await?;

    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}
