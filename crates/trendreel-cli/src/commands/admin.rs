/*
 *  Copyright 2025-2026 Trendreel Developers
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Implementation of the `admin` commands.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;
use trendreel::config::parse_duration;
use trendreel::{AppConfig, EntryTimestamp, Janitor, NewWorkItem, TableRef};

use super::{connect_database, Runtime};

/// Resets claims older than `older_than` (or `[janitor] stale_after`).
pub async fn reset_stale(
    runtime: &Runtime,
    table: &TableRef,
    older_than: Option<&str>,
) -> Result<()> {
    let stale_after = match older_than {
        Some(raw) => parse_duration(raw).with_context(|| format!("Invalid duration: '{}'", raw))?,
        None => runtime
            .config
            .stale_after()
            .context("Invalid [janitor] stale_after")?,
    };

    info!(
        "Resetting claims in {} untouched for longer than {}",
        table, stale_after
    );

    let report = Janitor::new(runtime.store())
        .sweep(table, stale_after)
        .await
        .context("Failed to reset stale rows")?;

    if report.reset.is_empty() {
        info!("No stale claims found (cutoff: {})", report.cutoff);
    } else {
        info!(
            "Reset {} row(s) claimed before {}",
            report.reset.len(),
            report.cutoff
        );
    }
    Ok(())
}

/// Resets one row to unclaimed.
pub async fn reset(runtime: &Runtime, table: &TableRef, entry_timestamp: &str) -> Result<()> {
    let entry_timestamp: EntryTimestamp = entry_timestamp
        .parse()
        .with_context(|| format!("Invalid entry timestamp: '{}'", entry_timestamp))?;

    let found = Janitor::new(runtime.store())
        .reset_row(table, entry_timestamp)
        .await
        .context("Failed to reset row")?;

    if found {
        info!("Row {} in {} is unclaimed again", entry_timestamp, table);
        Ok(())
    } else {
        anyhow::bail!("No row {} in {}", entry_timestamp, table)
    }
}

pub async fn migrate(config: &AppConfig) -> Result<()> {
    let database = connect_database(config).await?;
    database
        .ensure_row_table(&config.default_table())
        .await
        .context("Failed to prepare the default Row Store table")?;
    info!("Migrations complete");
    Ok(())
}

/// Inserts the rows in `file` (a JSON array of [`NewWorkItem`]).
pub async fn seed(runtime: &Runtime, table: &TableRef, file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let items: Vec<NewWorkItem> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of rows", file.display()))?;

    runtime
        .database
        .ensure_row_table(table)
        .await
        .with_context(|| format!("Failed to prepare {}", table))?;
    let inserted = runtime
        .store()
        .insert(table, &items)
        .await
        .context("Failed to insert rows")?;

    info!("Inserted {} unclaimed row(s) into {}", inserted, table);
    Ok(())
}
