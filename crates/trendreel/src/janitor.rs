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

//! Recovery for rows stuck in a claimed state.
//!
//! A row stays `QUEUED` or `PROCESSING` forever when its worker died, its
//! terminal status write failed, or its message exhausted redelivery. The
//! janitor hands such rows back to `NULL` so the next orchestrator run picks
//! them up again. It never runs on its own; operators call it through
//! `trendreel admin reset-stale`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::error::StoreError;
use crate::models::{EntryTimestamp, TableRef};
use crate::store::RowStore;

/// Rows reset by one [`Janitor::sweep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub table: TableRef,
    /// Claims last written before this instant were considered stale.
    pub cutoff: DateTime<Utc>,
    pub reset: Vec<EntryTimestamp>,
}

pub struct Janitor {
    store: Arc<dyn RowStore>,
}

impl Janitor {
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        Self { store }
    }

    /// Resets rows whose claim is older than `stale_after`.
    pub async fn sweep(
        &self,
        table: &TableRef,
        stale_after: Duration,
    ) -> Result<SweepReport, StoreError> {
        let cutoff = Utc::now() - stale_after;
        let reset = self.store.reset_stale(table, cutoff).await?;

        if reset.is_empty() {
            info!(table = %table, %cutoff, "No stale rows");
        } else {
            for entry_timestamp in &reset {
                warn!(table = %table, %entry_timestamp, "Reset stale claim");
            }
            info!(table = %table, %cutoff, rows = reset.len(), "Stale rows reset");
        }

        Ok(SweepReport {
            table: table.clone(),
            cutoff,
            reset,
        })
    }

    /// Resets one row to `NULL` regardless of its status.
    pub async fn reset_row(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<bool, StoreError> {
        let found = self.store.reset(table, entry_timestamp).await?;
        if found {
            info!(table = %table, %entry_timestamp, "Row reset");
        } else {
            warn!(table = %table, %entry_timestamp, "Row not found");
        }
        Ok(found)
    }
}
