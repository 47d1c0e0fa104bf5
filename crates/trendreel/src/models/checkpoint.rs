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

//! Orchestrator checkpoint model: one audit record per invocation that found work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::table::TableRef;

/// What one orchestrator pass saw and claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub table: TableRef,
    /// Unclaimed rows returned by the scan.
    pub rows_seen: u64,
    /// Rows this invocation actually won; lower than `rows_seen` after a lost race.
    pub rows_claimed: u64,
    pub checked_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(table: TableRef, rows_seen: usize, rows_claimed: usize) -> Self {
        Self {
            table,
            rows_seen: rows_seen as u64,
            rows_claimed: rows_claimed as u64,
            checked_at: Utc::now(),
        }
    }

    pub fn lost_rows(&self) -> u64 {
        self.rows_seen.saturating_sub(self.rows_claimed)
    }
}
