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

//! In-process Row Store.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::debug;

use super::RowStore;
use crate::error::StoreError;
use crate::models::{Checkpoint, EntryTimestamp, NewWorkItem, ProcessedStatus, TableRef, WorkItem};

type Table = BTreeMap<EntryTimestamp, WorkItem>;

/// A [`RowStore`] kept entirely in memory.
///
/// Each call takes the store lock once, so every write is atomic with respect
/// to other callers. The number of write statements issued is tracked so tests
/// can assert that no-op calls never reach the store.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: Mutex<HashMap<TableRef, Table>>,
    checkpoints: Mutex<Vec<Checkpoint>>,
    writes: AtomicUsize,
}

impl MemoryRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of write statements (status updates, inserts) executed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every row in `table`, oldest first.
    pub fn rows(&self, table: &TableRef) -> Vec<WorkItem> {
        self.tables
            .lock()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Status of one row, `None` when the row is unclaimed or absent.
    pub fn status_of(&self, table: &TableRef, ts: EntryTimestamp) -> Option<ProcessedStatus> {
        self.tables
            .lock()
            .get(table)
            .and_then(|rows| rows.get(&ts))
            .and_then(|row| row.processed_status)
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoints.lock().clone()
    }

    fn count_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    /// Applies `update` to every listed row that passes `filter`, under one lock.
    fn update_where<F>(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: Option<ProcessedStatus>,
        filter: F,
    ) -> Result<BTreeSet<EntryTimestamp>, StoreError>
    where
        F: Fn(&WorkItem) -> bool,
    {
        table.validate()?;
        self.count_write();

        let now = Utc::now();
        let mut tables = self.tables.lock();
        let mut changed = BTreeSet::new();
        if let Some(rows) = tables.get_mut(table) {
            for ts in entry_timestamps {
                if let Some(row) = rows.get_mut(ts) {
                    if filter(row) {
                        row.processed_status = status;
                        row.status_updated_at = Some(now);
                        changed.insert(*ts);
                    }
                }
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn fetch_unclaimed(&self, table: &TableRef) -> Result<Vec<WorkItem>, StoreError> {
        table.validate()?;
        let tables = self.tables.lock();
        Ok(tables
            .get(table)
            .map(|rows| rows.values().filter(|r| r.is_unclaimed()).cloned().collect())
            .unwrap_or_default())
    }

    async fn bulk_set_status(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<usize, StoreError> {
        if entry_timestamps.is_empty() {
            debug!(table = %table, %status, "Skipping status update for empty batch");
            return Ok(0);
        }
        let changed = self.update_where(table, entry_timestamps, Some(status), |_| true)?;
        Ok(changed.len())
    }

    async fn claim(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<BTreeSet<EntryTimestamp>, StoreError> {
        if entry_timestamps.is_empty() {
            return Ok(BTreeSet::new());
        }
        self.update_where(table, entry_timestamps, Some(status), |row| {
            row.is_unclaimed()
        })
    }

    async fn release(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        from: ProcessedStatus,
    ) -> Result<usize, StoreError> {
        if entry_timestamps.is_empty() {
            return Ok(0);
        }
        let changed = self.update_where(table, entry_timestamps, None, |row| {
            row.processed_status == Some(from)
        })?;
        Ok(changed.len())
    }

    async fn get(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<Option<WorkItem>, StoreError> {
        table.validate()?;
        Ok(self
            .tables
            .lock()
            .get(table)
            .and_then(|rows| rows.get(&entry_timestamp))
            .cloned())
    }

    async fn reset_stale(
        &self,
        table: &TableRef,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EntryTimestamp>, StoreError> {
        table.validate()?;
        self.count_write();

        let now = Utc::now();
        let mut tables = self.tables.lock();
        let mut reset = Vec::new();
        if let Some(rows) = tables.get_mut(table) {
            for row in rows.values_mut() {
                let claimed = row.processed_status.is_some_and(|s| s.is_claimed());
                let stale = row.status_updated_at.map_or(true, |at| at < cutoff);
                if claimed && stale {
                    row.processed_status = None;
                    row.status_updated_at = Some(now);
                    reset.push(row.entry_timestamp);
                }
            }
        }
        Ok(reset)
    }

    async fn reset(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<bool, StoreError> {
        let changed = self.update_where(table, &[entry_timestamp], None, |_| true)?;
        Ok(!changed.is_empty())
    }

    async fn insert(&self, table: &TableRef, items: &[NewWorkItem]) -> Result<usize, StoreError> {
        table.validate()?;
        if items.is_empty() {
            return Ok(0);
        }
        self.count_write();

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.clone()).or_default();
        if let Some(dup) = items.iter().find(|i| rows.contains_key(&i.entry_timestamp)) {
            return Err(StoreError::Unavailable(format!(
                "duplicate entry_timestamp {}",
                dup.entry_timestamp
            )));
        }
        for item in items {
            rows.insert(item.entry_timestamp, WorkItem::from(item.clone()));
        }
        Ok(items.len())
    }

    async fn record_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        checkpoint.table.validate()?;
        self.checkpoints.lock().push(checkpoint.clone());
        Ok(())
    }
}
