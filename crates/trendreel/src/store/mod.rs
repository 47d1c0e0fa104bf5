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

//! Row Store: the shared table of work items and its status protocol.
//!
//! The store is the only shared mutable resource in the pipeline. It is never
//! locked pessimistically; instead rows move through
//! `NULL -> QUEUED|PROCESSING -> PROCESSED|FAILED` and the claim step is a
//! conditional update that only touches rows still `NULL`.
//!
//! Two implementations are provided:
//!
//! - [`SqlRowStore`] over SQLite or PostgreSQL (diesel + deadpool-diesel)
//! - [`MemoryRowStore`] for single-process runs and tests
//!
//! Every status write stamps `status_updated_at`, which the
//! [`crate::janitor::Janitor`] compares against its staleness threshold.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::models::{Checkpoint, EntryTimestamp, NewWorkItem, ProcessedStatus, TableRef, WorkItem};

pub mod memory;
pub mod sql;

pub use memory::MemoryRowStore;
pub use sql::SqlRowStore;

/// Access to one or more Row Store tables.
///
/// Implementations must make every write all-or-nothing: when a call returns
/// an error, no row named in that call has changed.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Returns every row whose `processed_status` is `NULL`, oldest
    /// `entry_timestamp` first. No limit is applied.
    async fn fetch_unclaimed(&self, table: &TableRef) -> Result<Vec<WorkItem>, StoreError>;

    /// Sets `status` on every listed row in one statement and returns the
    /// number of rows updated.
    ///
    /// An empty `entry_timestamps` slice is a no-op that never touches the
    /// backend.
    async fn bulk_set_status(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<usize, StoreError>;

    /// Conditionally moves rows from `NULL` to `status` and returns the rows
    /// this call actually changed.
    ///
    /// Rows already claimed by someone else are left alone and are absent from
    /// the result, so a caller can tell a lost race from a won one.
    async fn claim(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<BTreeSet<EntryTimestamp>, StoreError>;

    /// Conditionally moves rows that are still in `from` back to `NULL`.
    ///
    /// Used to hand back rows whose work message never reached the queue.
    async fn release(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        from: ProcessedStatus,
    ) -> Result<usize, StoreError>;

    /// Looks up one row.
    async fn get(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<Option<WorkItem>, StoreError>;

    /// Resets rows stuck in `QUEUED` or `PROCESSING` since before `cutoff`
    /// back to `NULL`, returning the rows that were reset.
    async fn reset_stale(
        &self,
        table: &TableRef,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EntryTimestamp>, StoreError>;

    /// Unconditionally resets one row to `NULL`. Returns whether the row exists.
    async fn reset(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<bool, StoreError>;

    /// Inserts new unclaimed rows.
    async fn insert(&self, table: &TableRef, items: &[NewWorkItem]) -> Result<usize, StoreError>;

    /// Appends an orchestrator checkpoint to the audit trail.
    async fn record_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;
}
