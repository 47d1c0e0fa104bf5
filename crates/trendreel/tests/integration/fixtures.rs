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

//! Shared test fixtures: a migrated SQLite database in a temp directory, a
//! scripted agent invoker and a Row Store wrapper that fails on demand.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;
use trendreel::{
    AgentInvoker, AgentRequest, AgentResponse, Checkpoint, Database, EntryTimestamp, InvokeError,
    NewWorkItem, ProcessedStatus, RowStore, SqlRowStore, StoreError, TableRef, WorkItem,
};

pub const TOPIC: &str = "creative-worker-queue-topic";

/// A migrated SQLite database that lives as long as the fixture.
pub struct TestDatabase {
    _dir: TempDir,
    pub database: Database,
}

impl TestDatabase {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("trendreel.db");
        let database = Database::try_new(&format!("sqlite://{}", path.display()), 1)
            .expect("Failed to open SQLite database");
        database
            .run_migrations()
            .await
            .expect("Failed to run migrations");
        Self {
            _dir: dir,
            database,
        }
    }

    pub fn store(&self) -> Arc<SqlRowStore> {
        Arc::new(SqlRowStore::new(self.database.clone()))
    }
}

/// The table created by the migrations.
pub fn table() -> TableRef {
    TableRef::new("trend_trawler", "target_trends")
}

pub fn timestamp(minute: u32) -> EntryTimestamp {
    EntryTimestamp(Utc.with_ymd_and_hms(2025, 6, 1, 8, minute, 0).unwrap())
}

/// Rows with the given trends, one minute apart.
pub fn new_items(trends: &[&str]) -> Vec<NewWorkItem> {
    trends
        .iter()
        .enumerate()
        .map(|(i, trend)| NewWorkItem {
            entry_timestamp: timestamp(i as u32),
            target_trend: trend.to_string(),
            brand: "Acme".into(),
            target_audience: "urban commuters".into(),
            target_product: "e-bike".into(),
            key_selling_point: "60 mile range".into(),
        })
        .collect()
}

pub async fn seed(store: &dyn RowStore, trends: &[&str]) -> Vec<EntryTimestamp> {
    let items = new_items(trends);
    store.insert(&table(), &items).await.expect("Failed to seed rows");
    items.into_iter().map(|i| i.entry_timestamp).collect()
}

pub async fn status_of(store: &dyn RowStore, ts: EntryTimestamp) -> Option<ProcessedStatus> {
    store
        .get(&table(), ts)
        .await
        .expect("Failed to read row")
        .expect("Row missing")
        .processed_status
}

/// Agent double. Rows whose trend starts with `fail` return an error, rows
/// starting with `slow` sleep for `slow_for` first.
pub struct ScriptedInvoker {
    pub slow_for: Duration,
    calls: Mutex<Vec<AgentRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedInvoker {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::from_millis(0))
    }

    pub fn with_delay(slow_for: Duration) -> Arc<Self> {
        Arc::new(Self {
            slow_for,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> Vec<AgentRequest> {
        self.calls.lock().clone()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, InvokeError> {
        self.calls.lock().push(request.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let trend = request.campaign.target_search_trend.clone();
        if trend.starts_with("slow") {
            tokio::time::sleep(self.slow_for).await;
        } else {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if trend.starts_with("fail") {
            return Err(InvokeError::Remote(format!("agent rejected '{trend}'")));
        }
        Ok(AgentResponse {
            text: format!("Campaign for {trend}"),
            ..Default::default()
        })
    }
}

/// Row Store wrapper whose writes can be made to fail.
pub struct FailingStore {
    inner: Arc<dyn RowStore>,
    fail_claims: Mutex<bool>,
    fail_statuses: Mutex<HashSet<&'static str>>,
}

impl FailingStore {
    pub fn new(inner: Arc<dyn RowStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_claims: Mutex::new(false),
            fail_statuses: Mutex::new(HashSet::new()),
        })
    }

    pub fn fail_claims(&self, fail: bool) {
        *self.fail_claims.lock() = fail;
    }

    /// Makes `bulk_set_status` fail for `status`.
    pub fn fail_status(&self, status: ProcessedStatus) {
        self.fail_statuses.lock().insert(status.as_str());
    }

    fn injected() -> StoreError {
        StoreError::Unavailable("injected failure".into())
    }
}

#[async_trait]
impl RowStore for FailingStore {
    async fn fetch_unclaimed(&self, table: &TableRef) -> Result<Vec<WorkItem>, StoreError> {
        self.inner.fetch_unclaimed(table).await
    }

    async fn bulk_set_status(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<usize, StoreError> {
        if self.fail_statuses.lock().contains(status.as_str()) {
            return Err(Self::injected());
        }
        self.inner.bulk_set_status(table, entry_timestamps, status).await
    }

    async fn claim(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<BTreeSet<EntryTimestamp>, StoreError> {
        if *self.fail_claims.lock() {
            return Err(Self::injected());
        }
        self.inner.claim(table, entry_timestamps, status).await
    }

    async fn release(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        from: ProcessedStatus,
    ) -> Result<usize, StoreError> {
        self.inner.release(table, entry_timestamps, from).await
    }

    async fn get(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<Option<WorkItem>, StoreError> {
        self.inner.get(table, entry_timestamp).await
    }

    async fn reset_stale(
        &self,
        table: &TableRef,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EntryTimestamp>, StoreError> {
        self.inner.reset_stale(table, cutoff).await
    }

    async fn reset(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<bool, StoreError> {
        self.inner.reset(table, entry_timestamp).await
    }

    async fn insert(&self, table: &TableRef, items: &[NewWorkItem]) -> Result<usize, StoreError> {
        self.inner.insert(table, items).await
    }

    async fn record_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        self.inner.record_checkpoint(checkpoint).await
    }
}
