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

use std::time::Duration;

use trendreel::{Janitor, ProcessedStatus, RowStore};

use crate::fixtures::{seed, status_of, table, TestDatabase};

#[tokio::test]
async fn test_sweep_resets_only_stale_claims() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["queued", "processing", "done", "fresh"]).await;
    store
        .claim(&table(), &ts[..1], ProcessedStatus::Queued)
        .await
        .unwrap();
    store
        .claim(&table(), &ts[1..3], ProcessedStatus::Processing)
        .await
        .unwrap();
    store
        .bulk_set_status(&table(), &ts[2..3], ProcessedStatus::Processed)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let janitor = Janitor::new(store.clone());

    let report = janitor
        .sweep(&table(), chrono::Duration::milliseconds(10))
        .await
        .unwrap();

    assert_eq!(report.reset, ts[..2].to_vec());
    assert_eq!(status_of(store.as_ref(), ts[0]).await, None);
    assert_eq!(status_of(store.as_ref(), ts[1]).await, None);
    assert_eq!(
        status_of(store.as_ref(), ts[2]).await,
        Some(ProcessedStatus::Processed)
    );
    assert_eq!(status_of(store.as_ref(), ts[3]).await, None);
}

#[tokio::test]
async fn test_sweep_keeps_recent_claims() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a"]).await;
    store
        .claim(&table(), &ts, ProcessedStatus::Queued)
        .await
        .unwrap();

    let report = Janitor::new(store.clone())
        .sweep(&table(), chrono::Duration::hours(1))
        .await
        .unwrap();

    assert!(report.reset.is_empty());
    assert_eq!(
        status_of(store.as_ref(), ts[0]).await,
        Some(ProcessedStatus::Queued)
    );
}

#[tokio::test]
async fn test_reset_row_makes_it_eligible_again() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a", "b"]).await;
    store
        .claim(&table(), &ts, ProcessedStatus::Processing)
        .await
        .unwrap();
    store
        .bulk_set_status(&table(), &ts[..1], ProcessedStatus::Failed)
        .await
        .unwrap();
    let janitor = Janitor::new(store.clone());

    assert!(janitor.reset_row(&table(), ts[0]).await.unwrap());
    assert!(!janitor
        .reset_row(&table(), crate::fixtures::timestamp(59))
        .await
        .unwrap());

    let unclaimed: Vec<_> = store
        .fetch_unclaimed(&table())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.entry_timestamp)
        .collect();
    assert_eq!(unclaimed, vec![ts[0]]);
}
