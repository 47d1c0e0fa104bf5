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

//! Row Store status protocol against SQLite.

use chrono::Duration;
use trendreel::{
    EntryTimestamp, MemoryRowStore, NewWorkItem, ProcessedStatus, RowStore, StoreError, TableRef,
};

use crate::fixtures::{new_items, seed, status_of, table, timestamp, TestDatabase};

#[tokio::test]
async fn test_fetch_unclaimed_is_stable_and_ordered() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let mut items = new_items(&["a", "b", "c"]);
    items.reverse();
    store.insert(&table(), &items).await.unwrap();

    let first = store.fetch_unclaimed(&table()).await.unwrap();
    let second = store.fetch_unclaimed(&table()).await.unwrap();

    assert_eq!(first, second);
    let order: Vec<_> = first.iter().map(|r| r.entry_timestamp).collect();
    assert_eq!(order, vec![timestamp(0), timestamp(1), timestamp(2)]);
    assert_eq!(first[0].target_trend, "a");
    assert_eq!(first[0].brand, "Acme");
}

#[tokio::test]
async fn test_claimed_rows_are_no_longer_fetched() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a", "b", "c"]).await;

    let updated = store
        .bulk_set_status(&table(), &ts[..2], ProcessedStatus::Queued)
        .await
        .unwrap();

    assert_eq!(updated, 2);
    let remaining: Vec<_> = store
        .fetch_unclaimed(&table())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.entry_timestamp)
        .collect();
    assert_eq!(remaining, vec![ts[2]]);
    let row = store.get(&table(), ts[0]).await.unwrap().unwrap();
    assert_eq!(row.processed_status, Some(ProcessedStatus::Queued));
    assert!(row.status_updated_at.is_some());
}

#[tokio::test]
async fn test_empty_status_update_never_reaches_the_store() {
    let memory = MemoryRowStore::new();
    seed(&memory, &["a"]).await;
    let writes = memory.write_count();

    let updated = memory
        .bulk_set_status(&table(), &[], ProcessedStatus::Processed)
        .await
        .unwrap();

    assert_eq!(updated, 0);
    assert_eq!(memory.write_count(), writes);

    // The SQL store returns before touching the table, so even a table that
    // does not exist is fine.
    let db = TestDatabase::new().await;
    let missing = TableRef::new("trend_trawler", "no_such_table");
    let updated = db
        .store()
        .bulk_set_status(&missing, &[], ProcessedStatus::Failed)
        .await
        .unwrap();
    assert_eq!(updated, 0);
}

#[tokio::test]
async fn test_claim_skips_rows_already_claimed() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a", "b", "c"]).await;

    let first = store
        .claim(&table(), &ts[..2], ProcessedStatus::Queued)
        .await
        .unwrap();
    let second = store
        .claim(&table(), &ts, ProcessedStatus::Processing)
        .await
        .unwrap();

    assert_eq!(first.into_iter().collect::<Vec<_>>(), ts[..2].to_vec());
    assert_eq!(second.into_iter().collect::<Vec<_>>(), vec![ts[2]]);
    assert_eq!(status_of(store.as_ref(), ts[0]).await, Some(ProcessedStatus::Queued));
    assert_eq!(
        status_of(store.as_ref(), ts[2]).await,
        Some(ProcessedStatus::Processing)
    );
}

#[tokio::test]
async fn test_last_terminal_status_wins() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a"]).await;

    store
        .bulk_set_status(&table(), &ts, ProcessedStatus::Failed)
        .await
        .unwrap();
    store
        .bulk_set_status(&table(), &ts, ProcessedStatus::Processed)
        .await
        .unwrap();

    assert_eq!(
        status_of(store.as_ref(), ts[0]).await,
        Some(ProcessedStatus::Processed)
    );
}

#[tokio::test]
async fn test_release_only_touches_rows_in_the_given_status() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a", "b"]).await;
    store
        .claim(&table(), &ts, ProcessedStatus::Queued)
        .await
        .unwrap();
    store
        .bulk_set_status(&table(), &ts[1..], ProcessedStatus::Processed)
        .await
        .unwrap();

    let released = store
        .release(&table(), &ts, ProcessedStatus::Queued)
        .await
        .unwrap();

    assert_eq!(released, 1);
    assert_eq!(status_of(store.as_ref(), ts[0]).await, None);
    assert_eq!(
        status_of(store.as_ref(), ts[1]).await,
        Some(ProcessedStatus::Processed)
    );
}

#[tokio::test]
async fn test_get_missing_row() {
    let db = TestDatabase::new().await;
    let store = db.store();
    seed(store.as_ref(), &["a"]).await;

    assert!(store.get(&table(), timestamp(59)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_duplicate_insert_is_rejected() {
    let db = TestDatabase::new().await;
    let store = db.store();
    seed(store.as_ref(), &["a"]).await;

    let err = store
        .insert(&table(), &new_items(&["again"]))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Database(_)));
    let rows = store.fetch_unclaimed(&table()).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].target_trend, "a");
}

#[tokio::test]
async fn test_unsafe_table_names_are_rejected() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let hostile = TableRef::new("trend_trawler", "target_trends; DROP TABLE work_queue");

    let err = store.fetch_unclaimed(&hostile).await.unwrap_err();

    assert!(matches!(err, StoreError::InvalidTable(_)));
}

#[tokio::test]
async fn test_checkpoint_is_recorded() {
    let db = TestDatabase::new().await;
    let store = db.store();

    store
        .record_checkpoint(&trendreel::Checkpoint::new(table(), 3, 2))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_key_lists_beyond_the_parameter_limit() {
    // Larger than both SQLite's and PostgreSQL's per-statement parameter caps.
    const ROWS: usize = 33_000;

    let db = TestDatabase::new().await;
    let store = db.store();
    let base = timestamp(0).0;
    let items: Vec<NewWorkItem> = (0..ROWS)
        .map(|i| NewWorkItem {
            entry_timestamp: EntryTimestamp(base + Duration::seconds(i as i64)),
            target_trend: format!("trend {i}"),
            brand: "Acme".into(),
            target_audience: "urban commuters".into(),
            target_product: "e-bike".into(),
            key_selling_point: "60 mile range".into(),
        })
        .collect();
    let keys: Vec<EntryTimestamp> = items.iter().map(|i| i.entry_timestamp).collect();

    assert_eq!(store.insert(&table(), &items).await.unwrap(), ROWS);

    let claimed = store
        .claim(&table(), &keys, ProcessedStatus::Queued)
        .await
        .unwrap();
    assert_eq!(claimed.len(), ROWS);
    assert!(store.fetch_unclaimed(&table()).await.unwrap().is_empty());

    let updated = store
        .bulk_set_status(&table(), &keys, ProcessedStatus::Processed)
        .await
        .unwrap();
    assert_eq!(updated, ROWS);
    assert_eq!(
        status_of(store.as_ref(), keys[ROWS - 1]).await,
        Some(ProcessedStatus::Processed)
    );

    let released = store
        .release(&table(), &keys, ProcessedStatus::Processed)
        .await
        .unwrap();
    assert_eq!(released, ROWS);
    assert_eq!(store.fetch_unclaimed(&table()).await.unwrap().len(), ROWS);
}
