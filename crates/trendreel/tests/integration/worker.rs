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

use std::sync::Arc;
use std::time::Duration;

use trendreel::{
    InvokeError, PipelineConfig, ProcessedStatus, RowStore, WorkMessage, Worker, WorkerError,
    WorkerOutcome,
};

use crate::fixtures::{seed, status_of, table, FailingStore, ScriptedInvoker, TestDatabase};

async fn queued_message(store: &dyn RowStore, trend: &str) -> WorkMessage {
    let ts = seed(store, &[trend]).await;
    store
        .claim(&table(), &ts, ProcessedStatus::Queued)
        .await
        .unwrap();
    let row = store.get(&table(), ts[0]).await.unwrap().unwrap();
    WorkMessage::from_item(&table(), "agent-7", &row, 0)
}

#[tokio::test]
async fn test_agent_timeout_marks_row_failed() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let message = queued_message(store.as_ref(), "slow burner").await;
    let config = PipelineConfig::builder()
        .invocation_timeout(Some(Duration::from_millis(50)))
        .build();
    let worker = Worker::new(
        store.clone(),
        ScriptedInvoker::with_delay(Duration::from_secs(5)),
        config,
    );

    let err = worker.process(&message).await.unwrap_err();

    assert!(matches!(
        err.invoke_error(),
        Some(InvokeError::Timeout(d)) if *d == Duration::from_millis(50)
    ));
    assert!(!err.is_poison());
    assert_eq!(
        status_of(store.as_ref(), message.entry_timestamp()).await,
        Some(ProcessedStatus::Failed)
    );
}

#[tokio::test]
async fn test_successful_row_is_processed_once() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let message = queued_message(store.as_ref(), "retro sneakers").await;
    let invoker = ScriptedInvoker::new();
    let worker = Worker::new(store.clone(), invoker.clone(), PipelineConfig::default());

    let first = worker.process(&message).await.unwrap();
    let second = worker.process(&message).await.unwrap();

    assert!(matches!(first, WorkerOutcome::Processed { .. }));
    assert!(matches!(second, WorkerOutcome::AlreadyProcessed { .. }));
    assert_eq!(invoker.calls().len(), 1);
    assert_eq!(
        status_of(store.as_ref(), message.entry_timestamp()).await,
        Some(ProcessedStatus::Processed)
    );
}

#[tokio::test]
async fn test_failed_status_write_leaves_row_queued() {
    let db = TestDatabase::new().await;
    let inner = db.store();
    let message = queued_message(inner.as_ref(), "retro sneakers").await;
    let store = FailingStore::new(inner.clone());
    store.fail_status(ProcessedStatus::Processed);
    let worker = Worker::new(store, ScriptedInvoker::new(), PipelineConfig::default());

    let err = worker.process(&message).await.unwrap_err();

    assert!(matches!(
        err,
        WorkerError::Finalize {
            status: ProcessedStatus::Processed,
            ..
        }
    ));
    assert_eq!(
        status_of(inner.as_ref(), message.entry_timestamp()).await,
        Some(ProcessedStatus::Queued)
    );
}

#[tokio::test]
async fn test_failed_row_is_retried_on_redelivery() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let message = queued_message(store.as_ref(), "fail once").await;
    let invoker = ScriptedInvoker::new();
    let worker = Worker::new(store.clone(), invoker.clone(), PipelineConfig::default());

    assert!(worker.process(&message).await.is_err());
    assert!(worker.process(&message).await.is_err());

    assert_eq!(invoker.calls().len(), 2);
    assert_eq!(
        status_of(store.as_ref(), message.entry_timestamp()).await,
        Some(ProcessedStatus::Failed)
    );
}

#[tokio::test]
async fn test_concurrent_workers_finalize_their_own_rows() {
    let db = TestDatabase::new().await;
    let store: Arc<dyn RowStore> = db.store();
    let a = queued_message(store.as_ref(), "first").await;
    let b = {
        let items = crate::fixtures::new_items(&["x", "second"]);
        store.insert(&table(), &items[1..]).await.unwrap();
        store
            .claim(&table(), &[items[1].entry_timestamp], ProcessedStatus::Queued)
            .await
            .unwrap();
        let row = store
            .get(&table(), items[1].entry_timestamp)
            .await
            .unwrap()
            .unwrap();
        WorkMessage::from_item(&table(), "agent-7", &row, 1)
    };
    let worker = Worker::new(store.clone(), ScriptedInvoker::new(), PipelineConfig::default());
    let other = worker.clone();

    let (ra, rb) = tokio::join!(worker.process(&a), other.process(&b));

    assert!(ra.is_ok());
    assert!(rb.is_ok());
    assert_eq!(
        status_of(store.as_ref(), b.entry_timestamp()).await,
        Some(ProcessedStatus::Processed)
    );
}
