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

//! Orchestrator scan, claim and dispatch against SQLite.

use std::collections::HashSet;
use std::sync::Arc;

use trendreel::{
    DispatchMode, MemoryQueue, OrchestrationReport, Orchestrator, OrchestratorError, OutboxQueue,
    PipelineConfig, ProcessedStatus, RowStore, TriggerPayload,
};

use crate::fixtures::{seed, status_of, table, FailingStore, ScriptedInvoker, TestDatabase, TOPIC};

fn trigger() -> TriggerPayload {
    TriggerPayload {
        bq_dataset: "trend_trawler".into(),
        bq_table: "target_trends".into(),
        agent_resource_id: "4723941757576806400".into(),
    }
}

fn single_tier() -> PipelineConfig {
    PipelineConfig::builder()
        .mode(DispatchMode::SingleTier)
        .max_concurrent_rows(4)
        .build()
}

#[tokio::test]
async fn test_three_rows_are_queued_and_published() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a", "b", "c"]).await;
    let queue = Arc::new(OutboxQueue::new(db.database.clone()));
    let orchestrator =
        Orchestrator::new(store.clone(), PipelineConfig::default()).with_queue(queue.clone());

    let report = orchestrator.run(&trigger()).await.unwrap();

    let OrchestrationReport::Dispatched(summary) = report else {
        panic!("expected rows to be dispatched, got {report:?}");
    };
    assert_eq!(summary.claimed, ts);
    assert_eq!(summary.published.len(), 3);
    for entry_timestamp in &ts {
        assert_eq!(
            status_of(store.as_ref(), *entry_timestamp).await,
            Some(ProcessedStatus::Queued)
        );
    }
    assert_eq!(queue.depth(TOPIC).await.unwrap(), 3);
}

#[tokio::test]
async fn test_published_messages_match_claimed_rows() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["a", "b", "c"]).await;
    let queue = Arc::new(MemoryQueue::new());
    let orchestrator =
        Orchestrator::new(store.clone(), PipelineConfig::default()).with_queue(queue.clone());

    orchestrator.run(&trigger()).await.unwrap();

    let messages = queue.pending(TOPIC);
    let published: Vec<_> = messages.iter().map(|m| m.entry_timestamp()).collect();
    assert_eq!(published, ts);
    for (index, message) in messages.iter().enumerate() {
        assert_eq!(message.row_data.index, index);
        assert_eq!(message.agent_resource_id, "4723941757576806400");
        assert_eq!(message.table_ref(), table());
    }
}

#[tokio::test]
async fn test_failed_claim_publishes_nothing_and_is_retry_safe() {
    let db = TestDatabase::new().await;
    let inner = db.store();
    let ts = seed(inner.as_ref(), &["a", "b", "c"]).await;
    let store = FailingStore::new(inner.clone());
    store.fail_claims(true);
    let queue = Arc::new(MemoryQueue::new());
    let orchestrator =
        Orchestrator::new(store.clone(), PipelineConfig::default()).with_queue(queue.clone());

    let err = orchestrator.run(&trigger()).await.unwrap_err();

    assert!(matches!(err, OrchestratorError::Claim { count: 3, .. }));
    assert!(queue.is_empty());
    let unclaimed: Vec<_> = inner
        .fetch_unclaimed(&table())
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.entry_timestamp)
        .collect();
    assert_eq!(unclaimed, ts);

    store.fail_claims(false);
    orchestrator.run(&trigger()).await.unwrap();
    assert_eq!(queue.pending(TOPIC).len(), 3);
}

#[tokio::test]
async fn test_concurrent_orchestrators_never_dispatch_a_row_twice() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let trends: Vec<String> = (0..12).map(|i| format!("trend {i}")).collect();
    let trends: Vec<&str> = trends.iter().map(String::as_str).collect();
    seed(store.as_ref(), &trends).await;
    let queue = Arc::new(MemoryQueue::new());

    let mut handles = Vec::new();
    for _ in 0..3 {
        let orchestrator = Orchestrator::new(store.clone(), PipelineConfig::default())
            .with_queue(queue.clone());
        handles.push(tokio::spawn(async move {
            orchestrator.run(&trigger()).await.unwrap()
        }));
    }
    let mut claimed = 0;
    for handle in handles {
        if let OrchestrationReport::Dispatched(summary) = handle.await.unwrap() {
            claimed += summary.claimed.len();
        }
    }

    let published: Vec<_> = queue
        .pending(TOPIC)
        .into_iter()
        .map(|m| m.entry_timestamp())
        .collect();
    let unique: HashSet<_> = published.iter().copied().collect();
    assert_eq!(claimed, 12);
    assert_eq!(published.len(), 12);
    assert_eq!(unique.len(), 12);
}

#[tokio::test]
async fn test_single_tier_records_terminal_statuses() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["ok", "fail-quota", "ok-again"]).await;
    let invoker = ScriptedInvoker::new();
    let orchestrator = Orchestrator::new(store.clone(), single_tier()).with_invoker(invoker.clone());

    let report = orchestrator.run(&trigger()).await.unwrap();

    let OrchestrationReport::Dispatched(summary) = report else {
        panic!("expected rows to be dispatched, got {report:?}");
    };
    let batch = summary.batch.expect("single-tier runs report a batch");
    assert_eq!(batch.failed_vec(), vec![ts[1]]);
    assert_eq!(
        status_of(store.as_ref(), ts[0]).await,
        Some(ProcessedStatus::Processed)
    );
    assert_eq!(
        status_of(store.as_ref(), ts[1]).await,
        Some(ProcessedStatus::Failed)
    );
    assert_eq!(
        status_of(store.as_ref(), ts[2]).await,
        Some(ProcessedStatus::Processed)
    );

    let mut caller_ids: Vec<_> = invoker.calls().into_iter().map(|r| r.caller_id).collect();
    caller_ids.sort();
    assert_eq!(
        caller_ids,
        vec!["Ima_CloudRun_jr_0", "Ima_CloudRun_jr_1", "Ima_CloudRun_jr_2"]
    );
}

#[tokio::test]
async fn test_single_tier_finalize_failure_still_attempts_both_updates() {
    let db = TestDatabase::new().await;
    let inner = db.store();
    let ts = seed(inner.as_ref(), &["ok", "fail"]).await;
    let store = FailingStore::new(inner.clone());
    store.fail_status(ProcessedStatus::Processed);
    let orchestrator =
        Orchestrator::new(store.clone(), single_tier()).with_invoker(ScriptedInvoker::new());

    let err = orchestrator.run(&trigger()).await.unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Finalize {
            status: ProcessedStatus::Processed,
            count: 1,
            ..
        }
    ));
    assert_eq!(
        status_of(inner.as_ref(), ts[0]).await,
        Some(ProcessedStatus::Processing)
    );
    assert_eq!(
        status_of(inner.as_ref(), ts[1]).await,
        Some(ProcessedStatus::Failed)
    );
}

#[tokio::test]
async fn test_empty_table_is_a_no_op() {
    let db = TestDatabase::new().await;
    let queue = Arc::new(MemoryQueue::new());
    let orchestrator =
        Orchestrator::new(db.store(), PipelineConfig::default()).with_queue(queue.clone());

    let report = orchestrator.run(&trigger()).await.unwrap();

    assert_eq!(report, OrchestrationReport::NoWork { table: table() });
    assert!(queue.is_empty());
}
