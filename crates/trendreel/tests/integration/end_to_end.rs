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

//! Two-tier flow: orchestrate into the outbox, then drain it with a consumer.

use std::sync::Arc;
use std::time::Duration;

use trendreel::{
    ConsumeOutcome, ConsumerConfig, OrchestrationReport, Orchestrator, OutboxQueue,
    PipelineConfig, PollingDistributor, ProcessedStatus, QueueConsumer, RowStore, TriggerPayload,
    Worker,
};

use crate::fixtures::{seed, status_of, ScriptedInvoker, TestDatabase, TOPIC};

#[tokio::test]
async fn test_two_tier_pipeline_drains_to_terminal_states() {
    let db = TestDatabase::new().await;
    let store = db.store();
    let ts = seed(store.as_ref(), &["retro sneakers", "fail-quota", "cold brew"]).await;
    let queue = Arc::new(OutboxQueue::new(db.database.clone()));
    let invoker = ScriptedInvoker::new();

    let orchestrator =
        Orchestrator::new(store.clone(), PipelineConfig::default()).with_queue(queue.clone());
    let trigger = TriggerPayload {
        bq_dataset: "trend_trawler".into(),
        bq_table: "target_trends".into(),
        agent_resource_id: "4723941757576806400".into(),
    };
    let report = orchestrator.run(&trigger).await.unwrap();
    assert!(matches!(report, OrchestrationReport::Dispatched(_)));

    let worker = Arc::new(Worker::new(
        store.clone(),
        invoker.clone(),
        PipelineConfig::default(),
    ));
    let consumer = QueueConsumer::new(
        queue.clone(),
        worker,
        Arc::new(PollingDistributor::with_poll_interval(Duration::from_millis(10))),
        ConsumerConfig {
            topic: TOPIC.into(),
            visibility_timeout: Duration::from_secs(60),
            max_deliveries: 3,
        },
    );

    let mut outcomes = Vec::new();
    while let Some(outcome) = consumer.poll_once().await.unwrap() {
        outcomes.push(outcome);
    }

    let acked = outcomes
        .iter()
        .filter(|o| matches!(o, ConsumeOutcome::Acked(_)))
        .count();
    let retried = outcomes
        .iter()
        .filter(|o| matches!(o, ConsumeOutcome::Retried { .. }))
        .count();
    let dead = outcomes
        .iter()
        .filter(|o| matches!(o, ConsumeOutcome::DeadLettered { .. }))
        .count();
    assert_eq!(acked, 2);
    assert_eq!(retried, 2);
    assert_eq!(dead, 1);
    assert_eq!(queue.depth(TOPIC).await.unwrap(), 0);

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
    assert!(store
        .fetch_unclaimed(&crate::fixtures::table())
        .await
        .unwrap()
        .is_empty());

    let again = orchestrator.run(&trigger).await.unwrap();
    assert!(matches!(again, OrchestrationReport::NoWork { .. }));
}
