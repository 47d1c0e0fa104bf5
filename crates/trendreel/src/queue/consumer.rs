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

//! Queue consumer: the long-running loop behind `trendreel work`.
//!
//! Each iteration leases one message, hands it to a [`Worker`] and settles the
//! lease:
//!
//! | worker result | lease |
//! |---|---|
//! | `Ok(_)` | ack |
//! | payload does not decode | dead-letter |
//! | any other error, attempts left | nack (redelivered) |
//! | any other error, `max_deliveries` reached | dead-letter |
//!
//! The consumer processes one message at a time; run more consumers for more
//! parallelism.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{Delivery, WorkDistributor, WorkQueue};
use crate::error::{QueueError, WorkerError};
use crate::worker::{Worker, WorkerOutcome};

/// Settings for a [`QueueConsumer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfig {
    pub topic: String,
    /// How long a leased message stays hidden from other consumers.
    pub visibility_timeout: Duration,
    /// Deliveries after which a failing message is dead-lettered.
    pub max_deliveries: u32,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topic: "creative-worker-queue-topic".to_string(),
            visibility_timeout: Duration::from_secs(1800),
            max_deliveries: 5,
        }
    }
}

/// How one leased message was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumeOutcome {
    Acked(WorkerOutcome),
    /// Released for redelivery.
    Retried { attempt: u32 },
    DeadLettered { reason: String },
}

/// Drains a topic through a [`Worker`].
pub struct QueueConsumer {
    queue: Arc<dyn WorkQueue>,
    worker: Arc<Worker>,
    distributor: Arc<dyn WorkDistributor>,
    config: ConsumerConfig,
}

impl QueueConsumer {
    pub fn new(
        queue: Arc<dyn WorkQueue>,
        worker: Arc<Worker>,
        distributor: Arc<dyn WorkDistributor>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            worker,
            distributor,
            config,
        }
    }

    /// Leases and settles at most one message. Returns `None` when the topic
    /// has nothing visible.
    pub async fn poll_once(&self) -> Result<Option<ConsumeOutcome>, QueueError> {
        let Some(delivery) = self
            .queue
            .receive(&self.config.topic, self.config.visibility_timeout)
            .await?
        else {
            return Ok(None);
        };

        debug!(
            message_id = %delivery.id,
            attempt = delivery.delivery_attempts,
            "Message leased"
        );

        let result = match delivery.decode() {
            Ok(message) => self.worker.process(&message).await,
            Err(e) => Err(WorkerError::Decode(e)),
        };

        self.settle(&delivery, result).await.map(Some)
    }

    async fn settle(
        &self,
        delivery: &Delivery,
        result: Result<WorkerOutcome, WorkerError>,
    ) -> Result<ConsumeOutcome, QueueError> {
        let error = match result {
            Ok(outcome) => {
                self.queue.ack(delivery.id).await?;
                return Ok(ConsumeOutcome::Acked(outcome));
            }
            Err(e) => e,
        };

        let attempt = delivery.delivery_attempts;
        if error.is_poison() || attempt >= self.config.max_deliveries {
            let reason = error.to_string();
            warn!(
                message_id = %delivery.id,
                attempt,
                reason = %reason,
                "Dead-lettering message"
            );
            self.queue.dead_letter(delivery.id, &reason).await?;
            return Ok(ConsumeOutcome::DeadLettered { reason });
        }

        warn!(
            message_id = %delivery.id,
            attempt,
            max_deliveries = self.config.max_deliveries,
            error = %error,
            "Message failed, releasing for redelivery"
        );
        self.queue.nack(delivery.id).await?;
        Ok(ConsumeOutcome::Retried { attempt })
    }

    /// Consumes until [`QueueConsumer::shutdown`] is called.
    ///
    /// The topic is drained without pausing while messages are available;
    /// the distributor is only consulted once it runs dry or the queue errors.
    pub async fn run(&self) {
        info!(topic = %self.config.topic, "Queue consumer started");
        while !self.distributor.is_shutdown() {
            match self.poll_once().await {
                Ok(Some(outcome)) => debug!(?outcome, "Message settled"),
                Ok(None) => self.distributor.wait_for_work().await,
                Err(e) => {
                    error!(topic = %self.config.topic, error = %e, "Queue operation failed");
                    self.distributor.wait_for_work().await;
                }
            }
        }
        info!(topic = %self.config.topic, "Queue consumer stopped");
    }

    pub fn shutdown(&self) {
        self.distributor.shutdown();
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::error::InvokeError;
    use crate::invoker::{AgentInvoker, AgentRequest, AgentResponse};
    use crate::models::{EntryTimestamp, NewWorkItem, ProcessedStatus, TableRef, WorkMessage};
    use crate::queue::{MemoryQueue, PollingDistributor};
    use crate::store::{MemoryRowStore, RowStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};

    const TOPIC: &str = "creative-worker-queue-topic";

    struct Flaky {
        fail: bool,
    }

    #[async_trait]
    impl AgentInvoker for Flaky {
        async fn invoke(&self, _request: &AgentRequest) -> Result<AgentResponse, InvokeError> {
            if self.fail {
                Err(InvokeError::Remote("resource exhausted".into()))
            } else {
                Ok(AgentResponse::default())
            }
        }
    }

    fn table() -> TableRef {
        TableRef::new("trend_trawler", "target_trends")
    }

    type Fixture = (
        QueueConsumer,
        Arc<MemoryQueue>,
        Arc<MemoryRowStore>,
        EntryTimestamp,
    );

    /// Inserts one row and claims it as `Queued`.
    async fn queued_row(store: &MemoryRowStore) -> EntryTimestamp {
        let ts = EntryTimestamp(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap());
        store
            .insert(
                &table(),
                &[NewWorkItem {
                    entry_timestamp: ts,
                    target_trend: "heatwave".into(),
                    brand: "Acme".into(),
                    target_audience: "commuters".into(),
                    target_product: "fan".into(),
                    key_selling_point: "quiet".into(),
                }],
            )
            .await
            .unwrap();
        store
            .claim(&table(), &[ts], ProcessedStatus::Queued)
            .await
            .unwrap();
        ts
    }

    async fn setup(fail: bool, max_deliveries: u32) -> Fixture {
        let store = Arc::new(MemoryRowStore::new());
        let ts = queued_row(&store).await;

        let queue = Arc::new(MemoryQueue::new());
        let row = store.rows(&table()).remove(0);
        queue
            .publish(TOPIC, &WorkMessage::from_item(&table(), "agent", &row, 0))
            .await
            .unwrap();

        let worker = Worker::new(
            store.clone(),
            Arc::new(Flaky { fail }),
            PipelineConfig::default(),
        );
        let consumer = QueueConsumer::new(
            queue.clone(),
            Arc::new(worker),
            Arc::new(PollingDistributor::with_poll_interval(Duration::from_millis(10))),
            ConsumerConfig {
                max_deliveries,
                ..Default::default()
            },
        );
        (consumer, queue, store, ts)
    }

    #[tokio::test]
    async fn test_success_acks() {
        let (consumer, queue, store, ts) = setup(false, 5).await;

        let outcome = consumer.poll_once().await.unwrap().unwrap();

        assert!(matches!(outcome, ConsumeOutcome::Acked(_)));
        assert!(queue.is_empty());
        assert_eq!(store.status_of(&table(), ts), Some(ProcessedStatus::Processed));
        assert!(consumer.poll_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failure_retries_then_dead_letters() {
        let (consumer, queue, store, ts) = setup(true, 2).await;

        let first = consumer.poll_once().await.unwrap().unwrap();
        assert_eq!(first, ConsumeOutcome::Retried { attempt: 1 });
        assert_eq!(store.status_of(&table(), ts), Some(ProcessedStatus::Failed));

        let second = consumer.poll_once().await.unwrap().unwrap();
        assert!(matches!(second, ConsumeOutcome::DeadLettered { .. }));
        assert_eq!(queue.dead_letters(TOPIC).len(), 1);
        assert!(consumer.poll_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_dead_lettered_immediately() {
        let (consumer, queue, _, _) = setup(false, 5).await;
        // Drain the valid message first.
        consumer.poll_once().await.unwrap();
        queue.publish_raw(TOPIC, "{not json");

        let outcome = consumer.poll_once().await.unwrap().unwrap();

        assert!(matches!(outcome, ConsumeOutcome::DeadLettered { .. }));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (consumer, queue, _, _) = setup(false, 5).await;
        let consumer = Arc::new(consumer);

        let handle = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.run().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        consumer.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_publish_wakes_idle_consumer() {
        let store = Arc::new(MemoryRowStore::new());
        let ts = queued_row(&store).await;
        let distributor = Arc::new(PollingDistributor::with_poll_interval(Duration::from_secs(60)));
        let queue = Arc::new(MemoryQueue::new().with_distributor(distributor.clone()));
        let worker = Worker::new(
            store.clone(),
            Arc::new(Flaky { fail: false }),
            PipelineConfig::default(),
        );
        let consumer = Arc::new(QueueConsumer::new(
            queue.clone(),
            Arc::new(worker),
            distributor,
            ConsumerConfig::default(),
        ));

        let handle = tokio::spawn({
            let consumer = consumer.clone();
            async move { consumer.run().await }
        });
        // Let the consumer find the topic empty and park.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let row = store.rows(&table()).remove(0);
        queue
            .publish(TOPIC, &WorkMessage::from_item(&table(), "agent", &row, 0))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.status_of(&table(), ts) != Some(ProcessedStatus::Processed) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert!(queue.is_empty());

        consumer.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
