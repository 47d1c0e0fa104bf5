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

//! Orchestrator: turns unclaimed rows into dispatched work.
//!
//! One invocation, triggered by a push notification naming a table:
//!
//! 1. Scan the table for rows whose `processed_status` is `NULL`.
//! 2. Claim them with a conditional update (`QUEUED` for two-tier,
//!    `PROCESSING` for single-tier). Rows a concurrent orchestrator won are
//!    skipped. The claim completes before any row's work starts.
//! 3. Two-tier: publish one [`WorkMessage`] per claimed row and wait for every
//!    publish to be confirmed. Rows whose message was not accepted are handed
//!    back to `NULL` and the invocation fails so the trigger is redelivered.
//! 4. Single-tier: run every claimed row through the [`FanOut`] layer, then
//!    mark the succeeded rows `PROCESSED` and the failed rows `FAILED`.
//!
//! Any error before or during the claim fails the whole invocation. Since the
//! claim is a single statement, a redelivered trigger sees exactly the rows
//! that are still unclaimed.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::config::{DispatchMode, PipelineConfig};
use crate::error::{OrchestratorError, QueueError, StoreError};
use crate::fanout::FanOut;
use crate::invoker::AgentInvoker;
use crate::metrics;
use crate::models::{
    BatchResult, Checkpoint, EntryTimestamp, ProcessedStatus, TableRef, WorkItem, WorkMessage,
};
use crate::queue::{MessageId, WorkQueue};
use crate::store::RowStore;
use crate::trigger::{decode_trigger, Trigger, TriggerPayload};

/// What one orchestrator invocation did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationReport {
    /// The trigger lacked routing keys; nothing was read.
    Ignored { missing: Vec<&'static str> },
    /// The table had no unclaimed rows.
    NoWork { table: TableRef },
    Dispatched(DispatchSummary),
}

/// Counts for an invocation that found work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub table: TableRef,
    pub mode: DispatchMode,
    pub rows_seen: usize,
    /// Rows this invocation claimed, oldest first.
    pub claimed: Vec<EntryTimestamp>,
    /// Rows seen as unclaimed but claimed by someone else first.
    pub lost_races: usize,
    /// Messages accepted by the queue (two-tier).
    pub published: Vec<MessageId>,
    /// Outcome of the in-process batch (single-tier).
    pub batch: Option<BatchResult>,
}

/// Scans, claims and dispatches rows.
pub struct Orchestrator {
    store: Arc<dyn RowStore>,
    queue: Option<Arc<dyn WorkQueue>>,
    invoker: Option<Arc<dyn AgentInvoker>>,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RowStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            queue: None,
            invoker: None,
            config,
        }
    }

    /// Queue used for two-tier dispatch.
    pub fn with_queue(mut self, queue: Arc<dyn WorkQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Invoker used for single-tier dispatch.
    pub fn with_invoker(mut self, invoker: Arc<dyn AgentInvoker>) -> Self {
        self.invoker = Some(invoker);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Handles a push notification body.
    ///
    /// Undecodable bodies are errors. Bodies without all routing keys are
    /// logged and ignored.
    pub async fn handle_push(&self, body: &[u8]) -> Result<OrchestrationReport, OrchestratorError> {
        match decode_trigger(body)? {
            Trigger::Ready(payload) => self.run(&payload).await,
            Trigger::Incomplete { missing } => {
                info!(?missing, "Trigger is missing routing keys, nothing to do");
                Ok(OrchestrationReport::Ignored { missing })
            }
        }
    }

    /// Runs one scan-claim-dispatch pass for the table the trigger names.
    pub async fn run(&self, trigger: &TriggerPayload) -> Result<OrchestrationReport, OrchestratorError> {
        let mode = self.config.mode();
        match mode {
            DispatchMode::TwoTier if self.queue.is_none() => {
                return Err(OrchestratorError::MissingQueue)
            }
            DispatchMode::SingleTier if self.invoker.is_none() => {
                return Err(OrchestratorError::MissingInvoker)
            }
            _ => {}
        }

        let table = trigger.table_ref();
        let rows = self
            .store
            .fetch_unclaimed(&table)
            .await
            .map_err(OrchestratorError::Fetch)?;

        if rows.is_empty() {
            info!(table = %table, "No unclaimed rows");
            return Ok(OrchestrationReport::NoWork { table });
        }

        let rows_seen = rows.len();
        let (claimed_rows, lost_races) = self.claim(&table, rows, mode).await?;
        self.record_checkpoint(&table, rows_seen, claimed_rows.len()).await;

        let mut summary = DispatchSummary {
            table: table.clone(),
            mode,
            rows_seen,
            claimed: claimed_rows.iter().map(|r| r.entry_timestamp).collect(),
            lost_races,
            published: Vec::new(),
            batch: None,
        };

        if claimed_rows.is_empty() {
            return Ok(OrchestrationReport::Dispatched(summary));
        }

        match mode {
            DispatchMode::TwoTier => {
                summary.published = self
                    .publish(&table, &trigger.agent_resource_id, &claimed_rows)
                    .await?;
            }
            DispatchMode::SingleTier => {
                summary.batch = Some(
                    self.run_in_process(&table, &trigger.agent_resource_id, &claimed_rows)
                        .await?,
                );
            }
        }

        Ok(OrchestrationReport::Dispatched(summary))
    }

    /// Claims `rows` and returns the ones this invocation won plus the number lost.
    async fn claim(
        &self,
        table: &TableRef,
        rows: Vec<WorkItem>,
        mode: DispatchMode,
    ) -> Result<(Vec<WorkItem>, usize), OrchestratorError> {
        let entry_timestamps: Vec<EntryTimestamp> = rows.iter().map(|r| r.entry_timestamp).collect();
        let status = mode.claim_status();

        let won = self
            .store
            .claim(table, &entry_timestamps, status)
            .await
            .map_err(|source| OrchestratorError::Claim {
                count: entry_timestamps.len(),
                source,
            })?;

        let lost = rows.len() - won.len();
        let claimed: Vec<WorkItem> = rows
            .into_iter()
            .filter(|r| won.contains(&r.entry_timestamp))
            .collect();

        info!(table = %table, %status, claimed = claimed.len(), "Rows claimed");
        metrics::record_claimed(&table.to_string(), claimed.len());
        if lost > 0 {
            warn!(table = %table, lost, "Rows were claimed by a concurrent orchestrator");
            metrics::record_claim_race(&table.to_string(), lost);
        }
        Ok((claimed, lost))
    }

    async fn record_checkpoint(&self, table: &TableRef, rows_seen: usize, rows_claimed: usize) {
        if !self.config.record_checkpoints() {
            return;
        }
        let checkpoint = Checkpoint::new(table.clone(), rows_seen, rows_claimed);
        if let Err(e) = self.store.record_checkpoint(&checkpoint).await {
            warn!(table = %table, error = %e, "Failed to record orchestrator checkpoint");
        }
    }

    /// Publishes one message per row and confirms every publish.
    async fn publish(
        &self,
        table: &TableRef,
        agent_resource_id: &str,
        rows: &[WorkItem],
    ) -> Result<Vec<MessageId>, OrchestratorError> {
        let queue = self.queue.as_ref().ok_or(OrchestratorError::MissingQueue)?;
        let topic = self.config.worker_topic();

        let messages: Vec<WorkMessage> = rows
            .iter()
            .enumerate()
            .map(|(index, row)| WorkMessage::from_item(table, agent_resource_id, row, index))
            .collect();
        let results = join_all(messages.iter().map(|m| queue.publish(topic, m))).await;

        let mut published = Vec::with_capacity(results.len());
        let mut failed: Vec<(EntryTimestamp, QueueError)> = Vec::new();
        for (message, result) in messages.iter().zip(results) {
            match result {
                Ok(id) => {
                    debug!(entry_timestamp = %message.entry_timestamp(), message_id = %id, "Work message published");
                    published.push(id);
                }
                Err(e) => {
                    error!(entry_timestamp = %message.entry_timestamp(), error = %e, "Failed to publish work message");
                    failed.push((message.entry_timestamp(), e));
                }
            }
        }

        metrics::record_published(topic, published.len());
        info!(table = %table, topic, published = published.len(), failed = failed.len(), "Dispatch complete");

        if failed.is_empty() {
            return Ok(published);
        }

        let unpublished: Vec<EntryTimestamp> = failed.iter().map(|(ts, _)| *ts).collect();
        match self
            .store
            .release(table, &unpublished, ProcessedStatus::Queued)
            .await
        {
            Ok(released) => {
                info!(table = %table, released, "Released rows whose messages were not published")
            }
            Err(e) => error!(
                table = %table,
                rows = unpublished.len(),
                error = %e,
                "Failed to release unpublished rows; they stay QUEUED until reset"
            ),
        }

        let failed_count = failed.len();
        let first = failed
            .into_iter()
            .map(|(_, e)| e)
            .next()
            .unwrap_or(QueueError::Closed);
        Err(OrchestratorError::Publish {
            attempted: messages.len(),
            failed: failed_count,
            first,
        })
    }

    /// Runs the claimed rows in this process and records their terminal status.
    async fn run_in_process(
        &self,
        table: &TableRef,
        agent_resource_id: &str,
        rows: &[WorkItem],
    ) -> Result<BatchResult, OrchestratorError> {
        let invoker = self
            .invoker
            .as_ref()
            .ok_or(OrchestratorError::MissingInvoker)?;
        let batch = FanOut::new(Arc::clone(invoker), self.config.clone())
            .run(rows, agent_resource_id)
            .await;

        let processed = self
            .finalize(table, &batch.succeeded_vec(), ProcessedStatus::Processed)
            .await;
        let failed = self
            .finalize(table, &batch.failed_vec(), ProcessedStatus::Failed)
            .await;
        metrics::record_finalized(&table.to_string(), batch.succeeded.len(), batch.failed.len());

        processed?;
        failed?;
        Ok(batch)
    }

    async fn finalize(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<(), OrchestratorError> {
        self.store
            .bulk_set_status(table, entry_timestamps, status)
            .await
            .map(|_| ())
            .map_err(|source: StoreError| {
                error!(table = %table, %status, rows = entry_timestamps.len(), error = %source, "Failed to record terminal status");
                OrchestratorError::Finalize {
                    status,
                    count: entry_timestamps.len(),
                    source,
                }
            })
    }
}
