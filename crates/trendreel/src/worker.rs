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

//! Worker: finalizes exactly one claimed row.
//!
//! A worker receives one [`WorkMessage`], runs the agent for that row and
//! records the outcome:
//!
//! - success ⇒ the row becomes `PROCESSED`
//! - failure ⇒ the row becomes `FAILED` and the agent error is returned so the
//!   message is redelivered by the queue
//!
//! If the terminal status write itself fails, the row is left in its claimed
//! state and the write error is returned. The worker never retries the agent
//! call on its own.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::WorkerError;
use crate::invoker::{caller_id, invoke_with_timeout, AgentInvoker, AgentRequest};
use crate::metrics;
use crate::models::{EntryTimestamp, ProcessedStatus, TableRef, WorkMessage};
use crate::store::RowStore;
use crate::trigger::decode_push_data;

/// How a work message was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The agent ran and the row is now `PROCESSED`.
    Processed { entry_timestamp: EntryTimestamp },
    /// A redelivered message for a row that was already finalized.
    AlreadyProcessed { entry_timestamp: EntryTimestamp },
}

impl WorkerOutcome {
    pub fn entry_timestamp(&self) -> EntryTimestamp {
        match self {
            WorkerOutcome::Processed { entry_timestamp }
            | WorkerOutcome::AlreadyProcessed { entry_timestamp } => *entry_timestamp,
        }
    }
}

/// Consumes work messages one at a time.
#[derive(Clone)]
pub struct Worker {
    store: Arc<dyn RowStore>,
    invoker: Arc<dyn AgentInvoker>,
    config: PipelineConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn RowStore>,
        invoker: Arc<dyn AgentInvoker>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            invoker,
            config,
        }
    }

    /// Decodes a push envelope carrying a work message and processes it.
    pub async fn handle_push(&self, body: &[u8]) -> Result<WorkerOutcome, WorkerError> {
        let data = decode_push_data(body)?;
        let message = WorkMessage::from_json(&data).map_err(WorkerError::Decode)?;
        self.process(&message).await
    }

    /// Runs the agent for the message's row and records the terminal status.
    pub async fn process(&self, message: &WorkMessage) -> Result<WorkerOutcome, WorkerError> {
        let table = message.table_ref();
        let entry_timestamp = message.entry_timestamp();

        let existing = self
            .store
            .get(&table, entry_timestamp)
            .await
            .map_err(|source| WorkerError::Lookup {
                entry_timestamp,
                source,
            })?;
        match existing {
            Some(row) if row.processed_status == Some(ProcessedStatus::Processed) => {
                info!(table = %table, %entry_timestamp, "Row already processed, skipping redelivery");
                return Ok(WorkerOutcome::AlreadyProcessed { entry_timestamp });
            }
            Some(row) if row.processed_status.is_none() => {
                warn!(table = %table, %entry_timestamp, "Row was reset after dispatch, processing anyway");
            }
            Some(_) => {}
            None => {
                warn!(table = %table, %entry_timestamp, "Row not found in store, processing message as-is");
            }
        }

        let request = AgentRequest::new(
            &message.agent_resource_id,
            message.campaign(),
            caller_id(self.config.caller_id_prefix(), message.row_data.index),
        );
        debug!(%entry_timestamp, caller_id = %request.caller_id, "Invoking agent");

        match invoke_with_timeout(
            self.invoker.as_ref(),
            &request,
            self.config.invocation_timeout(),
        )
        .await
        {
            Ok(response) => {
                self.finalize(&table, entry_timestamp, ProcessedStatus::Processed)
                    .await?;
                info!(
                    table = %table,
                    %entry_timestamp,
                    events = response.events,
                    "Row processed"
                );
                Ok(WorkerOutcome::Processed { entry_timestamp })
            }
            Err(source) => {
                error!(table = %table, %entry_timestamp, error = %source, "Agent invocation failed");
                self.finalize(&table, entry_timestamp, ProcessedStatus::Failed)
                    .await?;
                Err(WorkerError::Invocation {
                    entry_timestamp,
                    source,
                })
            }
        }
    }

    async fn finalize(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
        status: ProcessedStatus,
    ) -> Result<(), WorkerError> {
        self.store
            .bulk_set_status(table, &[entry_timestamp], status)
            .await
            .map_err(|source| {
                error!(table = %table, %entry_timestamp, %status, error = %source, "Failed to record terminal status; row stays claimed");
                WorkerError::Finalize {
                    entry_timestamp,
                    status,
                    source,
                }
            })?;

        let (processed, failed) = match status {
            ProcessedStatus::Processed => (1, 0),
            _ => (0, 1),
        };
        metrics::record_finalized(&table.to_string(), processed, failed);
        Ok(())
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
