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

//! Concurrency fan-out for single-tier dispatch.
//!
//! Every claimed row becomes its own tokio task. Tasks are bounded by a
//! semaphore but otherwise independent: one row's failure, timeout or panic
//! never cancels its siblings, and the batch only resolves after every task
//! has finished.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::invoker::{caller_id, invoke_with_timeout, AgentInvoker, AgentRequest};
use crate::models::{BatchResult, WorkItem};

/// Runs agent invocations for a batch of rows and partitions the outcomes.
#[derive(Clone)]
pub struct FanOut {
    invoker: Arc<dyn AgentInvoker>,
    config: PipelineConfig,
}

impl FanOut {
    pub fn new(invoker: Arc<dyn AgentInvoker>, config: PipelineConfig) -> Self {
        Self { invoker, config }
    }

    /// Invokes the agent once per item and waits for all of them.
    ///
    /// The caller id of each run is derived from the item's position in
    /// `items`. Status updates are left to the caller.
    pub async fn run(&self, items: &[WorkItem], agent_resource_id: &str) -> BatchResult {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_rows()));
        let timeout = self.config.invocation_timeout();
        let mut handles = Vec::with_capacity(items.len());

        info!(
            rows = items.len(),
            max_concurrent = self.config.max_concurrent_rows(),
            "Starting fan-out batch"
        );

        for (index, item) in items.iter().enumerate() {
            let request = AgentRequest::new(
                agent_resource_id,
                item.campaign(),
                caller_id(self.config.caller_id_prefix(), index),
            );
            let invoker = Arc::clone(&self.invoker);
            let permits = Arc::clone(&permits);
            let entry_timestamp = item.entry_timestamp;

            let handle = tokio::spawn(async move {
                // The semaphore is never closed while tasks hold a clone.
                let _permit = permits.acquire_owned().await.ok();
                debug!(%entry_timestamp, caller_id = %request.caller_id, "Invoking agent");
                invoke_with_timeout(invoker.as_ref(), &request, timeout).await
            });
            handles.push((entry_timestamp, handle));
        }

        let mut batch = BatchResult::default();
        for (entry_timestamp, handle) in handles {
            match handle.await {
                Ok(Ok(response)) => {
                    debug!(%entry_timestamp, events = response.events, "Row succeeded");
                    batch.record_success(entry_timestamp);
                }
                Ok(Err(e)) => {
                    warn!(%entry_timestamp, error = %e, "Row failed");
                    batch.record_failure(entry_timestamp);
                }
                Err(e) => {
                    error!(%entry_timestamp, error = %e, "Row task aborted");
                    batch.record_failure(entry_timestamp);
                }
            }
        }

        info!(
            succeeded = batch.succeeded.len(),
            failed = batch.failed.len(),
            "Fan-out batch complete"
        );
        batch
    }
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
