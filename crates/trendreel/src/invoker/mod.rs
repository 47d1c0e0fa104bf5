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

//! Agent Invoker: the boundary to the remote generation workflow.
//!
//! The workflow itself (research, copy drafting, visual concepts, rendering)
//! runs inside the agent runtime. From the pipeline's point of view it is a
//! single possibly-slow call that returns final text or fails.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::InvokeError;
use crate::models::CampaignFields;

pub mod agent_engine;
pub mod state;

pub use agent_engine::{AgentEngineClient, AgentEngineConfig};
pub use state::RunState;

/// Input for one agent run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub agent_resource_id: String,
    pub campaign: CampaignFields,
    /// Session owner; distinct per row so concurrent runs never share a session.
    pub caller_id: String,
}

impl AgentRequest {
    pub fn new(agent_resource_id: &str, campaign: CampaignFields, caller_id: String) -> Self {
        Self {
            agent_resource_id: agent_resource_id.to_string(),
            campaign,
            caller_id,
        }
    }
}

/// Result of a successful agent run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    /// The last plain-text part the agent produced.
    pub text: String,
    /// State accumulated from every event's delta.
    pub state: RunState,
    /// Number of events streamed.
    pub events: usize,
}

/// Runs the generation workflow for one row.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, InvokeError>;
}

/// Builds the per-row caller id (`{prefix}_{index}`).
pub fn caller_id(prefix: &str, index: usize) -> String {
    format!("{prefix}_{index}")
}

/// Invokes `invoker`, failing with [`InvokeError::Timeout`] if `timeout` elapses first.
///
/// The duration is recorded under [`crate::metrics::INVOCATION_SECONDS`].
pub async fn invoke_with_timeout(
    invoker: &dyn AgentInvoker,
    request: &AgentRequest,
    timeout: Option<Duration>,
) -> Result<AgentResponse, InvokeError> {
    let started = Instant::now();
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, invoker.invoke(request))
            .await
            .unwrap_or(Err(InvokeError::Timeout(limit))),
        None => invoker.invoke(request).await,
    };
    let outcome = if result.is_ok() { "success" } else { "failure" };
    crate::metrics::record_invocation(outcome, started.elapsed());
    result
}
