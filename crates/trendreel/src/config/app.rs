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

//! Deployment configuration file (`trendreel.toml`).
//!
//! Every section and key is optional; omitted values take the defaults of the
//! hosted Cloud Run deployment.
//!
//! ```toml
//! [gcp]
//! project = "hybrid-vertex"
//! location = "us-central1"
//! project_number = "934903580331"
//! access_token = "${GCP_ACCESS_TOKEN:-}"
//!
//! [database]
//! url = "${TRENDREEL_DATABASE_URL:-sqlite://trendreel.db}"
//!
//! [execution]
//! mode = "single_tier"
//! max_concurrent_rows = 8
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use super::{parse_duration, DispatchMode, PipelineConfig, ValidationError};
use crate::database::BackendType;
use crate::invoker::AgentEngineConfig;
use crate::models::TableRef;
use crate::queue::ConsumerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gcp: GcpSection,
    pub database: DatabaseSection,
    pub queue: QueueSection,
    pub execution: ExecutionSection,
    pub server: ServerSection,
    pub janitor: JanitorSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpSection {
    pub project: String,
    pub location: String,
    pub project_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Default for GcpSection {
    fn default() -> Self {
        Self {
            project: "hybrid-vertex".to_string(),
            location: "us-central1".to_string(),
            project_number: "934903580331".to_string(),
            api_endpoint: None,
            access_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
    pub pool_size: u32,
    /// Row Store table used when a command is not given one explicitly.
    pub dataset: String,
    pub table: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite://trendreel.db".to_string(),
            pool_size: 10,
            dataset: "trend_trawler".to_string(),
            table: "target_trends".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub topic: String,
    pub visibility_timeout_secs: u64,
    pub max_deliveries: u32,
    pub poll_interval_ms: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            topic: "creative-worker-queue-topic".to_string(),
            visibility_timeout_secs: 1800,
            max_deliveries: 5,
            poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub mode: DispatchMode,
    pub max_concurrent_rows: usize,
    /// Zero disables the per-invocation timeout.
    pub invocation_timeout_secs: u64,
    pub caller_id_prefix: String,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            mode: DispatchMode::TwoTier,
            max_concurrent_rows: 10,
            invocation_timeout_secs: 0,
            caller_id_prefix: "Ima_CloudRun_jr".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorSection {
    /// Claimed rows untouched for longer than this are considered stuck.
    pub stale_after: String,
}

impl Default for JanitorSection {
    fn default() -> Self {
        Self {
            stale_after: "2h".to_string(),
        }
    }
}

impl AppConfig {
    /// Checks every section and reports all problems together.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        if BackendType::from_url(&self.database.url).is_err() {
            errors.push(ValidationError::InvalidDatabaseUrl {
                url: self.database.url.clone(),
            });
        }
        if self.database.pool_size == 0 || self.database.pool_size > 100 {
            errors.push(ValidationError::InvalidPoolSize {
                size: self.database.pool_size,
            });
        }
        if let Err(e) = self.default_table().validate() {
            errors.push(ValidationError::InvalidIdentifier {
                field: "database.dataset/table",
                reason: e.to_string(),
            });
        }
        if self.gcp.project_number.trim().is_empty() {
            errors.push(ValidationError::Missing {
                field: "gcp.project_number",
            });
        }
        if self.gcp.location.trim().is_empty() {
            errors.push(ValidationError::Missing {
                field: "gcp.location",
            });
        }
        if let Some(endpoint) = &self.gcp.api_endpoint {
            match Url::parse(endpoint) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => {}
                Ok(url) => errors.push(ValidationError::InvalidApiEndpoint {
                    endpoint: endpoint.clone(),
                    reason: format!("unsupported scheme '{}'", url.scheme()),
                }),
                Err(e) => errors.push(ValidationError::InvalidApiEndpoint {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                }),
            }
        }
        if self.queue.topic.trim().is_empty() {
            errors.push(ValidationError::Missing { field: "queue.topic" });
        }
        if self.queue.visibility_timeout_secs == 0 {
            errors.push(ValidationError::NotPositive {
                field: "queue.visibility_timeout_secs",
                value: 0,
            });
        }
        if self.queue.max_deliveries == 0 {
            errors.push(ValidationError::NotPositive {
                field: "queue.max_deliveries",
                value: 0,
            });
        }
        if self.execution.max_concurrent_rows == 0 {
            errors.push(ValidationError::NotPositive {
                field: "execution.max_concurrent_rows",
                value: 0,
            });
        }
        if self.server.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidBindAddress {
                address: self.server.bind_address.clone(),
            });
        }
        if let Err(e) = parse_duration(&self.janitor.stale_after) {
            errors.push(e);
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ValidationError::Multiple { errors }),
        }
    }

    pub fn default_table(&self) -> TableRef {
        TableRef::new(&self.database.dataset, &self.database.table)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let timeout = match self.execution.invocation_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        PipelineConfig::builder()
            .mode(self.execution.mode)
            .max_concurrent_rows(self.execution.max_concurrent_rows)
            .invocation_timeout(timeout)
            .caller_id_prefix(&self.execution.caller_id_prefix)
            .worker_topic(&self.queue.topic)
            .build()
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            topic: self.queue.topic.clone(),
            visibility_timeout: Duration::from_secs(self.queue.visibility_timeout_secs),
            max_deliveries: self.queue.max_deliveries,
        }
    }

    pub fn agent_engine_config(&self) -> AgentEngineConfig {
        let mut config = AgentEngineConfig::new(&self.gcp.project_number, &self.gcp.location);
        config.api_endpoint = self.gcp.api_endpoint.clone();
        config.access_token = self.gcp.access_token.clone().filter(|t| !t.is_empty());
        config
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.queue.poll_interval_ms)
    }

    pub fn stale_after(&self) -> Result<chrono::Duration, ValidationError> {
        parse_duration(&self.janitor.stale_after)
    }
}
