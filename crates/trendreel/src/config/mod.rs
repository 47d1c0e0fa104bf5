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

//! Configuration.
//!
//! Two layers:
//!
//! - [`PipelineConfig`]: the behaviour knobs the orchestrator, worker and
//!   fan-out read at runtime, built in code with [`PipelineConfig::builder()`].
//! - [`AppConfig`]: the deployment file (`trendreel.toml`) read by the CLI
//!   through [`ConfigLoader`], which produces a `PipelineConfig` and the
//!   connection settings for the database, queue and agent runtime.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::ProcessedStatus;

pub mod app;
pub mod duration;
pub mod error;
pub mod loader;

pub use app::{
    AppConfig, DatabaseSection, ExecutionSection, GcpSection, JanitorSection, QueueSection,
    ServerSection,
};
pub use duration::parse_duration;
pub use error::{ConfigError, ValidationError};
pub use loader::{ConfigLoader, ConfigSource, CONFIG_ENV_VAR};

/// How claimed rows are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Claim as `QUEUED` and publish one work message per row.
    #[default]
    TwoTier,
    /// Claim as `PROCESSING` and run every row in this process.
    SingleTier,
}

impl DispatchMode {
    /// The status rows are claimed with in this mode.
    pub fn claim_status(&self) -> ProcessedStatus {
        match self {
            DispatchMode::TwoTier => ProcessedStatus::Queued,
            DispatchMode::SingleTier => ProcessedStatus::Processing,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::TwoTier => "two_tier",
            DispatchMode::SingleTier => "single_tier",
        }
    }
}

impl fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "two_tier" => Ok(DispatchMode::TwoTier),
            "single_tier" => Ok(DispatchMode::SingleTier),
            other => Err(ValidationError::InvalidMode {
                mode: other.to_string(),
            }),
        }
    }
}

/// Runtime behaviour of the orchestrator, worker and fan-out layer.
///
/// # Construction
///
/// ```rust
/// use std::time::Duration;
/// use trendreel::config::{DispatchMode, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .mode(DispatchMode::SingleTier)
///     .max_concurrent_rows(8)
///     .invocation_timeout(Some(Duration::from_secs(900)))
///     .build();
///
/// assert_eq!(config.max_concurrent_rows(), 8);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct PipelineConfig {
    mode: DispatchMode,
    max_concurrent_rows: usize,
    invocation_timeout: Option<Duration>,
    caller_id_prefix: String,
    worker_topic: String,
    record_checkpoints: bool,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Upper bound on rows running at once in single-tier mode.
    pub fn max_concurrent_rows(&self) -> usize {
        self.max_concurrent_rows
    }

    /// Limit on one agent invocation; `None` relies on the platform's own timeout.
    pub fn invocation_timeout(&self) -> Option<Duration> {
        self.invocation_timeout
    }

    pub fn caller_id_prefix(&self) -> &str {
        &self.caller_id_prefix
    }

    /// Topic work messages are published to.
    pub fn worker_topic(&self) -> &str {
        &self.worker_topic
    }

    pub fn record_checkpoints(&self) -> bool {
        self.record_checkpoints
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfigBuilder::default().build()
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl Default for PipelineConfigBuilder {
    fn default() -> Self {
        Self {
            config: PipelineConfig {
                mode: DispatchMode::TwoTier,
                max_concurrent_rows: 10,
                invocation_timeout: None,
                caller_id_prefix: "Ima_CloudRun_jr".to_string(),
                worker_topic: "creative-worker-queue-topic".to_string(),
                record_checkpoints: true,
            },
        }
    }
}

impl PipelineConfigBuilder {
    pub fn mode(mut self, value: DispatchMode) -> Self {
        self.config.mode = value;
        self
    }

    /// Sets the fan-out concurrency limit. Zero is treated as one.
    pub fn max_concurrent_rows(mut self, value: usize) -> Self {
        self.config.max_concurrent_rows = value.max(1);
        self
    }

    pub fn invocation_timeout(mut self, value: Option<Duration>) -> Self {
        self.config.invocation_timeout = value;
        self
    }

    pub fn caller_id_prefix(mut self, value: impl Into<String>) -> Self {
        self.config.caller_id_prefix = value.into();
        self
    }

    pub fn worker_topic(mut self, value: impl Into<String>) -> Self {
        self.config.worker_topic = value.into();
        self
    }

    pub fn record_checkpoints(mut self, value: bool) -> Self {
        self.config.record_checkpoints = value;
        self
    }

    pub fn build(self) -> PipelineConfig {
        self.config
    }
}
