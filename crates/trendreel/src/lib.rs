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

//! # trendreel
//!
//! Claim-before-work orchestration for batch creative generation.
//!
//! Rows describing a trend and a campaign brief land in a shared table with
//! `processed_status = NULL`. An [`Orchestrator`] claims them in one
//! conditional update and then either publishes one [`WorkMessage`] per row to
//! a [`WorkQueue`] (two-tier) or runs them in process through [`FanOut`]
//! (single-tier). A [`Worker`] runs the remote generation agent for one row
//! and records `PROCESSED` or `FAILED`.
//!
//! ```text
//!  trigger ──▶ Orchestrator ──claim──▶ RowStore (NULL → QUEUED)
//!                  │
//!                  └──publish──▶ WorkQueue ──▶ Worker ──▶ AgentInvoker
//!                                               │
//!                                               └──▶ RowStore (→ PROCESSED | FAILED)
//! ```
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use trendreel::{Database, Orchestrator, OutboxQueue, PipelineConfig, SqlRowStore};
//!
//! let database = Database::try_new("sqlite://trendreel.db", 1)?;
//! database.run_migrations().await?;
//!
//! let orchestrator = Orchestrator::new(
//!     Arc::new(SqlRowStore::new(database.clone())),
//!     PipelineConfig::default(),
//! )
//! .with_queue(Arc::new(OutboxQueue::new(database)));
//!
//! orchestrator.handle_push(&push_body).await?;
//! ```
//!
//! ## Backends
//!
//! - `sqlite` (default): a single file; the dataset part of a table
//!   reference is ignored.
//! - `postgres`: the dataset is the schema holding the table.

pub mod config;
pub mod database;
pub mod error;
pub mod fanout;
pub mod invoker;
pub mod janitor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod queue;
pub mod store;
pub mod trigger;
pub mod worker;

pub use config::{AppConfig, ConfigLoader, DispatchMode, PipelineConfig, PipelineConfigBuilder};
pub use database::{BackendType, Database, DatabaseError};
pub use error::{
    InvokeError, OrchestratorError, QueueError, StoreError, TriggerError, WorkerError,
};
pub use fanout::FanOut;
pub use invoker::{AgentEngineClient, AgentEngineConfig, AgentInvoker, AgentRequest, AgentResponse};
pub use janitor::{Janitor, SweepReport};
pub use logging::{init_logging, init_test_logging};
pub use models::{
    BatchResult, CampaignFields, Checkpoint, EntryTimestamp, NewWorkItem, ProcessedStatus,
    TableRef, WorkItem, WorkMessage,
};
pub use orchestrator::{DispatchSummary, OrchestrationReport, Orchestrator};
pub use queue::{
    ConsumeOutcome, ConsumerConfig, MemoryQueue, MessageId, OutboxQueue, PollingDistributor,
    QueueConsumer, WorkQueue,
};
pub use store::{MemoryRowStore, RowStore, SqlRowStore};
pub use trigger::{Trigger, TriggerPayload};
pub use worker::{Worker, WorkerOutcome};

/// Evaluates the expression for the active database backend.
///
/// Arms for backends whose feature is disabled are compiled out together with
/// their expression.
#[macro_export]
macro_rules! dispatch_backend {
    ($backend:expr, $pg:expr, $sqlite:expr) => {
        match $backend {
            #[cfg(feature = "postgres")]
            $crate::database::BackendType::Postgres => $pg,
            #[cfg(feature = "sqlite")]
            $crate::database::BackendType::Sqlite => $sqlite,
        }
    };
}
