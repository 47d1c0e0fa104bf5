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

//! Error types for the trendreel pipeline.
//!
//! Each layer owns its own error enum:
//!
//! - [`StoreError`] for Row Store reads and status writes
//! - [`QueueError`] for Work Queue publish/receive/ack
//! - [`InvokeError`] for calls into the remote agent runtime
//! - [`TriggerError`] for undecodable push notifications
//! - [`OrchestratorError`] and [`WorkerError`] for the two invocation entrypoints
//!
//! Failures local to a single row surface as [`WorkerError::Invocation`] (or a
//! `failed` entry in a [`crate::BatchResult`]); failures of the claim step surface
//! as [`OrchestratorError::Claim`] and abort the whole invocation.

use std::time::Duration;

use thiserror::Error;

use crate::models::{EntryTimestamp, IdentifierError, ProcessedStatus};

/// Errors raised by a [`crate::RowStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not obtain a pooled connection or the blocking interaction failed.
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    /// The statement itself failed.
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// The dataset or table name from the trigger is not a safe SQL identifier.
    #[error("Invalid table reference: {0}")]
    InvalidTable(#[from] IdentifierError),

    /// A stored value could not be mapped back into the domain model.
    #[error("Corrupt row {entry_timestamp}: {message}")]
    CorruptRow {
        entry_timestamp: String,
        message: String,
    },

    /// The store refused the operation (used by in-process stores).
    #[error("Row store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by a [`crate::WorkQueue`] implementation.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("Message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The message id is unknown or its lease was already released.
    #[error("Message {0} not found")]
    NotFound(i64),

    #[error("Queue closed")]
    Closed,
}

/// Errors raised while invoking the remote generation agent.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("Agent invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Agent API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed agent response: {0}")]
    MalformedResponse(String),

    #[error("Agent returned no final text response")]
    EmptyResponse,

    #[error("Agent invocation failed: {0}")]
    Remote(String),
}

/// Errors raised while decoding a push notification body.
///
/// A body that cannot be decoded is always fatal; there is no degraded path.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("Push envelope is not valid JSON: {0}")]
    Envelope(serde_json::Error),

    #[error("Push envelope has no message data")]
    MissingData,

    #[error("Message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Message data is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Message payload is not valid JSON: {0}")]
    Payload(serde_json::Error),
}

/// Errors that fail an entire orchestrator invocation.
///
/// Returning any of these to the messaging layer causes the trigger to be
/// redelivered. Every variant is safe to retry: rows are only ever claimed by
/// a statement that either fully succeeded or fully failed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error("Failed to read unclaimed rows: {0}")]
    Fetch(#[source] StoreError),

    #[error("Failed to claim {count} row(s): {source}")]
    Claim {
        count: usize,
        #[source]
        source: StoreError,
    },

    #[error("{failed} of {attempted} work message(s) failed to publish: {first}")]
    Publish {
        attempted: usize,
        failed: usize,
        first: QueueError,
    },

    #[error("Failed to record {status} for {count} row(s): {source}")]
    Finalize {
        status: ProcessedStatus,
        count: usize,
        #[source]
        source: StoreError,
    },

    #[error("Two-tier dispatch requires a work queue")]
    MissingQueue,

    #[error("Single-tier dispatch requires an agent invoker")]
    MissingInvoker,
}

/// Errors returned by a [`crate::Worker`] for a single work message.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error("Work message could not be decoded: {0}")]
    Decode(#[source] serde_json::Error),

    /// The agent call failed; the row has already been marked `FAILED`.
    #[error("Row {entry_timestamp} failed: {source}")]
    Invocation {
        entry_timestamp: EntryTimestamp,
        #[source]
        source: InvokeError,
    },

    /// The terminal status write failed; the row remains in its claimed state.
    #[error("Could not mark row {entry_timestamp} as {status}: {source}")]
    Finalize {
        entry_timestamp: EntryTimestamp,
        status: ProcessedStatus,
        #[source]
        source: StoreError,
    },

    #[error("Failed to look up row {entry_timestamp}: {source}")]
    Lookup {
        entry_timestamp: EntryTimestamp,
        #[source]
        source: StoreError,
    },
}

impl WorkerError {
    /// Returns the agent error when the row itself failed.
    pub fn invoke_error(&self) -> Option<&InvokeError> {
        match self {
            WorkerError::Invocation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether redelivering the same message could ever succeed.
    pub fn is_poison(&self) -> bool {
        matches!(self, WorkerError::Trigger(_) | WorkerError::Decode(_))
    }
}
