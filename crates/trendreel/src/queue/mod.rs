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

//! Work Queue: the at-least-once channel between orchestrator and workers.
//!
//! A published [`WorkMessage`] is leased to one consumer at a time by
//! [`WorkQueue::receive`]. Until the consumer calls [`WorkQueue::ack`], the
//! lease expires after the visibility timeout and the message is handed out
//! again, so a worker that crashes mid-row leads to redelivery rather than loss.
//!
//! - [`OutboxQueue`] stores messages in the `work_queue` table of the same
//!   database as the Row Store.
//! - [`MemoryQueue`] keeps them in process.
//! - [`QueueConsumer`] is the worker loop that drains a topic.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::models::WorkMessage;

pub mod consumer;
pub mod distributor;
pub mod memory;
pub mod outbox;

pub use consumer::{ConsumeOutcome, ConsumerConfig, QueueConsumer};
pub use distributor::{PollingDistributor, WorkDistributor};
pub use memory::MemoryQueue;
pub use outbox::OutboxQueue;

/// Identifier assigned to a message when the queue accepts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub i64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One leased message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: MessageId,
    pub topic: String,
    /// Raw JSON as published. Decoding is left to the consumer so that a
    /// payload that no longer parses can still be dead-lettered.
    pub payload: String,
    /// How many times this message has been leased, including this one.
    pub delivery_attempts: u32,
}

impl Delivery {
    pub fn decode(&self) -> Result<WorkMessage, serde_json::Error> {
        WorkMessage::from_json(&self.payload)
    }
}

/// A durable, at-least-once message channel.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Publishes a message and returns its id once the queue has accepted it.
    async fn publish(&self, topic: &str, message: &WorkMessage) -> Result<MessageId, QueueError>;

    /// Leases the oldest visible message on `topic`, hiding it from other
    /// consumers for `visibility_timeout`.
    async fn receive(
        &self,
        topic: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<Delivery>, QueueError>;

    /// Removes a message after it was handled.
    async fn ack(&self, id: MessageId) -> Result<(), QueueError>;

    /// Makes a leased message visible again immediately.
    async fn nack(&self, id: MessageId) -> Result<(), QueueError>;

    /// Parks a message that must not be delivered again.
    async fn dead_letter(&self, id: MessageId, reason: &str) -> Result<(), QueueError>;
}
