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

//! In-process Work Queue with the same lease semantics as the outbox table.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{Delivery, MessageId, WorkDistributor, WorkQueue};
use crate::error::QueueError;
use crate::models::WorkMessage;

#[derive(Debug, Clone)]
struct Entry {
    topic: String,
    payload: String,
    delivery_attempts: u32,
    visible_at: Instant,
    dead_letter_reason: Option<String>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    entries: BTreeMap<i64, Entry>,
}

/// A [`WorkQueue`] held in memory. Messages are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    state: Mutex<State>,
    distributor: Option<Arc<dyn WorkDistributor>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wakes `distributor` after every publish.
    pub fn with_distributor(mut self, distributor: Arc<dyn WorkDistributor>) -> Self {
        self.distributor = Some(distributor);
        self
    }

    /// Publishes a raw payload, bypassing serialization. Lets tests enqueue
    /// messages that will not decode.
    pub fn publish_raw(&self, topic: &str, payload: impl Into<String>) -> MessageId {
        let id = {
            let mut state = self.state.lock();
            state.next_id += 1;
            let id = state.next_id;
            state.entries.insert(
                id,
                Entry {
                    topic: topic.to_string(),
                    payload: payload.into(),
                    delivery_attempts: 0,
                    visible_at: Instant::now(),
                    dead_letter_reason: None,
                },
            );
            id
        };
        if let Some(distributor) = &self.distributor {
            distributor.notify_work();
        }
        MessageId(id)
    }

    /// Decoded messages not yet acked or dead-lettered on `topic`, in publish order.
    pub fn pending(&self, topic: &str) -> Vec<WorkMessage> {
        self.state
            .lock()
            .entries
            .values()
            .filter(|e| e.topic == topic && e.dead_letter_reason.is_none())
            .filter_map(|e| WorkMessage::from_json(&e.payload).ok())
            .collect()
    }

    /// Dead-lettered message ids and the reason each was parked.
    pub fn dead_letters(&self, topic: &str) -> Vec<(MessageId, String)> {
        self.state
            .lock()
            .entries
            .iter()
            .filter(|(_, e)| e.topic == topic)
            .filter_map(|(id, e)| e.dead_letter_reason.clone().map(|r| (MessageId(*id), r)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn publish(&self, topic: &str, message: &WorkMessage) -> Result<MessageId, QueueError> {
        let payload = message.to_json()?;
        let id = self.publish_raw(topic, payload);
        debug!(topic, message_id = %id, "Message published");
        Ok(id)
    }

    async fn receive(
        &self,
        topic: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let now = Instant::now();
        let mut state = self.state.lock();
        let next = state
            .entries
            .iter_mut()
            .filter(|(_, e)| e.topic == topic && e.dead_letter_reason.is_none())
            .filter(|(_, e)| e.visible_at <= now)
            .min_by_key(|(id, e)| (e.visible_at, **id));

        Ok(next.map(|(id, entry)| {
            entry.delivery_attempts += 1;
            entry.visible_at = now + visibility_timeout;
            Delivery {
                id: MessageId(*id),
                topic: entry.topic.clone(),
                payload: entry.payload.clone(),
                delivery_attempts: entry.delivery_attempts,
            }
        }))
    }

    async fn ack(&self, id: MessageId) -> Result<(), QueueError> {
        self.state
            .lock()
            .entries
            .remove(&id.0)
            .map(|_| ())
            .ok_or(QueueError::NotFound(id.0))
    }

    async fn nack(&self, id: MessageId) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(&id.0).ok_or(QueueError::NotFound(id.0))?;
        entry.visible_at = Instant::now();
        Ok(())
    }

    async fn dead_letter(&self, id: MessageId, reason: &str) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(&id.0).ok_or(QueueError::NotFound(id.0))?;
        entry.dead_letter_reason = Some(reason.to_string());
        Ok(())
    }
}
