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

//! Push notification decoding.
//!
//! Both entrypoints are invoked with a push envelope whose `message.data` is
//! base64-encoded JSON:
//!
//! ```json
//! {"message": {"data": "eyJicV9kYXRhc2V0IjogLi4ufQ==", "messageId": "1"}, "subscription": "..."}
//! ```
//!
//! A body that cannot be decoded at any layer is a [`TriggerError`]. A body
//! that decodes to JSON but lacks routing keys is a valid trigger with
//! nothing to do.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TriggerError;
use crate::models::TableRef;

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    data: Option<String>,
}

/// Extracts and base64-decodes `message.data` from a push envelope.
pub fn decode_push_data(body: &[u8]) -> Result<String, TriggerError> {
    let envelope: PushEnvelope = serde_json::from_slice(body).map_err(TriggerError::Envelope)?;
    let data = envelope
        .message
        .data
        .filter(|d| !d.is_empty())
        .ok_or(TriggerError::MissingData)?;
    let bytes = STANDARD.decode(data.trim())?;
    Ok(String::from_utf8(bytes)?)
}

/// Wraps a JSON payload in a push envelope, the inverse of [`decode_push_data`].
pub fn encode_push_body(payload: &Value) -> String {
    let data = STANDARD.encode(payload.to_string());
    serde_json::json!({ "message": { "data": data } }).to_string()
}

/// Routing information carried by an orchestrator trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerPayload {
    pub bq_dataset: String,
    pub bq_table: String,
    pub agent_resource_id: String,
}

impl TriggerPayload {
    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.bq_dataset, &self.bq_table)
    }
}

/// A decoded trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Ready(TriggerPayload),
    /// Valid JSON without all routing keys; there is no work to do.
    Incomplete { missing: Vec<&'static str> },
}

const REQUIRED_KEYS: [&str; 3] = ["bq_dataset", "bq_table", "agent_resource_id"];

/// Parses decoded trigger data. Keys that are absent, null, empty or not
/// strings count as missing.
pub fn parse_trigger(data: &str) -> Result<Trigger, TriggerError> {
    let value: Value = serde_json::from_str(data).map_err(TriggerError::Payload)?;

    let field = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    };

    let missing: Vec<&'static str> = REQUIRED_KEYS
        .into_iter()
        .filter(|key| field(*key).is_none())
        .collect();

    match (field("bq_dataset"), field("bq_table"), field("agent_resource_id")) {
        (Some(bq_dataset), Some(bq_table), Some(agent_resource_id)) => {
            Ok(Trigger::Ready(TriggerPayload {
                bq_dataset,
                bq_table,
                agent_resource_id,
            }))
        }
        _ => Ok(Trigger::Incomplete { missing }),
    }
}

/// Decodes a push envelope all the way to a [`Trigger`].
pub fn decode_trigger(body: &[u8]) -> Result<Trigger, TriggerError> {
    parse_trigger(&decode_push_data(body)?)
}
