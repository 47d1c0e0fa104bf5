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

//! HTTP client for a hosted agent runtime ("reasoning engine").
//!
//! One invocation is a session lifecycle:
//!
//! 1. `async_create_session` for the caller id
//! 2. `async_stream_query` with the campaign block as the message; the
//!    response is a stream of JSON events, one per line (optionally SSE
//!    framed with `data: `)
//! 3. `async_delete_session`, attempted even when streaming failed
//!
//! The final answer is the last text part of any event that is not a
//! function call. Each event's `actions.state_delta` is folded into a
//! [`RunState`].

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{AgentInvoker, AgentRequest, AgentResponse, RunState};
use crate::error::InvokeError;

/// Connection settings for [`AgentEngineClient`].
#[derive(Debug, Clone)]
pub struct AgentEngineConfig {
    pub project_number: String,
    pub location: String,
    /// API root; defaults to the regional endpoint for `location`.
    pub api_endpoint: Option<String>,
    /// OAuth bearer token sent with every request.
    pub access_token: Option<String>,
    /// Per-request HTTP timeout. Streaming responses are bounded by the
    /// invocation timeout instead.
    pub request_timeout: Duration,
}

impl AgentEngineConfig {
    pub fn new(project_number: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            project_number: project_number.into(),
            location: location.into(),
            api_endpoint: None,
            access_token: None,
            request_timeout: Duration::from_secs(60),
        }
    }

    fn base_url(&self) -> String {
        match &self.api_endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}-aiplatform.googleapis.com/v1", self.location),
        }
    }
}

/// Running fold over the streamed events of one query.
#[derive(Debug, Clone, Default)]
struct StreamFold {
    last_text: Option<String>,
    state: RunState,
    events: usize,
}

impl StreamFold {
    /// Applies one event. Returns an error if the event reports a failure.
    fn apply(mut self, event: &Value) -> Result<Self, InvokeError> {
        self.events += 1;

        if let Some(message) = event
            .get("error_message")
            .or_else(|| event.pointer("/error/message"))
            .and_then(Value::as_str)
        {
            return Err(InvokeError::Remote(message.to_string()));
        }

        if let Some(delta) = event.pointer("/actions/state_delta").and_then(Value::as_object) {
            self.state = self.state.merge(delta);
        }

        let parts = event
            .pointer("/content/parts")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for part in parts {
            if part.get("function_call").is_some() {
                continue;
            }
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.trim().is_empty() {
                    self.last_text = Some(text.to_string());
                }
            }
        }
        Ok(self)
    }

    fn finish(self) -> Result<AgentResponse, InvokeError> {
        let text = self.last_text.ok_or(InvokeError::EmptyResponse)?;
        Ok(AgentResponse {
            text,
            state: self.state,
            events: self.events,
        })
    }
}

/// Reassembles newline-delimited lines from arbitrarily split body chunks.
///
/// Bytes are buffered until a full line arrives, so a multi-byte character
/// split across chunks is decoded intact.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Appends `chunk` and returns every line it completed.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, InvokeError> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            lines.push(decode_line(line)?);
        }
        Ok(lines)
    }

    /// Returns the trailing line when the body did not end with a newline.
    fn finish(self) -> Result<Option<String>, InvokeError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        decode_line(self.pending).map(Some)
    }
}

fn decode_line(bytes: Vec<u8>) -> Result<String, InvokeError> {
    String::from_utf8(bytes)
        .map_err(|e| InvokeError::MalformedResponse(format!("stream line is not UTF-8: {e}")))
}

/// Parses one line of the stream body. Blank lines and SSE keep-alives yield `None`.
fn parse_event_line(line: &str) -> Result<Option<Value>, InvokeError> {
    let line = line.trim();
    let payload = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
    if payload.is_empty() || payload.starts_with(':') || payload == "[DONE]" {
        return Ok(None);
    }
    serde_json::from_str(payload)
        .map(Some)
        .map_err(|e| InvokeError::MalformedResponse(format!("{e}: {payload}")))
}

/// [`AgentInvoker`] that talks to a hosted agent runtime over HTTPS.
#[derive(Debug, Clone)]
pub struct AgentEngineClient {
    http: reqwest::Client,
    base_url: String,
    project_number: String,
    location: String,
    access_token: Option<String>,
}

impl AgentEngineClient {
    pub fn new(config: AgentEngineConfig) -> Result<Self, InvokeError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            base_url: config.base_url(),
            http,
            project_number: config.project_number,
            location: config.location,
            access_token: config.access_token,
        })
    }

    /// Full resource name for an agent id. Ids that are already full names pass through.
    pub fn resource_name(&self, agent_resource_id: &str) -> String {
        if agent_resource_id.starts_with("projects/") {
            return agent_resource_id.to_string();
        }
        format!(
            "projects/{}/locations/{}/reasoningEngines/{}",
            self.project_number, self.location, agent_resource_id
        )
    }

    fn post(&self, url: String) -> reqwest::RequestBuilder {
        let request = self.http.post(url).header("Content-Type", "application/json");
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, InvokeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(InvokeError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Calls a non-streaming class method and returns its `output`.
    async fn query(&self, resource: &str, class_method: &str, input: Value) -> Result<Value, InvokeError> {
        let url = format!("{}/{}:query", self.base_url, resource);
        let body = json!({ "class_method": class_method, "input": input });

        let response = Self::check(self.post(url).json(&body).send().await?).await?;
        let mut value: Value = response.json().await?;
        Ok(value.get_mut("output").map(Value::take).unwrap_or(Value::Null))
    }

    async fn create_session(&self, resource: &str, user_id: &str) -> Result<String, InvokeError> {
        let output = self
            .query(resource, "async_create_session", json!({ "user_id": user_id }))
            .await?;
        let session_id = output
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| InvokeError::MalformedResponse(format!("session without id: {output}")))?
            .to_string();
        info!(user_id, session_id = %session_id, "Created agent session");
        Ok(session_id)
    }

    async fn delete_session(&self, resource: &str, user_id: &str, session_id: &str) -> Result<(), InvokeError> {
        self.query(
            resource,
            "async_delete_session",
            json!({ "user_id": user_id, "session_id": session_id }),
        )
        .await?;
        info!(user_id, session_id, "Deleted agent session");
        Ok(())
    }

    async fn stream_query(
        &self,
        resource: &str,
        user_id: &str,
        session_id: &str,
        message: &str,
    ) -> Result<AgentResponse, InvokeError> {
        let url = format!("{}/{}:streamQuery", self.base_url, resource);
        let body = json!({
            "class_method": "async_stream_query",
            "input": { "user_id": user_id, "session_id": session_id, "message": message },
        });

        let response = Self::check(self.post(url).json(&body).send().await?).await?;
        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut fold = StreamFold::default();

        while let Some(chunk) = stream.next().await {
            for line in lines.push(&chunk?)? {
                if let Some(event) = parse_event_line(&line)? {
                    debug!(user_id, event = %event, "Agent event");
                    fold = fold.apply(&event)?;
                }
            }
        }
        if let Some(line) = lines.finish()? {
            if let Some(event) = parse_event_line(&line)? {
                debug!(user_id, event = %event, "Agent event");
                fold = fold.apply(&event)?;
            }
        }

        fold.finish()
    }
}

#[async_trait]
impl AgentInvoker for AgentEngineClient {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, InvokeError> {
        let resource = self.resource_name(&request.agent_resource_id);
        let user_id = request.caller_id.as_str();
        let session_id = self.create_session(&resource, user_id).await?;

        let result = self
            .stream_query(&resource, user_id, &session_id, &request.campaign.to_query())
            .await;

        if let Err(e) = self.delete_session(&resource, user_id, &session_id).await {
            warn!(user_id, session_id = %session_id, error = %e, "Failed to delete agent session");
        }

        if let Ok(response) = &result {
            info!(user_id, events = response.events, "Agent run completed");
        }
        result
    }
}
