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

//! Accumulated agent run state.
//!
//! The agent runtime reports state changes as `actions.state_delta` on each
//! streamed event. Rather than mutating one shared map in place, each event's
//! delta produces a new [`RunState`]; the previous value is never observed
//! half-updated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key/value state visible to the agent's sub-steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunState {
    values: Map<String, Value>,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state with `delta` applied. A `null` value removes the key.
    pub fn merge(mut self, delta: &Map<String, Value>) -> Self {
        for (key, value) in delta {
            if value.is_null() {
                self.values.remove(key);
            } else {
                self.values.insert(key.clone(), value.clone());
            }
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.values
    }
}
