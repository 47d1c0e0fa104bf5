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

//! In-memory outcome of one fan-out batch.

use std::collections::BTreeSet;

use super::work_item::EntryTimestamp;

/// Partition of a batch's rows by how their work ended. Unordered apart from
/// the set ordering; a timestamp appears in at most one of the two sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub succeeded: BTreeSet<EntryTimestamp>,
    pub failed: BTreeSet<EntryTimestamp>,
}

impl BatchResult {
    pub fn record_success(&mut self, ts: EntryTimestamp) {
        self.failed.remove(&ts);
        self.succeeded.insert(ts);
    }

    pub fn record_failure(&mut self, ts: EntryTimestamp) {
        self.succeeded.remove(&ts);
        self.failed.insert(ts);
    }

    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn succeeded_vec(&self) -> Vec<EntryTimestamp> {
        self.succeeded.iter().copied().collect()
    }

    pub fn failed_vec(&self) -> Vec<EntryTimestamp> {
        self.failed.iter().copied().collect()
    }
}
