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

//! Pipeline metrics.
//!
//! Emitted through the `metrics` facade; nothing is recorded unless the host
//! installs a recorder (the CLI's `serve` command installs a Prometheus one).

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

/// Rows moved from `NULL` to a claimed status.
pub const ROWS_CLAIMED: &str = "trendreel_rows_claimed_total";

/// Rows finalized as `PROCESSED`.
pub const ROWS_PROCESSED: &str = "trendreel_rows_processed_total";

/// Rows finalized as `FAILED`.
pub const ROWS_FAILED: &str = "trendreel_rows_failed_total";

/// Rows another orchestrator claimed between our scan and our claim.
pub const CLAIM_RACES: &str = "trendreel_claim_races_total";

/// Work messages accepted by the queue.
pub const MESSAGES_PUBLISHED: &str = "trendreel_messages_published_total";

/// Wall-clock duration of agent invocations.
pub const INVOCATION_SECONDS: &str = "trendreel_invocation_seconds";

/// Registers all metric descriptions.
///
/// Call this once at startup after installing a recorder.
pub fn register_metrics() {
    describe_counter!(ROWS_CLAIMED, "Rows claimed for processing");
    describe_counter!(ROWS_PROCESSED, "Rows finalized as PROCESSED");
    describe_counter!(ROWS_FAILED, "Rows finalized as FAILED");
    describe_counter!(CLAIM_RACES, "Rows lost to a concurrent claim");
    describe_counter!(MESSAGES_PUBLISHED, "Work messages published");
    describe_histogram!(INVOCATION_SECONDS, "Agent invocation duration in seconds");
}

pub fn record_claimed(table: &str, rows: usize) {
    counter!(ROWS_CLAIMED, "table" => table.to_string()).increment(rows as u64);
}

pub fn record_claim_race(table: &str, rows: usize) {
    counter!(CLAIM_RACES, "table" => table.to_string()).increment(rows as u64);
}

pub fn record_finalized(table: &str, processed: usize, failed: usize) {
    let labels = [("table", table.to_string())];
    counter!(ROWS_PROCESSED, &labels).increment(processed as u64);
    counter!(ROWS_FAILED, &labels).increment(failed as u64);
}

pub fn record_published(topic: &str, messages: usize) {
    counter!(MESSAGES_PUBLISHED, "topic" => topic.to_string()).increment(messages as u64);
}

pub fn record_invocation(outcome: &str, elapsed: Duration) {
    histogram!(INVOCATION_SECONDS, "outcome" => outcome.to_string()).record(elapsed.as_secs_f64());
}
