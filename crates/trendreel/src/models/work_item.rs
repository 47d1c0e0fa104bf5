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

//! Work Item Model
//!
//! A work item is one (trend, campaign) row in the Row Store. Rows are created
//! upstream with no status, claimed by an orchestrator, and resolved to a
//! terminal status by whoever ran the generation work for them.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Correlation key of a row: the moment the upstream producer wrote it.
///
/// Unique within a table. Serialized as RFC 3339 with microsecond precision;
/// parsing also accepts the `YYYY-MM-DD HH:MM:SS[.ffffff][ UTC]` form that
/// warehouse exports produce.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryTimestamp(pub DateTime<Utc>);

impl EntryTimestamp {
    /// Wraps `dt`, truncated to the microsecond precision every backend and
    /// the wire format can carry.
    pub fn new(dt: DateTime<Utc>) -> Self {
        Self(dt.trunc_subsecs(6))
    }

    pub fn now() -> Self {
        Self::new(Utc::now())
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn into_inner(self) -> DateTime<Utc> {
        self.0
    }

    /// Naive UTC value, as stored by backends without time zone support.
    pub fn naive_utc(&self) -> NaiveDateTime {
        self.0.naive_utc()
    }

    pub fn from_naive_utc(naive: NaiveDateTime) -> Self {
        Self::new(naive.and_utc())
    }

    pub fn to_rfc3339(&self) -> String {
        self.0.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

impl fmt::Display for EntryTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for EntryTimestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::new(dt)
    }
}

impl FromStr for EntryTimestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(Self::new(dt.with_timezone(&Utc)));
        }
        let naive = s.strip_suffix(" UTC").unwrap_or(s);
        NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S%.f").map(Self::from_naive_utc)
    }
}

impl Serialize for EntryTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for EntryTimestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Value of the `processed_status` column. An unset column (SQL `NULL`) is
/// represented as `None` wherever a status is optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessedStatus {
    /// Claimed by a two-tier orchestrator and published to the work queue.
    Queued,
    /// Claimed by a single-tier orchestrator and running in-process.
    Processing,
    Processed,
    Failed,
}

impl ProcessedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessedStatus::Queued => "QUEUED",
            ProcessedStatus::Processing => "PROCESSING",
            ProcessedStatus::Processed => "PROCESSED",
            ProcessedStatus::Failed => "FAILED",
        }
    }

    /// `PROCESSED` and `FAILED` end one processing attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessedStatus::Processed | ProcessedStatus::Failed)
    }

    /// `QUEUED` and `PROCESSING` reserve a row for in-flight work.
    pub fn is_claimed(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for ProcessedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown processed_status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for ProcessedStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => Ok(ProcessedStatus::Queued),
            "PROCESSING" => Ok(ProcessedStatus::Processing),
            "PROCESSED" => Ok(ProcessedStatus::Processed),
            "FAILED" => Ok(ProcessedStatus::Failed),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

/// Campaign and trend fields handed to the agent, passed through verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignFields {
    pub brand: String,
    pub target_audience: String,
    pub target_product: String,
    pub key_selling_point: String,
    pub target_search_trend: String,
}

impl CampaignFields {
    /// Renders the fields as the labelled block the creative agent expects.
    pub fn to_query(&self) -> String {
        format!(
            "Brand: {}\nTarget Product: {}\nKey Selling Point(s): {}\nTarget Audience: {}\nTarget Search Trend: {}\n",
            self.brand,
            self.target_product,
            self.key_selling_point,
            self.target_audience,
            self.target_search_trend
        )
    }
}

/// One trend + campaign row (domain type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub entry_timestamp: EntryTimestamp,
    pub processed_status: Option<ProcessedStatus>,
    pub target_trend: String,
    pub brand: String,
    pub target_audience: String,
    pub target_product: String,
    pub key_selling_point: String,
    /// When `processed_status` last changed. `None` for rows never touched.
    pub status_updated_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn campaign(&self) -> CampaignFields {
        CampaignFields {
            brand: self.brand.clone(),
            target_audience: self.target_audience.clone(),
            target_product: self.target_product.clone(),
            key_selling_point: self.key_selling_point.clone(),
            target_search_trend: self.target_trend.clone(),
        }
    }

    pub fn is_unclaimed(&self) -> bool {
        self.processed_status.is_none()
    }
}

/// Structure for inserting rows (domain type).
///
/// Rows are normally written by the upstream trend-discovery process; this is
/// used for seeding and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewWorkItem {
    pub entry_timestamp: EntryTimestamp,
    pub target_trend: String,
    pub brand: String,
    pub target_audience: String,
    pub target_product: String,
    pub key_selling_point: String,
}

impl From<NewWorkItem> for WorkItem {
    fn from(new: NewWorkItem) -> Self {
        WorkItem {
            entry_timestamp: new.entry_timestamp,
            processed_status: None,
            target_trend: new.target_trend,
            brand: new.brand,
            target_audience: new.target_audience,
            target_product: new.target_product,
            key_selling_point: new.key_selling_point,
            status_updated_at: None,
        }
    }
}
