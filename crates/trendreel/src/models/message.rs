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

//! Work Message Model
//!
//! The payload an orchestrator publishes for each claimed row. It is a copy of
//! the row plus routing metadata; the row itself stays the record of truth.

use serde::{Deserialize, Serialize};

use super::table::TableRef;
use super::work_item::{CampaignFields, EntryTimestamp, WorkItem};

/// Row fields embedded in a [`WorkMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowData {
    pub entry_timestamp: EntryTimestamp,
    pub target_trend: String,
    pub brand: String,
    pub target_audience: String,
    pub target_product: String,
    pub key_selling_point: String,
    /// Position of the row within the claimed batch; used to derive the caller id.
    pub index: usize,
}

/// One unit of queued work: a claimed row and where to report back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkMessage {
    pub bq_dataset: String,
    pub bq_table: String,
    pub agent_resource_id: String,
    pub row_data: RowData,
}

impl WorkMessage {
    pub fn from_item(
        table: &TableRef,
        agent_resource_id: &str,
        item: &WorkItem,
        index: usize,
    ) -> Self {
        Self {
            bq_dataset: table.dataset.clone(),
            bq_table: table.table.clone(),
            agent_resource_id: agent_resource_id.to_string(),
            row_data: RowData {
                entry_timestamp: item.entry_timestamp,
                target_trend: item.target_trend.clone(),
                brand: item.brand.clone(),
                target_audience: item.target_audience.clone(),
                target_product: item.target_product.clone(),
                key_selling_point: item.key_selling_point.clone(),
                index,
            },
        }
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(&self.bq_dataset, &self.bq_table)
    }

    pub fn entry_timestamp(&self) -> EntryTimestamp {
        self.row_data.entry_timestamp
    }

    pub fn campaign(&self) -> CampaignFields {
        CampaignFields {
            brand: self.row_data.brand.clone(),
            target_audience: self.row_data.target_audience.clone(),
            target_product: self.row_data.target_product.clone(),
            key_selling_point: self.row_data.key_selling_point.clone(),
            target_search_trend: self.row_data.target_trend.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
