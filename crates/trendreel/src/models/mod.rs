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

//! Domain types shared by the Row Store, Work Queue and both entrypoints.
//!
//! These are API-level types; the SQL store maps them to and from
//! backend-specific row structs at the data access boundary.

pub mod batch;
pub mod checkpoint;
pub mod message;
pub mod table;
pub mod work_item;

pub use batch::BatchResult;
pub use checkpoint::Checkpoint;
pub use message::{RowData, WorkMessage};
pub use table::{validate_identifier, IdentifierError, TableRef};
pub use work_item::{
    CampaignFields, EntryTimestamp, NewWorkItem, ProcessedStatus, UnknownStatus, WorkItem,
};
