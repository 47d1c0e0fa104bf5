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

//! Diesel schema for the tables trendreel owns.
//!
//! Row Store tables are named by the trigger at runtime and are therefore
//! accessed through validated `sql_query` statements instead of `table!`.

diesel::table! {
    work_queue (id) {
        id -> BigInt,
        topic -> Text,
        payload -> Text,
        delivery_attempts -> Integer,
        visible_at -> Timestamp,
        dead_lettered -> Bool,
        dead_letter_reason -> Nullable<Text>,
        created_at -> Timestamp,
    }
}

diesel::table! {
    orchestrator_checkpoints (id) {
        id -> BigInt,
        dataset -> Text,
        table_name -> Text,
        rows_seen -> BigInt,
        rows_claimed -> BigInt,
        checked_at -> Timestamp,
    }
}

diesel::allow_tables_to_appear_in_same_query!(work_queue, orchestrator_checkpoints);
