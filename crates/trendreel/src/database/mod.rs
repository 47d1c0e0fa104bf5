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

//! Database layer: connection pooling, embedded migrations and the schema of
//! the tables trendreel owns (`work_queue`, `orchestrator_checkpoints`).
//!
//! Both backends are selected at runtime from the connection URL. The default
//! Row Store table (`trend_trawler.target_trends`) is created by the
//! migrations; other tables can be prepared with [`Database::ensure_row_table`].

pub mod connection;
pub mod schema;

pub use connection::{AnyPool, BackendType, Database, DatabaseError};

use diesel_migrations::{embed_migrations, EmbeddedMigrations};

#[cfg(feature = "postgres")]
pub const POSTGRES_MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/database/migrations/postgres");

#[cfg(feature = "sqlite")]
pub const SQLITE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("src/database/migrations/sqlite");
