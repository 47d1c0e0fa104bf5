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

//! Command implementations and the wiring they share.

pub mod admin;
pub mod orchestrate;
pub mod serve;
pub mod work;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use trendreel::{
    AgentEngineClient, AgentInvoker, AppConfig, Database, OutboxQueue, RowStore, SqlRowStore,
    TableRef, WorkQueue,
};

/// Connected database plus the configuration every command reads from.
#[derive(Clone)]
pub struct Runtime {
    pub config: AppConfig,
    pub database: Database,
}

impl Runtime {
    /// Opens the pool, applies migrations and makes sure the default Row Store
    /// table exists.
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let database = connect_database(&config).await?;
        database
            .ensure_row_table(&config.default_table())
            .await
            .context("Failed to prepare the default Row Store table")?;
        Ok(Self { config, database })
    }

    pub fn store(&self) -> Arc<dyn RowStore> {
        Arc::new(SqlRowStore::new(self.database.clone()))
    }

    pub fn queue(&self) -> Arc<dyn WorkQueue> {
        Arc::new(OutboxQueue::new(self.database.clone()))
    }

    pub fn invoker(&self) -> Result<Arc<dyn AgentInvoker>> {
        let client = AgentEngineClient::new(self.config.agent_engine_config())
            .context("Failed to build the agent runtime client")?;
        Ok(Arc::new(client))
    }

    /// Resolves a table from command-line overrides, falling back to `[database]`.
    pub fn table(&self, dataset: Option<String>, table: Option<String>) -> TableRef {
        TableRef::new(
            dataset.unwrap_or_else(|| self.config.database.dataset.clone()),
            table.unwrap_or_else(|| self.config.database.table.clone()),
        )
    }
}

/// Opens the configured database and applies pending migrations.
pub async fn connect_database(config: &AppConfig) -> Result<Database> {
    let database = Database::try_new(&config.database.url, config.database.pool_size)
        .context("Failed to connect to database")?;
    database
        .run_migrations()
        .await
        .context("Failed to run migrations")?;
    info!(backend = database.backend().as_str(), "Database ready");
    Ok(database)
}
