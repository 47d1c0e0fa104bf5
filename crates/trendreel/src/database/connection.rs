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

//! Database connection management supporting SQLite and PostgreSQL.
//!
//! Connections are pooled with `deadpool-diesel`; every statement runs inside
//! `interact` on a blocking thread so async callers are never stalled by
//! diesel's synchronous API.
//!
//! # Example
//!
//! ```rust,ignore
//! use trendreel::database::Database;
//!
//! let db = Database::try_new("sqlite://trendreel.db", 4)?;
//! db.run_migrations().await?;
//! ```

use thiserror::Error;
use tracing::info;

#[cfg(feature = "postgres")]
use deadpool_diesel::postgres::{Manager as PgManager, Pool as PgPool, Runtime as PgRuntime};
#[cfg(feature = "sqlite")]
use deadpool_diesel::sqlite::{
    Manager as SqliteManager, Pool as SqlitePool, Runtime as SqliteRuntime,
};

use crate::models::TableRef;

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
compile_error!("Enable at least one database backend: 'sqlite' or 'postgres'");

/// Errors raised while opening or preparing a database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error(
        "Unable to detect database backend from URL '{0}'. \
         Expected postgres://, postgresql://, sqlite://, or a file path."
    )]
    UnsupportedUrl(String),

    #[error("Backend '{0}' is not compiled into this build")]
    BackendDisabled(&'static str),

    #[error("Failed to create connection pool: {0}")]
    Pool(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid table reference: {0}")]
    InvalidTable(#[from] crate::models::IdentifierError),
}

/// Represents the database backend type, detected at runtime from the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    #[cfg(feature = "postgres")]
    Postgres,
    #[cfg(feature = "sqlite")]
    Sqlite,
}

impl BackendType {
    /// Detect the backend type from a connection URL.
    pub fn from_url(url: &str) -> Result<Self, DatabaseError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            #[cfg(feature = "postgres")]
            return Ok(BackendType::Postgres);
            #[cfg(not(feature = "postgres"))]
            return Err(DatabaseError::BackendDisabled("postgres"));
        }

        // SQLite URLs can be:
        // - sqlite:// prefix
        // - file: URI format (e.g., file:test?mode=memory&cache=shared)
        // - file paths (relative or absolute)
        // - :memory: for in-memory databases
        if url.starts_with("sqlite://")
            || url.starts_with("file:")
            || url.starts_with('/')
            || url.starts_with("./")
            || url.starts_with("../")
            || url == ":memory:"
            || url.ends_with(".db")
            || url.ends_with(".sqlite")
            || url.ends_with(".sqlite3")
        {
            #[cfg(feature = "sqlite")]
            return Ok(BackendType::Sqlite);
            #[cfg(not(feature = "sqlite"))]
            return Err(DatabaseError::BackendDisabled("sqlite"));
        }

        Err(DatabaseError::UnsupportedUrl(url.to_string()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            #[cfg(feature = "postgres")]
            BackendType::Postgres => "postgres",
            #[cfg(feature = "sqlite")]
            BackendType::Sqlite => "sqlite",
        }
    }
}

/// Pool enum that wraps the compiled-in connection pools.
#[derive(Clone)]
pub enum AnyPool {
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
    #[cfg(feature = "sqlite")]
    Sqlite(SqlitePool),
}

impl std::fmt::Debug for AnyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(_) => write!(f, "AnyPool::Postgres(...)"),
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(_) => write!(f, "AnyPool::Sqlite(...)"),
        }
    }
}

/// Represents a pool of database connections.
///
/// `Database` is `Clone`; every clone shares the same underlying pool.
#[derive(Clone, Debug)]
pub struct Database {
    pool: AnyPool,
    backend: BackendType,
}

impl Database {
    /// Creates a new connection pool, detecting the backend from the URL.
    pub fn try_new(connection_string: &str, max_size: u32) -> Result<Self, DatabaseError> {
        let backend = BackendType::from_url(connection_string)?;

        match backend {
            #[cfg(feature = "postgres")]
            BackendType::Postgres => {
                let manager = PgManager::new(connection_string.to_string(), PgRuntime::Tokio1);
                let pool = PgPool::builder(manager)
                    .max_size(max_size.max(1) as usize)
                    .build()
                    .map_err(|e| DatabaseError::Pool(e.to_string()))?;

                info!("PostgreSQL connection pool initialized (size: {})", max_size);

                Ok(Self {
                    pool: AnyPool::Postgres(pool),
                    backend,
                })
            }
            #[cfg(feature = "sqlite")]
            BackendType::Sqlite => {
                let connection_url = Self::build_sqlite_url(connection_string);
                let manager = SqliteManager::new(connection_url, SqliteRuntime::Tokio1);
                // SQLite has limited concurrent write support even with WAL mode.
                // A single connection avoids "database is locked" errors.
                let sqlite_pool_size = 1;
                let pool = SqlitePool::builder(manager)
                    .max_size(sqlite_pool_size)
                    .build()
                    .map_err(|e| DatabaseError::Pool(e.to_string()))?;

                info!(
                    "SQLite connection pool initialized (size: {})",
                    sqlite_pool_size
                );

                Ok(Self {
                    pool: AnyPool::Sqlite(pool),
                    backend,
                })
            }
        }
    }

    /// Returns the detected backend type.
    pub fn backend(&self) -> BackendType {
        self.backend
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    #[cfg(feature = "sqlite")]
    fn build_sqlite_url(connection_string: &str) -> String {
        connection_string
            .strip_prefix("sqlite://")
            .unwrap_or(connection_string)
            .to_string()
    }

    /// Gets a PostgreSQL connection.
    ///
    /// # Panics
    ///
    /// Panics if called on a SQLite backend; callers dispatch on [`Database::backend`] first.
    #[cfg(feature = "postgres")]
    pub async fn get_postgres_connection(
        &self,
    ) -> Result<
        deadpool::managed::Object<PgManager>,
        deadpool::managed::PoolError<deadpool_diesel::Error>,
    > {
        match &self.pool {
            AnyPool::Postgres(pool) => pool.get().await,
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(_) => panic!("get_postgres_connection called on SQLite backend"),
        }
    }

    /// Gets a SQLite connection.
    ///
    /// # Panics
    ///
    /// Panics if called on a PostgreSQL backend; callers dispatch on [`Database::backend`] first.
    #[cfg(feature = "sqlite")]
    pub async fn get_sqlite_connection(
        &self,
    ) -> Result<
        deadpool::managed::Object<SqliteManager>,
        deadpool::managed::PoolError<deadpool_diesel::Error>,
    > {
        match &self.pool {
            AnyPool::Sqlite(pool) => pool.get().await,
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(_) => panic!("get_sqlite_connection called on PostgreSQL backend"),
        }
    }

    /// Runs pending migrations for the detected backend.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        use diesel_migrations::MigrationHarness;

        match &self.pool {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(pool) => {
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::Pool(e.to_string()))?;
                conn.interact(|conn| {
                    conn.run_pending_migrations(super::POSTGRES_MIGRATIONS)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?
                .map_err(DatabaseError::Migration)?;
            }
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(pool) => {
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::Pool(e.to_string()))?;
                conn.interact(|conn| {
                    use diesel::prelude::*;

                    // WAL allows concurrent reads during writes; busy_timeout makes
                    // SQLite wait instead of failing immediately on locks.
                    diesel::sql_query("PRAGMA journal_mode=WAL;")
                        .execute(conn)
                        .map_err(|e| e.to_string())?;
                    diesel::sql_query("PRAGMA busy_timeout=30000;")
                        .execute(conn)
                        .map_err(|e| e.to_string())?;

                    conn.run_pending_migrations(super::SQLITE_MIGRATIONS)
                        .map(|_| ())
                        .map_err(|e| e.to_string())
                })
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?
                .map_err(DatabaseError::Migration)?;
            }
        }

        info!("Migrations applied ({})", self.backend.as_str());
        Ok(())
    }

    /// Creates a Row Store table with the expected columns if it does not exist.
    ///
    /// The default `trend_trawler.target_trends` table is created by the
    /// migrations; this covers any other table a trigger may name.
    pub async fn ensure_row_table(&self, table: &TableRef) -> Result<(), DatabaseError> {
        use diesel::prelude::*;

        match &self.pool {
            #[cfg(feature = "postgres")]
            AnyPool::Postgres(pool) => {
                let qualified = table.qualified()?;
                let schema_sql = format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", table.dataset);
                let table_sql = format!(
                    "CREATE TABLE IF NOT EXISTS {} (\
                        entry_timestamp TIMESTAMPTZ PRIMARY KEY, \
                        target_trend TEXT, brand TEXT, target_audience TEXT, \
                        target_product TEXT, key_selling_point TEXT, \
                        processed_status TEXT, status_updated_at TIMESTAMPTZ)",
                    qualified
                );
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::Pool(e.to_string()))?;
                conn.interact(move |conn| {
                    diesel::sql_query(schema_sql).execute(conn)?;
                    diesel::sql_query(table_sql).execute(conn)
                })
                .await
                .map_err(|e| DatabaseError::Migration(e.to_string()))?
                .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }
            #[cfg(feature = "sqlite")]
            AnyPool::Sqlite(pool) => {
                let name = table.unqualified()?;
                let table_sql = format!(
                    "CREATE TABLE IF NOT EXISTS {} (\
                        entry_timestamp TIMESTAMP PRIMARY KEY NOT NULL, \
                        target_trend TEXT, brand TEXT, target_audience TEXT, \
                        target_product TEXT, key_selling_point TEXT, \
                        processed_status TEXT, status_updated_at TIMESTAMP)",
                    name
                );
                let conn = pool
                    .get()
                    .await
                    .map_err(|e| DatabaseError::Pool(e.to_string()))?;
                conn.interact(move |conn| diesel::sql_query(table_sql).execute(conn))
                    .await
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }
        }

        info!(table = %table, "Row table ready");
        Ok(())
    }
}
