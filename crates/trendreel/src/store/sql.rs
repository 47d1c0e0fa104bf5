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

//! SQL-backed Row Store for SQLite and PostgreSQL.
//!
//! The table a trigger names is only known at runtime, so statements are
//! assembled with [`StatementBuilder`] from validated identifiers and bound
//! parameters, then executed with `diesel::sql_query`. Identifiers are never
//! taken from row data.
//!
//! On PostgreSQL the dataset is the schema (`"dataset"."table"`); SQLite has no
//! schemas and addresses the table by name alone.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::debug;

use super::RowStore;
use crate::database::schema::orchestrator_checkpoints;
use crate::database::{BackendType, Database};
use crate::error::StoreError;
use crate::models::{Checkpoint, EntryTimestamp, NewWorkItem, ProcessedStatus, TableRef, WorkItem};

/// Upper bound on keys bound into one statement. Older SQLite builds cap a
/// statement at 999 parameters, so longer key lists are split into several
/// statements run in a single transaction.
const MAX_BINDS_PER_STATEMENT: usize = 900;

/// Bound parameters per inserted row.
const INSERT_BINDS_PER_ROW: usize = 6;

const ROW_COLUMNS: &str = "entry_timestamp, target_trend, brand, target_audience, \
                           target_product, key_selling_point, processed_status, status_updated_at";

/// A value bound to one statement placeholder.
#[derive(Debug, Clone)]
enum Bind {
    Text(Option<String>),
    Timestamp(EntryTimestamp),
    UpdatedAt(DateTime<Utc>),
}

/// A statement ready to run: SQL text plus its parameters in placeholder order.
#[derive(Debug, Clone)]
struct Statement {
    sql: String,
    binds: Vec<Bind>,
}

/// Builds SQL text with backend-specific placeholders (`?` or `$n`).
struct StatementBuilder {
    backend: BackendType,
    sql: String,
    binds: Vec<Bind>,
}

impl StatementBuilder {
    fn new(backend: BackendType) -> Self {
        Self {
            backend,
            sql: String::new(),
            binds: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Appends the table name in the form the backend addresses it.
    fn push_table(&mut self, table: &TableRef) -> Result<&mut Self, StoreError> {
        let name = crate::dispatch_backend!(self.backend, table.qualified()?, table.unqualified()?);
        self.sql.push_str(&name);
        Ok(self)
    }

    fn bind(&mut self, value: Bind) -> &mut Self {
        self.binds.push(value);
        let placeholder = crate::dispatch_backend!(
            self.backend,
            format!("${}", self.binds.len()),
            "?".to_string()
        );
        self.sql.push_str(&placeholder);
        self
    }

    /// Appends `(p1, p2, ...)` for an `IN` predicate.
    fn bind_timestamps(&mut self, entry_timestamps: &[EntryTimestamp]) -> &mut Self {
        self.sql.push('(');
        for (i, ts) in entry_timestamps.iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            self.bind(Bind::Timestamp(*ts));
        }
        self.sql.push(')');
        self
    }

    fn bind_status(&mut self, status: Option<ProcessedStatus>) -> &mut Self {
        self.bind(Bind::Text(status.map(|s| s.as_str().to_string())))
    }

    fn build(&mut self) -> Statement {
        Statement {
            sql: std::mem::take(&mut self.sql),
            binds: std::mem::take(&mut self.binds),
        }
    }
}

/// Insertable row for the checkpoint audit table.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = orchestrator_checkpoints)]
struct NewCheckpointRow {
    dataset: String,
    table_name: String,
    rows_seen: i64,
    rows_claimed: i64,
    checked_at: NaiveDateTime,
}

impl From<&Checkpoint> for NewCheckpointRow {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            dataset: checkpoint.table.dataset.clone(),
            table_name: checkpoint.table.table.clone(),
            rows_seen: checkpoint.rows_seen as i64,
            rows_claimed: checkpoint.rows_claimed as i64,
            checked_at: checkpoint.checked_at.naive_utc(),
        }
    }
}

/// Maps nullable payload columns and the status string into a [`WorkItem`].
fn build_item(
    entry_timestamp: EntryTimestamp,
    payload: [Option<String>; 5],
    processed_status: Option<String>,
    status_updated_at: Option<DateTime<Utc>>,
) -> Result<WorkItem, StoreError> {
    let processed_status = processed_status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<ProcessedStatus>())
        .transpose()
        .map_err(|e| StoreError::CorruptRow {
            entry_timestamp: entry_timestamp.to_string(),
            message: e.to_string(),
        })?;
    let [target_trend, brand, target_audience, target_product, key_selling_point] =
        payload.map(Option::unwrap_or_default);
    Ok(WorkItem {
        entry_timestamp,
        processed_status,
        target_trend,
        brand,
        target_audience,
        target_product,
        key_selling_point,
        status_updated_at,
    })
}

#[cfg(feature = "sqlite")]
mod sqlite_rows {
    use super::*;
    use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
    use diesel::sql_types::{Nullable, Text, Timestamp};
    use diesel::sqlite::Sqlite;

    #[derive(QueryableByName)]
    pub(super) struct Row {
        #[diesel(sql_type = Timestamp)]
        entry_timestamp: NaiveDateTime,
        #[diesel(sql_type = Nullable<Text>)]
        target_trend: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        brand: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        target_audience: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        target_product: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        key_selling_point: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        processed_status: Option<String>,
        #[diesel(sql_type = Nullable<Timestamp>)]
        status_updated_at: Option<NaiveDateTime>,
    }

    impl Row {
        pub(super) fn into_item(self) -> Result<WorkItem, StoreError> {
            build_item(
                EntryTimestamp::from_naive_utc(self.entry_timestamp),
                [
                    self.target_trend,
                    self.brand,
                    self.target_audience,
                    self.target_product,
                    self.key_selling_point,
                ],
                self.processed_status,
                self.status_updated_at.map(|t| t.and_utc()),
            )
        }
    }

    #[derive(QueryableByName)]
    pub(super) struct Key {
        #[diesel(sql_type = Timestamp)]
        pub(super) entry_timestamp: NaiveDateTime,
    }

    pub(super) fn prepare(statement: Statement) -> BoxedSqlQuery<'static, Sqlite, SqlQuery> {
        let mut query = diesel::sql_query(statement.sql).into_boxed::<Sqlite>();
        for bind in statement.binds {
            query = match bind {
                Bind::Text(v) => query.bind::<Nullable<Text>, _>(v),
                Bind::Timestamp(ts) => query.bind::<Timestamp, _>(ts.naive_utc()),
                Bind::UpdatedAt(at) => query.bind::<Timestamp, _>(at.naive_utc()),
            };
        }
        query
    }
}

#[cfg(feature = "postgres")]
mod postgres_rows {
    use super::*;
    use diesel::pg::Pg;
    use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
    use diesel::sql_types::{Nullable, Text, Timestamptz};

    #[derive(QueryableByName)]
    pub(super) struct Row {
        #[diesel(sql_type = Timestamptz)]
        entry_timestamp: DateTime<Utc>,
        #[diesel(sql_type = Nullable<Text>)]
        target_trend: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        brand: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        target_audience: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        target_product: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        key_selling_point: Option<String>,
        #[diesel(sql_type = Nullable<Text>)]
        processed_status: Option<String>,
        #[diesel(sql_type = Nullable<Timestamptz>)]
        status_updated_at: Option<DateTime<Utc>>,
    }

    impl Row {
        pub(super) fn into_item(self) -> Result<WorkItem, StoreError> {
            build_item(
                EntryTimestamp(self.entry_timestamp),
                [
                    self.target_trend,
                    self.brand,
                    self.target_audience,
                    self.target_product,
                    self.key_selling_point,
                ],
                self.processed_status,
                self.status_updated_at,
            )
        }
    }

    #[derive(QueryableByName)]
    pub(super) struct Key {
        #[diesel(sql_type = Timestamptz)]
        pub(super) entry_timestamp: DateTime<Utc>,
    }

    pub(super) fn prepare(statement: Statement) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
        let mut query = diesel::sql_query(statement.sql).into_boxed::<Pg>();
        for bind in statement.binds {
            query = match bind {
                Bind::Text(v) => query.bind::<Nullable<Text>, _>(v),
                Bind::Timestamp(ts) => query.bind::<Timestamptz, _>(ts.into_inner()),
                Bind::UpdatedAt(at) => query.bind::<Timestamptz, _>(at),
            };
        }
        query
    }
}

/// A [`RowStore`] over a relational table reached through a [`Database`] pool.
#[derive(Clone, Debug)]
pub struct SqlRowStore {
    database: Database,
}

impl SqlRowStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    fn builder(&self) -> StatementBuilder {
        StatementBuilder::new(self.database.backend())
    }

    /// Runs write statements inside one transaction and returns the total affected row count.
    async fn execute(&self, statements: Vec<Statement>) -> Result<usize, StoreError> {
        crate::dispatch_backend!(
            self.database.backend(),
            self.execute_postgres(statements).await,
            self.execute_sqlite(statements).await
        )
    }

    /// Runs statements that yield `entry_timestamp` keys (`UPDATE ... RETURNING`)
    /// inside one transaction.
    async fn load_keys(
        &self,
        statements: Vec<Statement>,
    ) -> Result<Vec<EntryTimestamp>, StoreError> {
        crate::dispatch_backend!(
            self.database.backend(),
            self.load_keys_postgres(statements).await,
            self.load_keys_sqlite(statements).await
        )
    }

    /// Runs a `SELECT` of [`ROW_COLUMNS`].
    async fn load_rows(&self, statement: Statement) -> Result<Vec<WorkItem>, StoreError> {
        crate::dispatch_backend!(
            self.database.backend(),
            self.load_rows_postgres(statement).await,
            self.load_rows_sqlite(statement).await
        )
    }

    #[cfg(feature = "sqlite")]
    async fn execute_sqlite(&self, statements: Vec<Statement>) -> Result<usize, StoreError> {
        use diesel::connection::Connection;

        let conn = self
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        let affected = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    statements.into_iter().try_fold(0, |total, statement| {
                        Ok(total + sqlite_rows::prepare(statement).execute(conn)?)
                    })
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(affected)
    }

    #[cfg(feature = "postgres")]
    async fn execute_postgres(&self, statements: Vec<Statement>) -> Result<usize, StoreError> {
        use diesel::connection::Connection;

        let conn = self
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        let affected = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    statements.into_iter().try_fold(0, |total, statement| {
                        Ok(total + postgres_rows::prepare(statement).execute(conn)?)
                    })
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(affected)
    }

    #[cfg(feature = "sqlite")]
    async fn load_keys_sqlite(
        &self,
        statements: Vec<Statement>,
    ) -> Result<Vec<EntryTimestamp>, StoreError> {
        use diesel::connection::Connection;

        let conn = self
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        let keys: Vec<sqlite_rows::Key> = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let mut keys = Vec::new();
                    for statement in statements {
                        let chunk = sqlite_rows::prepare(statement).load::<sqlite_rows::Key>(conn)?;
                        keys.extend(chunk);
                    }
                    Ok(keys)
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(keys
            .into_iter()
            .map(|k| EntryTimestamp::from_naive_utc(k.entry_timestamp))
            .collect())
    }

    #[cfg(feature = "postgres")]
    async fn load_keys_postgres(
        &self,
        statements: Vec<Statement>,
    ) -> Result<Vec<EntryTimestamp>, StoreError> {
        use diesel::connection::Connection;

        let conn = self
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        let keys: Vec<postgres_rows::Key> = conn
            .interact(move |conn| {
                conn.transaction::<_, diesel::result::Error, _>(|conn| {
                    let mut keys = Vec::new();
                    for statement in statements {
                        let chunk = postgres_rows::prepare(statement).load::<postgres_rows::Key>(conn)?;
                        keys.extend(chunk);
                    }
                    Ok(keys)
                })
            })
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(keys
            .into_iter()
            .map(|k| EntryTimestamp(k.entry_timestamp))
            .collect())
    }

    #[cfg(feature = "sqlite")]
    async fn load_rows_sqlite(&self, statement: Statement) -> Result<Vec<WorkItem>, StoreError> {
        let conn = self
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        let rows: Vec<sqlite_rows::Row> = conn
            .interact(move |conn| sqlite_rows::prepare(statement).load(conn))
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(sqlite_rows::Row::into_item).collect()
    }

    #[cfg(feature = "postgres")]
    async fn load_rows_postgres(&self, statement: Statement) -> Result<Vec<WorkItem>, StoreError> {
        let conn = self
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        let rows: Vec<postgres_rows::Row> = conn
            .interact(move |conn| postgres_rows::prepare(statement).load(conn))
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        rows.into_iter().map(postgres_rows::Row::into_item).collect()
    }

    #[cfg(feature = "sqlite")]
    async fn record_checkpoint_sqlite(&self, row: NewCheckpointRow) -> Result<(), StoreError> {
        let conn = self
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(orchestrator_checkpoints::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }

    #[cfg(feature = "postgres")]
    async fn record_checkpoint_postgres(&self, row: NewCheckpointRow) -> Result<(), StoreError> {
        let conn = self
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| StoreError::ConnectionPool(e.to_string()))?;

        conn.interact(move |conn| {
            diesel::insert_into(orchestrator_checkpoints::table)
                .values(&row)
                .execute(conn)
        })
        .await
        .map_err(|e| StoreError::ConnectionPool(e.to_string()))??;

        Ok(())
    }
}

#[async_trait]
impl RowStore for SqlRowStore {
    async fn fetch_unclaimed(&self, table: &TableRef) -> Result<Vec<WorkItem>, StoreError> {
        let statement = self
            .builder()
            .push("SELECT ")
            .push(ROW_COLUMNS)
            .push(" FROM ")
            .push_table(table)?
            .push(" WHERE processed_status IS NULL ORDER BY entry_timestamp ASC")
            .build();
        self.load_rows(statement).await
    }

    async fn bulk_set_status(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<usize, StoreError> {
        if entry_timestamps.is_empty() {
            debug!(table = %table, %status, "Skipping status update for empty batch");
            return Ok(0);
        }
        let now = Utc::now();
        let statements = entry_timestamps
            .chunks(MAX_BINDS_PER_STATEMENT)
            .map(|chunk| {
                Ok(self
                    .builder()
                    .push("UPDATE ")
                    .push_table(table)?
                    .push(" SET processed_status = ")
                    .bind_status(Some(status))
                    .push(", status_updated_at = ")
                    .bind(Bind::UpdatedAt(now))
                    .push(" WHERE entry_timestamp IN ")
                    .bind_timestamps(chunk)
                    .build())
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.execute(statements).await
    }

    async fn claim(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        status: ProcessedStatus,
    ) -> Result<BTreeSet<EntryTimestamp>, StoreError> {
        if entry_timestamps.is_empty() {
            return Ok(BTreeSet::new());
        }
        let now = Utc::now();
        let statements = entry_timestamps
            .chunks(MAX_BINDS_PER_STATEMENT)
            .map(|chunk| {
                Ok(self
                    .builder()
                    .push("UPDATE ")
                    .push_table(table)?
                    .push(" SET processed_status = ")
                    .bind_status(Some(status))
                    .push(", status_updated_at = ")
                    .bind(Bind::UpdatedAt(now))
                    .push(" WHERE processed_status IS NULL AND entry_timestamp IN ")
                    .bind_timestamps(chunk)
                    .push(" RETURNING entry_timestamp")
                    .build())
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        Ok(self.load_keys(statements).await?.into_iter().collect())
    }

    async fn release(
        &self,
        table: &TableRef,
        entry_timestamps: &[EntryTimestamp],
        from: ProcessedStatus,
    ) -> Result<usize, StoreError> {
        if entry_timestamps.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let statements = entry_timestamps
            .chunks(MAX_BINDS_PER_STATEMENT)
            .map(|chunk| {
                Ok(self
                    .builder()
                    .push("UPDATE ")
                    .push_table(table)?
                    .push(" SET processed_status = NULL, status_updated_at = ")
                    .bind(Bind::UpdatedAt(now))
                    .push(" WHERE processed_status = ")
                    .bind_status(Some(from))
                    .push(" AND entry_timestamp IN ")
                    .bind_timestamps(chunk)
                    .build())
            })
            .collect::<Result<Vec<_>, StoreError>>()?;
        self.execute(statements).await
    }

    async fn get(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<Option<WorkItem>, StoreError> {
        let statement = self
            .builder()
            .push("SELECT ")
            .push(ROW_COLUMNS)
            .push(" FROM ")
            .push_table(table)?
            .push(" WHERE entry_timestamp = ")
            .bind(Bind::Timestamp(entry_timestamp))
            .build();
        Ok(self.load_rows(statement).await?.into_iter().next())
    }

    async fn reset_stale(
        &self,
        table: &TableRef,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<EntryTimestamp>, StoreError> {
        let statement = self
            .builder()
            .push("UPDATE ")
            .push_table(table)?
            .push(" SET processed_status = NULL, status_updated_at = ")
            .bind(Bind::UpdatedAt(Utc::now()))
            .push(" WHERE processed_status IN (")
            .bind_status(Some(ProcessedStatus::Queued))
            .push(", ")
            .bind_status(Some(ProcessedStatus::Processing))
            .push(") AND (status_updated_at IS NULL OR status_updated_at < ")
            .bind(Bind::UpdatedAt(cutoff))
            .push(") RETURNING entry_timestamp")
            .build();
        let mut reset = self.load_keys(vec![statement]).await?;
        reset.sort();
        Ok(reset)
    }

    async fn reset(
        &self,
        table: &TableRef,
        entry_timestamp: EntryTimestamp,
    ) -> Result<bool, StoreError> {
        let statement = self
            .builder()
            .push("UPDATE ")
            .push_table(table)?
            .push(" SET processed_status = NULL, status_updated_at = ")
            .bind(Bind::UpdatedAt(Utc::now()))
            .push(" WHERE entry_timestamp = ")
            .bind(Bind::Timestamp(entry_timestamp))
            .build();
        Ok(self.execute(vec![statement]).await? > 0)
    }

    async fn insert(&self, table: &TableRef, items: &[NewWorkItem]) -> Result<usize, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        let mut statements = Vec::new();
        for chunk in items.chunks(MAX_BINDS_PER_STATEMENT / INSERT_BINDS_PER_ROW) {
            let mut builder = self.builder();
            builder
                .push("INSERT INTO ")
                .push_table(table)?
                .push(
                    " (entry_timestamp, target_trend, brand, target_audience, \
                     target_product, key_selling_point) VALUES ",
                );
            for (i, item) in chunk.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                builder
                    .push("(")
                    .bind(Bind::Timestamp(item.entry_timestamp))
                    .push(", ")
                    .bind(Bind::Text(Some(item.target_trend.clone())))
                    .push(", ")
                    .bind(Bind::Text(Some(item.brand.clone())))
                    .push(", ")
                    .bind(Bind::Text(Some(item.target_audience.clone())))
                    .push(", ")
                    .bind(Bind::Text(Some(item.target_product.clone())))
                    .push(", ")
                    .bind(Bind::Text(Some(item.key_selling_point.clone())))
                    .push(")");
            }
            statements.push(builder.build());
        }
        self.execute(statements).await
    }

    async fn record_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        checkpoint.table.validate()?;
        let row = NewCheckpointRow::from(checkpoint);
        crate::dispatch_backend!(
            self.database.backend(),
            self.record_checkpoint_postgres(row).await,
            self.record_checkpoint_sqlite(row).await
        )
    }
}
