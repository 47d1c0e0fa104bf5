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

//! Work Queue stored in the `work_queue` table (transactional outbox).
//!
//! `receive` leases a message by pushing its `visible_at` into the future and
//! incrementing `delivery_attempts` inside one transaction. On PostgreSQL the
//! candidate row is selected with `FOR UPDATE SKIP LOCKED` so concurrent
//! consumers never lease the same message; SQLite serializes writers through
//! an immediate transaction instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use tracing::debug;

use super::{Delivery, MessageId, WorkDistributor, WorkQueue};
use crate::database::schema::work_queue;
use crate::database::Database;
use crate::error::QueueError;
use crate::models::WorkMessage;

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = work_queue)]
struct NewQueueRow {
    topic: String,
    payload: String,
    delivery_attempts: i32,
    visible_at: NaiveDateTime,
    dead_lettered: bool,
    dead_letter_reason: Option<String>,
    created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = work_queue)]
struct QueueRow {
    id: i64,
    topic: String,
    payload: String,
    delivery_attempts: i32,
}

impl From<QueueRow> for Delivery {
    fn from(row: QueueRow) -> Self {
        Delivery {
            id: MessageId(row.id),
            topic: row.topic,
            payload: row.payload,
            delivery_attempts: row.delivery_attempts.max(0) as u32,
        }
    }
}

fn lease_until(visibility_timeout: Duration) -> NaiveDateTime {
    let timeout = chrono::Duration::from_std(visibility_timeout)
        .unwrap_or_else(|_| chrono::Duration::days(1));
    (Utc::now() + timeout).naive_utc()
}

/// A [`WorkQueue`] backed by the database that also holds the Row Store.
#[derive(Clone, Debug)]
pub struct OutboxQueue {
    database: Database,
    distributor: Option<Arc<dyn WorkDistributor>>,
}

impl OutboxQueue {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            distributor: None,
        }
    }

    /// Wakes `distributor` after every committed publish. Consumers in other
    /// processes still rely on their poll interval.
    pub fn with_distributor(mut self, distributor: Arc<dyn WorkDistributor>) -> Self {
        self.distributor = Some(distributor);
        self
    }

    #[cfg(feature = "sqlite")]
    async fn with_sqlite<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        F: FnOnce(&mut diesel::SqliteConnection) -> Result<T, QueueError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .database
            .get_sqlite_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;
        conn.interact(f)
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?
    }

    #[cfg(feature = "postgres")]
    async fn with_postgres<T, F>(&self, f: F) -> Result<T, QueueError>
    where
        F: FnOnce(&mut diesel::PgConnection) -> Result<T, QueueError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self
            .database
            .get_postgres_connection()
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?;
        conn.interact(f)
            .await
            .map_err(|e| QueueError::ConnectionPool(e.to_string()))?
    }

    /// Number of messages on `topic` that are neither acked nor dead-lettered.
    pub async fn depth(&self, topic: &str) -> Result<i64, QueueError> {
        let topic = topic.to_string();
        crate::dispatch_backend!(
            self.database.backend(),
            self.with_postgres(move |conn| {
                Ok(work_queue::table
                    .filter(work_queue::topic.eq(topic))
                    .filter(work_queue::dead_lettered.eq(false))
                    .count()
                    .get_result(conn)?)
            })
            .await,
            self.with_sqlite(move |conn| {
                Ok(work_queue::table
                    .filter(work_queue::topic.eq(topic))
                    .filter(work_queue::dead_lettered.eq(false))
                    .count()
                    .get_result(conn)?)
            })
            .await
        )
    }
}

#[async_trait]
impl WorkQueue for OutboxQueue {
    async fn publish(&self, topic: &str, message: &WorkMessage) -> Result<MessageId, QueueError> {
        let now = Utc::now().naive_utc();
        let row = NewQueueRow {
            topic: topic.to_string(),
            payload: message.to_json()?,
            delivery_attempts: 0,
            visible_at: now,
            dead_lettered: false,
            dead_letter_reason: None,
            created_at: now,
        };

        let id: i64 = crate::dispatch_backend!(
            self.database.backend(),
            self.with_postgres(move |conn| {
                Ok(diesel::insert_into(work_queue::table)
                    .values(&row)
                    .returning(work_queue::id)
                    .get_result(conn)?)
            })
            .await?,
            self.with_sqlite(move |conn| {
                Ok(diesel::insert_into(work_queue::table)
                    .values(&row)
                    .returning(work_queue::id)
                    .get_result(conn)?)
            })
            .await?
        );

        debug!(topic, message_id = id, "Message published to outbox");
        if let Some(distributor) = &self.distributor {
            distributor.notify_work();
        }
        Ok(MessageId(id))
    }

    async fn receive(
        &self,
        topic: &str,
        visibility_timeout: Duration,
    ) -> Result<Option<Delivery>, QueueError> {
        let topic = topic.to_string();
        let until = lease_until(visibility_timeout);

        let leased: Option<QueueRow> = crate::dispatch_backend!(
            self.database.backend(),
            self.with_postgres(move |conn| {
                conn.transaction::<_, QueueError, _>(|conn| {
                    let now = Utc::now().naive_utc();
                    let candidate: Option<QueueRow> = work_queue::table
                        .filter(work_queue::topic.eq(&topic))
                        .filter(work_queue::dead_lettered.eq(false))
                        .filter(work_queue::visible_at.le(now))
                        .order((work_queue::visible_at.asc(), work_queue::id.asc()))
                        .select(QueueRow::as_select())
                        .for_update()
                        .skip_locked()
                        .first(conn)
                        .optional()?;

                    let Some(mut row) = candidate else {
                        return Ok(None);
                    };
                    diesel::update(work_queue::table.find(row.id))
                        .set((
                            work_queue::visible_at.eq(until),
                            work_queue::delivery_attempts.eq(work_queue::delivery_attempts + 1),
                        ))
                        .execute(conn)?;
                    row.delivery_attempts += 1;
                    Ok(Some(row))
                })
            })
            .await?,
            self.with_sqlite(move |conn| {
                conn.immediate_transaction::<_, QueueError, _>(|conn| {
                    let now = Utc::now().naive_utc();
                    let candidate: Option<QueueRow> = work_queue::table
                        .filter(work_queue::topic.eq(&topic))
                        .filter(work_queue::dead_lettered.eq(false))
                        .filter(work_queue::visible_at.le(now))
                        .order((work_queue::visible_at.asc(), work_queue::id.asc()))
                        .select(QueueRow::as_select())
                        .first(conn)
                        .optional()?;

                    let Some(mut row) = candidate else {
                        return Ok(None);
                    };
                    diesel::update(work_queue::table.find(row.id))
                        .set((
                            work_queue::visible_at.eq(until),
                            work_queue::delivery_attempts.eq(work_queue::delivery_attempts + 1),
                        ))
                        .execute(conn)?;
                    row.delivery_attempts += 1;
                    Ok(Some(row))
                })
            })
            .await?
        );

        Ok(leased.map(Delivery::from))
    }

    async fn ack(&self, id: MessageId) -> Result<(), QueueError> {
        let deleted: usize = crate::dispatch_backend!(
            self.database.backend(),
            self.with_postgres(move |conn| {
                Ok(diesel::delete(work_queue::table.find(id.0)).execute(conn)?)
            })
            .await?,
            self.with_sqlite(move |conn| {
                Ok(diesel::delete(work_queue::table.find(id.0)).execute(conn)?)
            })
            .await?
        );
        if deleted == 0 {
            return Err(QueueError::NotFound(id.0));
        }
        Ok(())
    }

    async fn nack(&self, id: MessageId) -> Result<(), QueueError> {
        let now = Utc::now().naive_utc();
        let updated: usize = crate::dispatch_backend!(
            self.database.backend(),
            self.with_postgres(move |conn| {
                Ok(diesel::update(work_queue::table.find(id.0))
                    .set(work_queue::visible_at.eq(now))
                    .execute(conn)?)
            })
            .await?,
            self.with_sqlite(move |conn| {
                Ok(diesel::update(work_queue::table.find(id.0))
                    .set(work_queue::visible_at.eq(now))
                    .execute(conn)?)
            })
            .await?
        );
        if updated == 0 {
            return Err(QueueError::NotFound(id.0));
        }
        Ok(())
    }

    async fn dead_letter(&self, id: MessageId, reason: &str) -> Result<(), QueueError> {
        let reason = reason.to_string();
        let updated: usize = crate::dispatch_backend!(
            self.database.backend(),
            self.with_postgres(move |conn| {
                Ok(diesel::update(work_queue::table.find(id.0))
                    .set((
                        work_queue::dead_lettered.eq(true),
                        work_queue::dead_letter_reason.eq(Some(reason)),
                    ))
                    .execute(conn)?)
            })
            .await?,
            self.with_sqlite(move |conn| {
                Ok(diesel::update(work_queue::table.find(id.0))
                    .set((
                        work_queue::dead_lettered.eq(true),
                        work_queue::dead_letter_reason.eq(Some(reason)),
                    ))
                    .execute(conn)?)
            })
            .await?
        );
        if updated == 0 {
            return Err(QueueError::NotFound(id.0));
        }
        Ok(())
    }
}
