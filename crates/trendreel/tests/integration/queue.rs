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

//! Outbox-backed Work Queue semantics.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use trendreel::{MessageId, OutboxQueue, QueueError, RowStore, WorkMessage, WorkQueue};

use crate::fixtures::{seed, table, TestDatabase, TOPIC};

async fn messages(db: &TestDatabase, trends: &[&str]) -> Vec<WorkMessage> {
    let store = db.store();
    seed(store.as_ref(), trends).await;
    store
        .fetch_unclaimed(&table())
        .await
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, row)| WorkMessage::from_item(&table(), "agent", row, i))
        .collect()
}

#[tokio::test]
async fn test_publish_receive_ack() {
    let db = TestDatabase::new().await;
    let queue = OutboxQueue::new(db.database.clone());
    let message = messages(&db, &["a"]).await.remove(0);

    let id = queue.publish(TOPIC, &message).await.unwrap();
    assert_eq!(queue.depth(TOPIC).await.unwrap(), 1);

    let delivery = queue
        .receive(TOPIC, Duration::from_secs(60))
        .await
        .unwrap()
        .expect("message should be visible");
    assert_eq!(delivery.id, id);
    assert_eq!(delivery.delivery_attempts, 1);
    assert_eq!(delivery.decode().unwrap(), message);

    queue.ack(id).await.unwrap();
    assert_eq!(queue.depth(TOPIC).await.unwrap(), 0);
    assert!(matches!(queue.ack(id).await, Err(QueueError::NotFound(_))));
}

#[tokio::test]
async fn test_unacked_message_is_redelivered_after_visibility_timeout() {
    let db = TestDatabase::new().await;
    let queue = OutboxQueue::new(db.database.clone());
    let message = messages(&db, &["a"]).await.remove(0);
    let id = queue.publish(TOPIC, &message).await.unwrap();

    queue
        .receive(TOPIC, Duration::from_millis(50))
        .await
        .unwrap()
        .unwrap();
    assert!(queue
        .receive(TOPIC, Duration::from_millis(50))
        .await
        .unwrap()
        .is_none());

    tokio::time::sleep(Duration::from_millis(120)).await;
    let again = queue
        .receive(TOPIC, Duration::from_secs(60))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.delivery_attempts, 2);
}

#[tokio::test]
async fn test_nack_makes_message_visible_immediately() {
    let db = TestDatabase::new().await;
    let queue = OutboxQueue::new(db.database.clone());
    let message = messages(&db, &["a"]).await.remove(0);
    let id = queue.publish(TOPIC, &message).await.unwrap();

    queue
        .receive(TOPIC, Duration::from_secs(600))
        .await
        .unwrap()
        .unwrap();
    queue.nack(id).await.unwrap();

    let again = queue
        .receive(TOPIC, Duration::from_secs(600))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again.id, id);
}

#[tokio::test]
async fn test_dead_lettered_message_is_never_delivered() {
    let db = TestDatabase::new().await;
    let queue = OutboxQueue::new(db.database.clone());
    let message = messages(&db, &["a"]).await.remove(0);
    let id = queue.publish(TOPIC, &message).await.unwrap();

    queue.dead_letter(id, "exhausted").await.unwrap();

    assert!(queue
        .receive(TOPIC, Duration::from_secs(60))
        .await
        .unwrap()
        .is_none());
    assert_eq!(queue.depth(TOPIC).await.unwrap(), 0);
    assert!(matches!(
        queue.dead_letter(MessageId(9_999), "missing").await,
        Err(QueueError::NotFound(9_999))
    ));
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let db = TestDatabase::new().await;
    let queue = OutboxQueue::new(db.database.clone());
    let message = messages(&db, &["a"]).await.remove(0);
    queue.publish("other-topic", &message).await.unwrap();

    assert!(queue
        .receive(TOPIC, Duration::from_secs(60))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_concurrent_consumers_never_share_a_lease() {
    let db = TestDatabase::new().await;
    let queue = Arc::new(OutboxQueue::new(db.database.clone()));
    for message in messages(&db, &["a", "b", "c", "d", "e", "f"]).await {
        queue.publish(TOPIC, &message).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..3 {
        let queue = Arc::clone(&queue);
        handles.push(tokio::spawn(async move {
            let mut leased = Vec::new();
            while let Some(delivery) = queue
                .receive(TOPIC, Duration::from_secs(60))
                .await
                .unwrap()
            {
                leased.push(delivery.id);
            }
            leased
        }));
    }

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            seen.insert(id);
            total += 1;
        }
    }
    assert_eq!(total, 6);
    assert_eq!(seen.len(), 6);
}
