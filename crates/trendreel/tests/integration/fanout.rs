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

use std::collections::BTreeSet;
use std::time::Duration;

use trendreel::{FanOut, PipelineConfig, RowStore, WorkItem};

use crate::fixtures::{seed, table, ScriptedInvoker, TestDatabase};

async fn seeded_rows(trends: &[&str]) -> (TestDatabase, Vec<WorkItem>) {
    let db = TestDatabase::new().await;
    let store = db.store();
    seed(store.as_ref(), trends).await;
    let rows = store.fetch_unclaimed(&table()).await.unwrap();
    (db, rows)
}

#[tokio::test]
async fn test_batch_partitions_every_row() {
    let (_db, rows) = seeded_rows(&["a", "fail-b", "c", "fail-d", "e"]).await;
    let fanout = FanOut::new(ScriptedInvoker::new(), PipelineConfig::default());

    let batch = fanout.run(&rows, "agent-7").await;

    assert_eq!(batch.succeeded.len(), 3);
    assert_eq!(batch.failed.len(), 2);
    assert!(batch.succeeded.is_disjoint(&batch.failed));
    let all: BTreeSet<_> = batch.succeeded.union(&batch.failed).copied().collect();
    let input: BTreeSet<_> = rows.iter().map(|r| r.entry_timestamp).collect();
    assert_eq!(all, input);
    for row in rows.iter().filter(|r| r.target_trend.starts_with("fail")) {
        assert!(batch.failed.contains(&row.entry_timestamp));
    }
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let trends: Vec<String> = (0..10).map(|i| format!("slow {i}")).collect();
    let trends: Vec<&str> = trends.iter().map(String::as_str).collect();
    let (_db, rows) = seeded_rows(&trends).await;
    let invoker = ScriptedInvoker::with_delay(Duration::from_millis(30));
    let config = PipelineConfig::builder().max_concurrent_rows(3).build();

    let batch = FanOut::new(invoker.clone(), config).run(&rows, "agent-7").await;

    assert_eq!(batch.succeeded.len(), 10);
    assert_eq!(invoker.calls().len(), 10);
    assert!(invoker.peak_concurrency() <= 3);
    assert!(invoker.peak_concurrency() >= 2);
}

#[tokio::test]
async fn test_timed_out_rows_fail_without_stalling_the_batch() {
    let (_db, rows) = seeded_rows(&["slow a", "b", "c"]).await;
    let invoker = ScriptedInvoker::with_delay(Duration::from_secs(10));
    let config = PipelineConfig::builder()
        .invocation_timeout(Some(Duration::from_millis(100)))
        .build();

    let started = std::time::Instant::now();
    let batch = FanOut::new(invoker, config).run(&rows, "agent-7").await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(batch.failed_vec(), vec![rows[0].entry_timestamp]);
    assert_eq!(batch.succeeded.len(), 2);
}

#[tokio::test]
async fn test_empty_batch() {
    let fanout = FanOut::new(ScriptedInvoker::new(), PipelineConfig::default());
    let batch = fanout.run(&[], "agent-7").await;
    assert!(batch.is_empty());
}
