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

//! Implementation of the `work` command.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use trendreel::{PollingDistributor, QueueConsumer, Worker};

use super::Runtime;

/// Builds the worker shared by the queue consumer and the `/work` endpoint.
pub fn build_worker(runtime: &Runtime) -> Result<Worker> {
    Ok(Worker::new(
        runtime.store(),
        runtime.invoker()?,
        runtime.config.pipeline_config(),
    ))
}

/// Consumes the configured topic until Ctrl-C, or handles one message with `once`.
pub async fn run(runtime: &Runtime, once: bool) -> Result<()> {
    let consumer = Arc::new(QueueConsumer::new(
        runtime.queue(),
        Arc::new(build_worker(runtime)?),
        Arc::new(PollingDistributor::with_poll_interval(
            runtime.config.poll_interval(),
        )),
        runtime.config.consumer_config(),
    ));

    if once {
        match consumer.poll_once().await.context("Queue operation failed")? {
            Some(outcome) => info!(?outcome, "Message settled"),
            None => info!("No visible messages on {}", consumer.config().topic),
        }
        return Ok(());
    }

    let handle = tokio::spawn({
        let consumer = Arc::clone(&consumer);
        async move { consumer.run().await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down; waiting for the in-flight message to settle");
    consumer.shutdown();
    handle.await.context("Consumer task panicked")?;
    Ok(())
}
