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

//! Wake-up signalling for queue consumers.
//!
//! Neither backend pushes new messages to consumers, so a consumer that found
//! the queue empty parks on a [`WorkDistributor`] until it is worth looking
//! again. A queue built with a distributor wakes it after every publish, so
//! consumers in the same process start on new work without waiting out the
//! poll interval.
//!
//! # Example
//!
//! ```rust,ignore
//! use trendreel::queue::{PollingDistributor, WorkDistributor};
//!
//! let distributor = PollingDistributor::with_poll_interval(Duration::from_millis(250));
//!
//! loop {
//!     distributor.wait_for_work().await;
//!     if let Some(delivery) = queue.receive(topic, visibility).await? {
//!         // handle delivery
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::debug;

/// Abstracts how a consumer waits for new work.
#[async_trait]
pub trait WorkDistributor: Send + Sync + std::fmt::Debug {
    /// Waits until work might be available, or until shutdown.
    ///
    /// The caller should attempt to receive after this returns and cope with
    /// finding nothing.
    async fn wait_for_work(&self);

    /// Wakes one waiter early after a local publish. If nobody is waiting,
    /// the next `wait_for_work` returns immediately instead.
    fn notify_work(&self);

    /// Signals that waiters should stop; `wait_for_work` returns promptly afterwards.
    fn shutdown(&self);

    fn is_shutdown(&self) -> bool;
}

/// Distributor that polls at a fixed interval.
#[derive(Debug, Clone)]
pub struct PollingDistributor {
    poll_interval: Duration,
    shutdown: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl PollingDistributor {
    const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub fn new() -> Self {
        Self::with_poll_interval(Self::DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            shutdown: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

impl Default for PollingDistributor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkDistributor for PollingDistributor {
    async fn wait_for_work(&self) {
        if self.is_shutdown() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {
                debug!("Poll interval elapsed");
            }
            _ = self.notify.notified() => {
                debug!("Distributor woken");
            }
        }
    }

    fn notify_work(&self) {
        self.notify.notify_one();
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
