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

//! Implementation of the `orchestrate` and `batch` commands.
//!
//! Both run one claim pass against a table. `orchestrate` follows the
//! configured dispatch mode; `batch` always processes the claimed rows in this
//! process.

use anyhow::{bail, Context, Result};
use tracing::info;
use trendreel::{
    DispatchMode, OrchestrationReport, Orchestrator, PipelineConfig, TriggerPayload,
};

use super::Runtime;

/// Where to look for rows and which agent to run.
#[derive(Debug, Clone)]
pub struct Target {
    pub dataset: Option<String>,
    pub table: Option<String>,
    pub agent_resource_id: String,
}

impl Target {
    fn payload(self, runtime: &Runtime) -> TriggerPayload {
        let table = runtime.table(self.dataset, self.table);
        TriggerPayload {
            bq_dataset: table.dataset,
            bq_table: table.table,
            agent_resource_id: self.agent_resource_id,
        }
    }
}

/// Builds an orchestrator wired for `config`'s dispatch mode.
pub fn build_orchestrator(runtime: &Runtime, config: PipelineConfig) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::new(runtime.store(), config.clone());
    Ok(match config.mode() {
        DispatchMode::TwoTier => orchestrator.with_queue(runtime.queue()),
        DispatchMode::SingleTier => orchestrator.with_invoker(runtime.invoker()?),
    })
}

/// Runs one orchestration pass. `config` overrides the configured pipeline settings.
pub async fn run(
    runtime: &Runtime,
    target: Target,
    config: Option<PipelineConfig>,
) -> Result<OrchestrationReport> {
    let config = config.unwrap_or_else(|| runtime.config.pipeline_config());
    let orchestrator = build_orchestrator(runtime, config)?;
    let payload = target.payload(runtime);

    let report = orchestrator
        .run(&payload)
        .await
        .with_context(|| {
            format!(
                "Orchestration of {}.{} failed",
                payload.bq_dataset, payload.bq_table
            )
        })?;
    print_report(&report);
    Ok(report)
}

/// Runs one single-tier pass regardless of the configured mode.
///
/// Fails when any row failed, so scripts can tell from the exit code.
pub async fn run_batch(
    runtime: &Runtime,
    target: Target,
    max_concurrent: Option<usize>,
) -> Result<()> {
    let base = runtime.config.pipeline_config();
    let config = PipelineConfig::builder()
        .mode(DispatchMode::SingleTier)
        .max_concurrent_rows(max_concurrent.unwrap_or(base.max_concurrent_rows()))
        .invocation_timeout(base.invocation_timeout())
        .caller_id_prefix(base.caller_id_prefix())
        .worker_topic(base.worker_topic())
        .record_checkpoints(base.record_checkpoints())
        .build();

    let report = run(runtime, target, Some(config)).await?;
    if let OrchestrationReport::Dispatched(summary) = &report {
        if let Some(batch) = summary.batch.as_ref().filter(|b| !b.failed.is_empty()) {
            bail!(
                "{} of {} row(s) failed and were marked FAILED",
                batch.failed.len(),
                batch.len()
            );
        }
    }
    Ok(())
}

fn print_report(report: &OrchestrationReport) {
    match report {
        OrchestrationReport::Ignored { missing } => {
            info!(?missing, "Trigger ignored");
        }
        OrchestrationReport::NoWork { table } => {
            info!("No unclaimed rows in {}", table);
        }
        OrchestrationReport::Dispatched(summary) => {
            info!(
                "Claimed {} of {} row(s) in {} ({} mode, {} lost to concurrent runs)",
                summary.claimed.len(),
                summary.rows_seen,
                summary.table,
                summary.mode,
                summary.lost_races
            );
            if !summary.published.is_empty() {
                info!("Published {} work message(s)", summary.published.len());
            }
            if let Some(batch) = &summary.batch {
                info!(
                    "Processed {} row(s), {} failed",
                    batch.succeeded.len(),
                    batch.failed.len()
                );
            }
        }
    }
}
