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

//! Implementation of the `serve` command: push endpoints for the messaging
//! layer.
//!
//! | route | body | handler |
//! |---|---|---|
//! | `POST /orchestrate` | trigger push envelope | [`Orchestrator::handle_push`] |
//! | `POST /work` | work message push envelope | [`Worker::handle_push`] |
//! | `GET /healthz` | | liveness |
//! | `GET /metrics` | | Prometheus text |
//!
//! A push subscription redelivers on any non-2xx response, so only failures
//! that a retry could fix map to `500`. Bodies that will never decode get
//! `400` and are logged.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info, warn};
use trendreel::{OrchestrationReport, Orchestrator, OrchestratorError, Worker, WorkerError};

use super::orchestrate::build_orchestrator;
use super::work::build_worker;
use super::Runtime;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder once and returns its handle.
fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;
    trendreel::metrics::register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub worker: Arc<Worker>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/orchestrate", post(orchestrate))
        .route("/work", post(work))
        .route("/healthz", get(healthz))
        .route("/metrics", get(serve_metrics))
        .with_state(state)
}

pub async fn run(runtime: Runtime, bind: Option<String>) -> Result<()> {
    let address = bind.unwrap_or_else(|| runtime.config.server.bind_address.clone());
    let address: SocketAddr = address
        .parse()
        .with_context(|| format!("Invalid bind address: '{}'", address))?;

    let state = AppState {
        orchestrator: Arc::new(build_orchestrator(
            &runtime,
            runtime.config.pipeline_config(),
        )?),
        worker: Arc::new(build_worker(&runtime)?),
        metrics: Some(init_metrics()?),
    };

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;
    Ok(())
}

async fn orchestrate(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match state.orchestrator.handle_push(&body).await {
        Ok(OrchestrationReport::Dispatched(summary)) => {
            info!(
                table = %summary.table,
                claimed = summary.claimed.len(),
                "Orchestration complete"
            );
            StatusCode::NO_CONTENT
        }
        Ok(_) => StatusCode::NO_CONTENT,
        Err(OrchestratorError::Trigger(e)) => {
            warn!(error = %e, "Rejected undecodable trigger");
            StatusCode::BAD_REQUEST
        }
        Err(e) => {
            error!(error = %e, "Orchestration failed; trigger will be redelivered");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn work(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match state.worker.handle_push(&body).await {
        Ok(_) => StatusCode::NO_CONTENT,
        Err(e) if e.is_poison() => {
            warn!(error = %e, "Rejected undecodable work message");
            StatusCode::BAD_REQUEST
        }
        Err(WorkerError::Invocation {
            entry_timestamp,
            source,
        }) => {
            error!(%entry_timestamp, error = %source, "Row failed; message will be redelivered");
            StatusCode::INTERNAL_SERVER_ERROR
        }
        Err(e) => {
            error!(error = %e, "Work message failed; message will be redelivered");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn serve_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; charset=utf-8")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [("content-type", "text/plain; charset=utf-8")],
            "Metrics not initialized".to_string(),
        ),
    }
}
