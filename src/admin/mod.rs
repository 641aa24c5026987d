//! Admin HTTP surface (spec.md §1: "out of scope... trivial reporters over
//! queue counters"). A `/health` liveness probe and a `/metrics` snapshot
//! of the [`QueueCounters`][crate::worker::QueueCounters] the worker host
//! updates as jobs complete.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::worker::QueueCounters;

#[derive(Serialize)]
struct Health {
    status: &'static str,
}

#[derive(Serialize)]
struct Metrics {
    jobs_in_flight: u64,
    jobs_succeeded: u64,
    jobs_failed: u64,
}

async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

async fn metrics(State(counters): State<Arc<QueueCounters>>) -> Json<Metrics> {
    Json(Metrics {
        jobs_in_flight: counters.jobs_in_flight.load(Ordering::Relaxed),
        jobs_succeeded: counters.jobs_succeeded.load(Ordering::Relaxed),
        jobs_failed: counters.jobs_failed.load(Ordering::Relaxed),
    })
}

pub fn router(counters: Arc<QueueCounters>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(counters)
        .layer(TraceLayer::new_for_http())
}

/// Binds `0.0.0.0:<port>` and serves until `shutdown` resolves.
pub async fn serve(
    port: u16,
    counters: Arc<QueueCounters>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, router(counters))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
