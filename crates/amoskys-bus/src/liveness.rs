//! The bus's observability surface (§6.7): `/healthz` for a liveness
//! probe and `/metrics` for a Prometheus scrape. Deliberately separate
//! from the mTLS-framed ingest path — this is plain HTTP on its own
//! port, since an orchestrator's probe has no business through the
//! agent trust map.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::Encoder;

use crate::admission::AdmissionPipeline;
use crate::metrics::BusMetrics;

#[derive(Clone)]
pub struct LivenessState {
    pub metrics: Arc<BusMetrics>,
    pub pipeline: Arc<AdmissionPipeline>,
}

pub fn router(state: LivenessState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn healthz(State(state): State<LivenessState>) -> impl IntoResponse {
    // Liveness, not readiness: the process is up and able to report its
    // own in-flight count. It does not imply storage or TLS are healthy.
    let inflight = state.pipeline.inflight();
    (StatusCode::OK, format!("ok inflight={inflight}\n"))
}

async fn metrics(State(state): State<LivenessState>) -> impl IntoResponse {
    let metric_families = state.metrics.registry.gather();
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response();
    }
    (StatusCode::OK, buffer).into_response()
}
