use anyhow::{Context, Result};
use axum::{extract::State, http::StatusCode};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::AppState;

/// Installs the global Prometheus recorder; rendered by [`metrics_handler`].
pub fn install_recorder() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")
}

pub fn record_request(method: &str, status_code: u16, latency_seconds: f64) {
    counter!(
        "http_requests_total",
        "method" => method.to_string(),
        "status" => status_code.to_string()
    )
    .increment(1);
    histogram!("http_request_duration_seconds").record(latency_seconds);
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::NOT_FOUND)
}
