use std::{sync::Arc, time::Duration};

use axum::{routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, timeout::TimeoutLayer};

pub mod config;
pub mod docs;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod routes;

use crate::config::{AppConfig, HostEnvironment};
use crate::middleware::RequestLoggingOptions;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub environment: Arc<HostEnvironment>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        environment: HostEnvironment,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            environment: Arc::new(environment),
            metrics,
        }
    }
}

/// Builds the application router with request logging outermost, so the
/// completion event covers every other layer.
pub fn create_app(state: AppState) -> Router {
    let request_logging = RequestLoggingOptions {
        level: state.config.logging.request_logging.level,
    };
    let timeout = Duration::from_secs(state.config.server.timeout_seconds);

    Router::new()
        .route("/weatherforecast", get(routes::weather::weather_forecast))
        .route("/health", get(routes::health::health))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api-docs/openapi.json", get(docs::openapi_json))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    request_logging,
                    middleware::request_logging,
                ))
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new())
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}
