use std::{
    convert::Infallible,
    sync::{Arc, Mutex, PoisonError},
    time::Instant,
};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, Method},
    middleware::Next,
    response::Response,
};
use serde_json::{Map, Value};
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::logging::Severity;

/// Per-request property bag merged into the request-completion event.
///
/// Handlers receive it as an extractor; outside the request-logging
/// middleware they get a detached, empty context.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticContext {
    properties: Arc<Mutex<Map<String, Value>>>,
}

impl DiagnosticContext {
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    pub fn snapshot(&self) -> Map<String, Value> {
        self.properties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for DiagnosticContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<DiagnosticContext>()
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RequestLoggingOptions {
    /// Fixed level for every completion event.
    pub level: Severity,
}

impl Default for RequestLoggingOptions {
    fn default() -> Self {
        Self {
            level: Severity::Debug,
        }
    }
}

/// Logs one completion event per request, carrying the request's
/// diagnostic context plus `RequestHost` and `RequestScheme`.
pub async fn request_logging(
    State(options): State<RequestLoggingOptions>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let host = request_host(&request);
    let scheme = request.uri().scheme_str().unwrap_or("http").to_string();

    let diagnostics = DiagnosticContext::default();
    request.extensions_mut().insert(diagnostics.clone());

    let span = info_span!("request", RequestId = %Uuid::new_v4(), RequestPath = %path);
    let response = next.run(request).instrument(span.clone()).await;

    let elapsed = start.elapsed();
    let status = response.status().as_u16();

    diagnostics.set("RequestHost", host);
    diagnostics.set("RequestScheme", scheme);
    let properties = Value::Object(diagnostics.snapshot());

    span.in_scope(|| {
        emit_completion(
            options.level,
            &method,
            &path,
            status,
            elapsed.as_secs_f64() * 1000.0,
            &properties,
        )
    });

    crate::metrics::record_request(method.as_str(), status, elapsed.as_secs_f64());

    response
}

fn request_host(request: &Request) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()))
        .unwrap_or_default()
        .to_string()
}

fn emit_completion(
    level: Severity,
    method: &Method,
    path: &str,
    status: u16,
    elapsed_ms: f64,
    properties: &Value,
) {
    macro_rules! completion {
        ($level:expr) => {
            tracing::event!(
                $level,
                RequestMethod = %method,
                RequestPath = %path,
                StatusCode = status,
                Elapsed = elapsed_ms,
                diagnostic_context = %properties,
                "HTTP {} {} responded {} in {:.4} ms",
                method,
                path,
                status,
                elapsed_ms
            )
        };
    }

    match level {
        Severity::Verbose => completion!(tracing::Level::TRACE),
        Severity::Debug => completion!(tracing::Level::DEBUG),
        Severity::Information => completion!(tracing::Level::INFO),
        Severity::Warning => completion!(tracing::Level::WARN),
        Severity::Error => completion!(tracing::Level::ERROR),
        Severity::Fatal => crate::fatal!(
            RequestMethod = %method,
            RequestPath = %path,
            StatusCode = status,
            Elapsed = elapsed_ms,
            diagnostic_context = %properties,
            "HTTP {} {} responded {} in {:.4} ms",
            method,
            path,
            status,
            elapsed_ms
        ),
    }
}
