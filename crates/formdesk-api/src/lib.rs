//! # Formdesk HTTP Service
//!
//! HTTP server that receives form-provider entry notifications and runs
//! them through the [`EntryPipeline`].
//!
//! This service provides:
//! - the entry endpoint, `POST <endpoint_path>/<form-hash>`
//! - a liveness endpoint, `GET /health`
//! - Prometheus metrics, `GET /metrics`

pub mod config;
pub mod errors;
pub mod metrics;

pub use config::{
    LoggingConfig, ServerConfig, ServiceConfig, TemplatesConfig, TicketingConfig, WebhookConfig,
};
pub use errors::{ConfigError, EntryHandlerError, ServiceError};
pub use metrics::ServiceMetrics;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header::CONTENT_TYPE, HeaderMap, HeaderValue, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use bytes::Bytes;
use formdesk_core::{EntryPipeline, Parameters, Submission};
use serde::Serialize;
use std::future::{Future, IntoFuture};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Content type of successful entry responses.
pub const XML_CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

/// Response header carrying the number of requests that failed to dispatch.
pub const DISPATCH_FAILURES_HEADER: &str = "x-dispatch-failures";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Correlation id of the current request, set by the logging middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// Id as received in `x-correlation-id`, or the generated one
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration for the service
    pub config: ServiceConfig,

    /// Transform-and-dispatch pipeline
    pub pipeline: Arc<EntryPipeline>,

    /// Metrics collector for observability
    pub metrics: Arc<ServiceMetrics>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: ServiceConfig,
        pipeline: Arc<EntryPipeline>,
        metrics: Arc<ServiceMetrics>,
    ) -> Self {
        Self {
            config,
            pipeline,
            metrics,
        }
    }
}

// ============================================================================
// HTTP Server
// ============================================================================

/// Create HTTP router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let prefix = state.config.webhook.endpoint_prefix();
    let (bare_route, hash_route) = if prefix.is_empty() {
        ("/".to_string(), "/{*hash}".to_string())
    } else {
        (prefix.to_string(), format!("{prefix}/{{*hash}}"))
    };

    let entry_routes = Router::new()
        .route(&bare_route, post(handle_entry))
        .route(&hash_route, post(handle_entry));

    let observability_routes = Router::new()
        .route("/health", get(handle_health_check))
        .route("/metrics", get(metrics_endpoint));

    let body_limit = state.config.server.max_body_size;

    Router::new()
        .merge(entry_routes)
        .merge(observability_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn(request_logging_middleware))
                .layer(DefaultBodyLimit::max(body_limit))
                .into_inner(),
        )
        .with_state(state)
}

/// Start HTTP server
pub async fn start_server(
    config: ServiceConfig,
    pipeline: EntryPipeline,
) -> Result<(), ServiceError> {
    let metrics = ServiceMetrics::new().map_err(|e| {
        ServiceError::Configuration(ConfigError::Invalid {
            message: format!("Failed to initialize metrics: {}", e),
        })
    })?;

    if !pipeline.verifier().is_enforced() {
        warn!(
            "webhook.handshake_key is not set; entries will be accepted without \
             authentication"
        );
    }

    let address = format!("{}:{}", config.server.host, config.server.port);
    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);

    let state = AppState::new(config, Arc::new(pipeline), metrics);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|e| ServiceError::BindFailed {
            address: address.clone(),
            message: e.to_string(),
        })?;

    info!("Starting HTTP server on {}", address);

    serve_until(listener, app, shutdown_signal(), shutdown_timeout).await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Serve `app` until `signal` resolves, then drain in-flight requests.
///
/// Requests still running `shutdown_timeout` after the signal are abandoned.
async fn serve_until<F>(
    listener: tokio::net::TcpListener,
    app: Router,
    signal: F,
    shutdown_timeout: Duration,
) -> Result<(), ServiceError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (signalled_tx, mut signalled_rx) = watch::channel(false);
    let graceful = async move {
        signal.await;
        let _ = signalled_tx.send(true);
    };

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(graceful)
        .into_future();
    tokio::pin!(server);

    let deadline = async move {
        if signalled_rx.wait_for(|signalled| *signalled).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(shutdown_timeout).await;
    };

    tokio::select! {
        result = &mut server => result.map_err(|e| ServiceError::ServerFailed {
            message: e.to_string(),
        }),
        _ = deadline => {
            warn!(
                timeout_seconds = shutdown_timeout.as_secs(),
                "Graceful shutdown timed out; abandoning in-flight requests"
            );
            Ok(())
        }
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT (Ctrl+C), initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

// ============================================================================
// Entry Handler
// ============================================================================

/// Handle one form entry notification
///
/// Parameters are read from the query string and, for form-encoded bodies,
/// from the body. The form hash is the request path below the endpoint
/// prefix with every `/` removed.
///
/// On success the response is the rendered request set as XML. Dispatch
/// failures are reported in the `x-dispatch-failures` header; they only fail
/// the request when `ticketing.fail_on_dispatch_error` is set.
#[instrument(
    skip(state, correlation_id, headers, body),
    fields(path = %uri.path(), correlation_id)
)]
pub async fn handle_entry(
    State(state): State<AppState>,
    correlation_id: Option<Extension<CorrelationId>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, EntryHandlerError> {
    let start = Instant::now();
    state.metrics.entries_received_total.inc();
    if let Some(Extension(id)) = &correlation_id {
        tracing::Span::current().record("correlation_id", id.as_str());
    }

    let raw_path = uri
        .path()
        .strip_prefix(state.config.webhook.endpoint_prefix())
        .unwrap_or_default();
    let hash_path = urlencoding::decode(raw_path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| raw_path.to_string());

    let form_body: &[u8] = if is_form_body(&headers) { &body } else { &[] };
    let params = Parameters::from_query_and_form(uri.query(), form_body);
    let submission = Submission::new(hash_path, params);

    let output = match state.pipeline.process(&submission).await {
        Ok(output) => output,
        Err(e) => {
            let error = EntryHandlerError::from(e);
            state.metrics.record_rejection(error.status_code().as_u16());
            return Err(error);
        }
    };

    state
        .metrics
        .record_dispatch(&output.report, start.elapsed());

    let failed = output.report.failed_count();
    if !output.report.is_complete_success() && state.config.ticketing.fail_on_dispatch_error {
        let error = EntryHandlerError::DispatchFailed {
            failed,
            total: output.report.len(),
            rendered: output.rendered,
        };
        state.metrics.record_rejection(error.status_code().as_u16());
        return Err(error);
    }

    info!(
        form_hash = %output.request_set.hash,
        entry_id = %output.request_set.entry_id,
        requests = output.request_set.len(),
        dispatch_failures = failed,
        duration_ms = %start.elapsed().as_millis(),
        "Entry processed"
    );

    let mut response = (StatusCode::OK, output.rendered).into_response();
    let response_headers = response.headers_mut();
    response_headers.insert(CONTENT_TYPE, HeaderValue::from_static(XML_CONTENT_TYPE));
    response_headers.insert(DISPATCH_FAILURES_HEADER, HeaderValue::from(failed));
    Ok(response)
}

/// Check whether the body carries form-encoded parameters.
///
/// A missing content type is treated as form-encoded.
fn is_form_body(headers: &HeaderMap) -> bool {
    match headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        None => true,
        Some(value) => value
            .split(';')
            .next()
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE)),
    }
}

// ============================================================================
// Observability Handlers
// ============================================================================

/// Liveness check endpoint
#[instrument(skip_all)]
async fn handle_health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        authenticated: state.pipeline.verifier().is_enforced(),
    })
}

/// Prometheus metrics endpoint
#[instrument(skip_all)]
async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    state
        .metrics
        .render()
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

// ============================================================================
// Middleware
// ============================================================================

/// Request logging middleware with correlation ID tracking
#[instrument(skip(request, next), fields(
    method = %request.method(),
    uri = %request.uri(),
    correlation_id
))]
async fn request_logging_middleware(
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().path().to_string();
    let start = Instant::now();

    let correlation_id = request
        .headers()
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    tracing::Span::current().record("correlation_id", correlation_id.as_str());
    request
        .extensions_mut()
        .insert(CorrelationId(correlation_id.clone()));

    let mut response = next.run(request).await;
    let duration = start.elapsed();

    if let Ok(header_value) = correlation_id.parse() {
        response
            .headers_mut()
            .insert("x-correlation-id", header_value);
    }

    let status = response.status();
    if status.is_server_error() {
        error!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed with client error"
        );
    } else {
        info!(
            method = %method,
            uri = %uri,
            status = %status,
            duration_ms = %duration.as_millis(),
            "Request completed"
        );
    }

    response
}

// ============================================================================
// Response Types
// ============================================================================

/// Liveness response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    /// Whether inbound entries must carry a handshake key
    pub authenticated: bool,
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
