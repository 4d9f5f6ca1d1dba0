use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::Router;

use crate::config::Config;
use crate::middleware::gate::{self, Gate};
use crate::middleware::matcher::RouteMatcher;
use crate::middleware::metrics;
use crate::proxy::handler::{proxy_handler, MAX_BODY_BYTES};
use crate::proxy::upstream::UpstreamClient;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub config: Config,
    pub gate: Gate,
    pub matcher: RouteMatcher,
    pub upstream: UpstreamClient,
}

impl AppState {
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let gate = Gate::from_config(&config);
        Self::with_gate(config, gate)
    }

    /// State around a pre-built gate, e.g. one with a custom verifier.
    pub fn with_gate(config: Config, gate: Gate) -> anyhow::Result<Self> {
        let matcher = RouteMatcher::new(&config.excluded_paths)?;
        let upstream = UpstreamClient::new(
            &config.upstream_url,
            Duration::from_secs(config.upstream_timeout_secs),
        )?;
        Ok(Self {
            config,
            gate,
            matcher,
            upstream,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health endpoints (never gated)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(|| async { "ok" }))
        .route("/metrics", get(metrics_handler))
        .fallback(any(proxy_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            gate::enforce,
        ))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        metrics::encode_metrics(),
    )
}

/// Middleware: echoes the caller's `x-request-id` or mints a fresh one, so
/// redirects and proxied pages can be correlated with gate logs.
async fn request_id_middleware(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = req
        .headers()
        .get("x-request-id")
        .filter(|v| !v.is_empty() && v.len() <= 128)
        .cloned()
        .or_else(|| HeaderValue::from_str(&uuid::Uuid::new_v4().to_string()).ok());

    if let Some(id) = &req_id {
        req.headers_mut().insert("x-request-id", id.clone());
    }
    let mut resp = next.run(req).await;
    if let Some(id) = req_id {
        resp.headers_mut().insert("x-request-id", id);
    }
    resp
}
