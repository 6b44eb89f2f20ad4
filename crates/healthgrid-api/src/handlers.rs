//! HTTP handlers.
//!
//! Every handler only reads controller state. Response bodies are JSON
//! except `/metrics`; failures never carry internal detail.

use std::any::Any;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use healthgrid_model::HealthCheck;
use serde::Serialize;
use tracing::error;

use crate::ApiState;

const INTERNAL_ERROR: &str = "Internal server error";

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => (status, [(CONTENT_TYPE, "application/json")], bytes).into_response(),
        Err(e) => {
            error!(error = %e, "failed to serialize response body");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR).into_response()
}

#[derive(Serialize)]
struct ProbeBody {
    status: &'static str,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusBody {
    healthy: bool,
    total_checks: usize,
    failing_checks: usize,
    timestamp: i64,
}

#[derive(Serialize)]
struct ChecksBody {
    checks: Vec<HealthCheck>,
    count: usize,
}

// ── Probes ─────────────────────────────────────────────────────

/// GET /healthz, /health
pub async fn health(State(state): State<ApiState>) -> Response {
    let (code, status) = if state.controller.is_healthy().await {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };
    json_response(
        code,
        &ProbeBody {
            status,
            timestamp: now_millis(),
        },
    )
}

/// GET /ready, /readyz
pub async fn ready() -> Response {
    json_response(
        StatusCode::OK,
        &ProbeBody {
            status: "ready",
            timestamp: now_millis(),
        },
    )
}

// ── Registry views ─────────────────────────────────────────────

/// GET /status
pub async fn status(State(state): State<ApiState>) -> Response {
    let checks = state.controller.list().await;
    let failing = checks.iter().filter(|c| !c.status.ok).count();
    json_response(
        StatusCode::OK,
        &StatusBody {
            healthy: failing == 0,
            total_checks: checks.len(),
            failing_checks: failing,
            timestamp: now_millis(),
        },
    )
}

/// GET /checks
pub async fn list_checks(State(state): State<ApiState>) -> Response {
    let checks = state.controller.list().await;
    let count = checks.len();
    json_response(StatusCode::OK, &ChecksBody { checks, count })
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let checks = state.controller.list().await;
    let body = crate::metrics::render_prometheus(&checks);
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

// ── Fallbacks ──────────────────────────────────────────────────

/// Any non-GET method on a known path.
pub async fn method_not_allowed() -> Response {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed").into_response()
}

/// Unknown paths.
pub async fn fallback(method: Method) -> Response {
    if method == Method::GET || method == Method::HEAD {
        (StatusCode::NOT_FOUND, "Not Found").into_response()
    } else {
        method_not_allowed().await
    }
}

/// Response for a handler panic.
pub fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    error!("request handler panicked");
    internal_error()
}
