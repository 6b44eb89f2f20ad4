//! healthgrid-api — read-only HTTP surface for the check controller.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz`, `/health` | 200 if every check is ok, else 503 |
//! | GET | `/ready`, `/readyz` | Always 200 |
//! | GET | `/status` | Aggregate counts |
//! | GET | `/checks` | All checks with their status |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! Other methods get 405, unknown paths 404, and handler panics a bare 500.

pub mod handlers;
pub mod metrics;

use axum::Router;
use axum::routing::{MethodRouter, get};
use healthgrid_controller::Controller;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub controller: Controller,
}

/// Build the complete router.
pub fn build_router(controller: Controller) -> Router {
    let routes = Router::new()
        .route("/healthz", read_only(get(handlers::health)))
        .route("/health", read_only(get(handlers::health)))
        .route("/ready", read_only(get(handlers::ready)))
        .route("/readyz", read_only(get(handlers::ready)))
        .route("/status", read_only(get(handlers::status)))
        .route("/checks", read_only(get(handlers::list_checks)))
        .route("/metrics", read_only(get(handlers::prometheus_metrics)))
        .fallback(handlers::fallback)
        .with_state(ApiState { controller });

    with_layers(routes)
}

fn read_only(route: MethodRouter<ApiState>) -> MethodRouter<ApiState> {
    route.fallback(handlers::method_not_allowed)
}

fn with_layers(router: Router) -> Router {
    router
        .layer(CatchPanicLayer::custom(handlers::panic_response))
        .layer(TraceLayer::new_for_http())
}
