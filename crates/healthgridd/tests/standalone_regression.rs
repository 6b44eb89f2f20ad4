//! Standalone regression tests.
//!
//! Wires the in-memory backend, executor, controller and router the way
//! the daemon does, then drives the HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use healthgrid_api::build_router;
use healthgrid_controller::Controller;
use healthgrid_executor::{ExecutorConfig, MemoryBackend, PodExecutor, UnitBehavior};
use healthgrid_model::{CheckState, HealthCheck};
use tower::ServiceExt;

fn stack(backend: Arc<MemoryBackend>) -> Controller {
    let executor = PodExecutor::with_config(
        backend,
        ExecutorConfig {
            poll_interval: Duration::from_millis(10),
        },
    );
    Controller::new(Arc::new(executor))
}

async fn get(router: Router, uri: &str) -> (StatusCode, String) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn wait_settled(controller: &Controller) {
    for _ in 0..300 {
        let checks = controller.list().await;
        if checks
            .iter()
            .all(|c| matches!(c.status.state, CheckState::Completed | CheckState::Failed))
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("checks did not settle");
}

#[tokio::test]
async fn standalone_empty_registry_is_healthy() {
    let controller = stack(Arc::new(MemoryBackend::new()));
    let router = build_router(controller);

    let (status, body) = get(router.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"healthy\""));

    let (status, body) = get(router, "/status").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["healthy"], true);
    assert_eq!(json["totalChecks"], 0);
    assert_eq!(json["failingChecks"], 0);
}

#[tokio::test]
async fn standalone_passing_checks_report_healthy() {
    let backend = Arc::new(MemoryBackend::new());
    let controller = stack(backend.clone());
    controller
        .register(HealthCheck::new("dns-check", "default", 60, 30))
        .await
        .unwrap();
    controller
        .register(HealthCheck::new("pod-deployment-check", "default", 120, 60))
        .await
        .unwrap();
    wait_settled(&controller).await;

    let router = build_router(controller.clone());
    let (status, _) = get(router.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = get(router.clone(), "/checks").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["count"], 2);
    assert_eq!(json["checks"][0]["name"], "dns-check");
    assert_eq!(json["checks"][0]["status"]["state"], "COMPLETED");

    let (_, metrics) = get(router, "/metrics").await;
    assert!(metrics.contains("healthgrid_check_total 2"));
    assert!(metrics.contains("healthgrid_check_ok{check=\"dns-check\"} 1"));

    assert_eq!(backend.created_units().len(), 2);
    assert!(backend.live_units().is_empty());
    controller.shutdown().await;
}

#[tokio::test]
async fn standalone_failing_check_reports_unhealthy() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set_behavior("broken", UnitBehavior::fail("exit 1"));
    let controller = stack(backend);
    controller
        .register(HealthCheck::new("ok", "default", 3600, 5))
        .await
        .unwrap();
    controller
        .register(HealthCheck::new("broken", "default", 3600, 5))
        .await
        .unwrap();
    wait_settled(&controller).await;

    let router = build_router(controller.clone());
    let (status, body) = get(router.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body.contains("\"unhealthy\""));

    let (_, body) = get(router.clone(), "/status").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["healthy"], false);
    assert_eq!(json["failingChecks"], 1);

    let (_, metrics) = get(router.clone(), "/metrics").await;
    assert!(metrics.contains("healthgrid_check_ok{check=\"broken\"} 0"));
    assert!(metrics.contains("healthgrid_check_failures{check=\"broken\"} 1"));

    let (_, body) = get(router, "/checks").await;
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    let broken = &json["checks"][0];
    assert_eq!(broken["name"], "broken");
    assert_eq!(broken["status"]["errors"][0], "Check unit failed with phase: Failed");
    assert_eq!(broken["status"]["errors"][1], "Check unit logs: exit 1");
    controller.shutdown().await;
}

#[tokio::test]
async fn standalone_readiness_and_errors() {
    let router = build_router(stack(Arc::new(MemoryBackend::new())));

    let (status, body) = get(router.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"ready\""));

    let (status, body) = get(router.clone(), "/api/v1/deployments").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Not Found");

    let req = Request::builder()
        .method("PUT")
        .uri("/checks")
        .body(Body::empty())
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn standalone_shutdown_cleans_up_hung_units() {
    let backend = Arc::new(MemoryBackend::with_default(UnitBehavior::hang()));
    let controller = stack(backend.clone());
    controller
        .register(HealthCheck::new("stuck", "default", 3600, 60))
        .await
        .unwrap();

    while backend.created_units().is_empty() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    controller.shutdown().await;

    assert!(backend.live_units().is_empty());
    let check = controller.get("stuck").await.unwrap();
    assert_eq!(check.status.state, CheckState::Failed);
    assert_eq!(check.status.errors, vec!["Check cancelled before completion"]);
}
