//! Axum HTTP and WebSocket edge for the fleet dispatch backbone.
//!
//! Mounts a `ServiceContext`'s edge surface: JSON mutation endpoints for
//! waypoints and trucks, and a WebSocket endpoint per collection kind that
//! doubles as the initial-snapshot + change-relay and the session tunnel a
//! `ConsumerApi` in network mode dials into.

#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use dispatch_core::ServiceContext;
use tower_http::trace::TraceLayer;

mod error;
mod handlers;
mod state;
mod ws;

pub use state::AppState;

/// Build the full `/api/{tid}/...` router over `ctx`.
pub fn router(ctx: Arc<ServiceContext>) -> Router {
    let state = AppState::new(ctx);

    Router::new()
        .route("/api/{tid}/waypoint", get(ws::waypoint_ws))
        .route("/api/{tid}/waypoint/add", post(handlers::add_waypoint))
        .route("/api/{tid}/waypoint/move", post(handlers::move_waypoint))
        .route("/api/{tid}/truck", get(ws::truck_ws))
        .route("/api/{tid}/truck/add", post(handlers::add_truck))
        .route("/api/{tid}/truck/move", post(handlers::move_truck))
        .route("/api/{tid}/truck/stop", post(handlers::stop_truck))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use dispatch_common::InMemoryStore;
    use dispatch_core::{Registry, ServiceContext, StaticRegistry, TruckRow, WaypointRow};
    use tower::ServiceExt;

    use super::*;

    fn test_ctx() -> Arc<ServiceContext> {
        let registry = StaticRegistry::new(
            Arc::new(InMemoryStore::<WaypointRow>::new()),
            Arc::new(InMemoryStore::<TruckRow>::new()),
        );
        ServiceContext::new(Arc::new(registry) as Arc<dyn Registry>)
    }

    #[tokio::test]
    async fn add_waypoint_then_fetch_via_registry() {
        let ctx = test_ctx();
        let app = router(ctx.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/t1/waypoint/add")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":10.0,"y":20.0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let (_, waypoints) = ctx.fetch_waypoints("t1").await.unwrap();
        assert_eq!(waypoints.len(), 1);
        assert_eq!(waypoints[0].x, 10.0);
    }

    #[tokio::test]
    async fn move_waypoint_with_bad_seq_returns_err_envelope() {
        let ctx = test_ctx();
        let app = router(ctx.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/t1/waypoint/move")
                    .header("content-type", "application/json")
                    .body(Body::from(format!(
                        r#"{{"seq":42,"_id":"{}","x":1.0,"y":1.0}}"#,
                        uuid::Uuid::new_v4()
                    )))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("err").is_some());
    }

    #[tokio::test]
    async fn second_tenant_is_rejected_once_the_registry_is_stuck() {
        let ctx = test_ctx();
        let app = router(ctx.clone());

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/t1/waypoint/add")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":1.0,"y":1.0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/t2/waypoint/add")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"x":2.0,"y":2.0}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::OK);

        let body = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let err = json["err"].as_str().unwrap();
        assert!(err.contains("t1"));
        assert!(err.contains("t2"));
    }
}
