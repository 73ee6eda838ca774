// tests/router_tests.rs
//
// Drives the router in-process, without a listener.

mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use fithub::routes;
use serde_json::Value;
use tower::ServiceExt;

#[tokio::test]
async fn openapi_document_is_served() {
    let (state, _) = common::test_state().await;
    let app = routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api-docs/openapi.json")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let doc: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(doc["paths"]["/api/recipes"].is_object());
    assert!(doc["components"]["securitySchemes"]["BearerAuth"].is_object());
}

#[tokio::test]
async fn cors_preflight_allows_frontend_origin() {
    let (state, _) = common::test_state().await;
    let app = routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/recipes")
                .header(header::ORIGIN, "http://localhost:3000")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:3000"
    );
}

#[tokio::test]
async fn malformed_json_is_rejected() {
    let (state, _) = common::test_state().await;
    let app = routes::create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{\"username\":"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
