//! HTTP API integration tests
//!
//! Router-level tests via tower oneshot: request/response envelopes,
//! status mapping of workflow rejections, and the health endpoint.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use helpers::TestHarness;
use vchk_iw::build_router;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_ok_with_uptime() {
    let harness = TestHarness::default().await;
    let app = build_router(harness.app_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "vchk-iw");
}

#[tokio::test]
async fn start_inspection_returns_session_view() {
    let harness = TestHarness::default().await;
    let app = build_router(harness.app_state());

    let response = app
        .oneshot(post_json(
            "/inspections",
            json!({
                "subject_id": Uuid::new_v4(),
                "kind": "departure",
                "geolocation": { "latitude": 48.8566, "longitude": 2.3522, "address": "Paris" }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["state"], "draft");
    assert_eq!(body["kind"], "departure");
    assert_eq!(body["current_step"], "front");
    assert_eq!(body["steps"].as_array().unwrap().len(), 6);
    assert_eq!(body["ready_for_signatures"], false);
    assert_eq!(body["signature_phase"], "awaiting_operator");
    assert_eq!(body["geolocation"]["address"], "Paris");
}

#[tokio::test]
async fn duplicate_start_returns_conflict_with_existing_id() {
    let harness = TestHarness::default().await;
    let subject = Uuid::new_v4();

    let first = harness
        .orchestrator
        .start(subject, vchk_iw::models::InspectionKind::Departure, None)
        .await
        .unwrap();

    let app = build_router(harness.app_state());
    let response = app
        .oneshot(post_json(
            "/inspections",
            json!({ "subject_id": subject, "kind": "departure" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "DUPLICATE_OPEN_SESSION");
    assert_eq!(
        body["error"]["existing_session_id"],
        first.session_id.to_string()
    );
}

#[tokio::test]
async fn capture_rejects_invalid_base64() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), vchk_iw::models::InspectionKind::Departure, None)
        .await
        .unwrap();

    let app = build_router(harness.app_state());
    let response = app
        .oneshot(post_json(
            &format!("/inspections/{}/photos", session.session_id),
            json!({ "step": "front", "image_base64": "not//valid!!base64" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn capture_returns_pending_token() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), vchk_iw::models::InspectionKind::Departure, None)
        .await
        .unwrap();

    let app = build_router(harness.app_state());
    let response = app
        .oneshot(post_json(
            &format!("/inspections/{}/photos", session.session_id),
            json!({ "step": "front", "image_base64": "aW1hZ2UtYnl0ZXM=" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["step"], "front");
    assert!(Uuid::parse_str(body["capture_token"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn counterparty_signature_first_is_unprocessable() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), vchk_iw::models::InspectionKind::Departure, None)
        .await
        .unwrap();

    let app = build_router(harness.app_state());
    let response = app
        .oneshot(post_json(
            &format!("/inspections/{}/signatures", session.session_id),
            json!({ "role": "counterparty", "data": "c2ln" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "SIGNATURE_ORDER_VIOLATION");
}

#[tokio::test]
async fn lock_before_required_steps_names_missing_work() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), vchk_iw::models::InspectionKind::Departure, None)
        .await
        .unwrap();

    let app = build_router(harness.app_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/inspections/{}/lock", session.session_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "STEPS_INCOMPLETE");
    let missing = body["error"]["missing_steps"].as_array().unwrap();
    assert_eq!(missing.len(), 4);
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let harness = TestHarness::default().await;
    let app = build_router(harness.app_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/inspections/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn unknown_step_in_path_is_not_found() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), vchk_iw::models::InspectionKind::Departure, None)
        .await
        .unwrap();

    let app = build_router(harness.app_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!(
                    "/inspections/{}/steps/windshield/retake",
                    session.session_id
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UNKNOWN_STEP");
}

#[tokio::test]
async fn metadata_patch_round_trips() {
    let harness = TestHarness::default().await;
    let session = harness
        .orchestrator
        .start(Uuid::new_v4(), vchk_iw::models::InspectionKind::Departure, None)
        .await
        .unwrap();

    let app = build_router(harness.app_state());
    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(format!("/inspections/{}/metadata", session.session_id))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "condition": "good", "fuel_level": 80, "odometer_km": 12000 })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["condition"], "good");
    assert_eq!(body["fuel_level"], 80);
    assert_eq!(body["odometer_km"], 12000);
}
