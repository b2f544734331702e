//! Scenario: the HTTP contract for authoring and token-gated fulfillment.
//!
//! Covers the create / read / patch flow end to end through the router,
//! including the freeze, completion gate and concurrent-write guarantees.
//! All tests are in-process over the in-memory registry.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rx_api::{build_router, AppState};
use rx_domain::{
    prescriptions::{assets::NoopAssetGenerator, MemRegistry, OrderService},
    OrderConfig,
};
use serde_json::{json, Value};
use tower::ServiceExt; // oneshot

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn router() -> Router {
    let service = OrderService::new(
        OrderConfig::default(),
        Arc::new(MemRegistry::new()),
        Arc::new(NoopAssetGenerator),
    );
    build_router(AppState::new(service))
}

async fn call(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = router.clone().oneshot(req).await.expect("oneshot failed");
    let status = resp.status();
    let bytes = resp
        .into_body()
        .collect()
        .await
        .expect("body collect failed")
        .to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("body is not valid JSON")
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn patch(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn as_staff(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-staff-id", "dr1")
        .header("x-staff-name", "Dr One")
        .header("x-staff-specialty", "Family medicine")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap()
}

fn scenario_a_body() -> Value {
    json!({
        "prescriberId": "dr1",
        "patientId": "patient-1",
        "patientSnapshot": {"name": "A B", "phone": "+15551234567", "city": "X", "country": "Y"},
        "validUntil": Utc::now() + Duration::days(30),
        "lines": [
            {"diagnosis": "flu", "medication": "Amoxicillin", "dosage": "500mg", "frequency": "2x/day"}
        ],
    })
}

async fn create(router: &Router) -> (String, String) {
    let (status, json) = call(router, as_staff("POST", "/orders", Some(scenario_a_body()))).await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    (
        json["id"].as_str().unwrap().to_string(),
        json["publicToken"].as_str().unwrap().to_string(),
    )
}

// ---------------------------------------------------------------------------
// Scenario A: create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_a_create_returns_token_and_not_reviewed() {
    let router = router();

    let (status, json) = call(&router, as_staff("POST", "/orders", Some(scenario_a_body()))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert!(!json["publicToken"].as_str().unwrap_or("").is_empty());
    assert_eq!(json["status"], "NotReviewed");
    assert_eq!(json["submittedLock"], false);
    assert_eq!(json["lines"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn create_requires_authentication() {
    let router = router();
    let req = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .body(Body::from(scenario_a_body().to_string()))
        .unwrap();

    let (status, _) = call(&router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_requires_staff_specialty() {
    let router = router();
    let req = Request::builder()
        .method("POST")
        .uri("/orders")
        .header("content-type", "application/json")
        .header("x-staff-id", "dr1")
        .header("x-staff-name", "Dr One")
        .body(Body::from(scenario_a_body().to_string()))
        .unwrap();

    let (status, json) = call(&router, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Unauthenticated");
}

#[tokio::test]
async fn public_link_has_no_write_route() {
    let router = router();
    let (_, token) = create(&router).await;

    let resp = router
        .clone()
        .oneshot(patch(&format!("/orders/{token}"), json!({"status": "Declined"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);

    let (_, json) = call(&router, get(&format!("/orders/{token}/fulfillment"))).await;
    assert_eq!(json["status"], "NotReviewed");
}

#[tokio::test]
async fn create_with_past_validity_is_rejected() {
    let router = router();
    let mut body = scenario_a_body();
    body["validUntil"] = json!(Utc::now() - Duration::days(1));
    body["lines"] = json!([]);

    let (status, json) = call(&router, as_staff("POST", "/orders", Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "ValidationError");
    assert_eq!(
        json["details"],
        json!(["validUntil must be after issuedAt", "lines must not be empty"])
    );

    let (_, history) = call(&router, as_staff("GET", "/internal/patients/patient-1/orders", None)).await;
    assert_eq!(history["orderIds"], json!([]));
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

#[tokio::test]
async fn public_view_is_stable_and_leaks_nothing_internal() {
    let router = router();
    let (id, token) = create(&router).await;

    let (first_status, first) = call(&router, get(&format!("/orders/{token}"))).await;
    let (_, second) = call(&router, get(&format!("/orders/{token}"))).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(first, second);
    assert_eq!(first["status"], "NotReviewed");
    assert_eq!(first["prescriberName"], "Dr One");
    let raw = first.to_string();
    assert!(!raw.contains(&id));
    assert!(!raw.contains(&token));
}

#[tokio::test]
async fn unknown_and_garbage_tokens_get_identical_404s() {
    let router = router();
    create(&router).await;

    let (unknown_status, unknown) = call(&router, get(&format!("/orders/{}", "a".repeat(64)))).await;
    let (garbage_status, garbage) = call(&router, get("/orders/not-a-token")).await;

    assert_eq!(unknown_status, StatusCode::NOT_FOUND);
    assert_eq!(garbage_status, StatusCode::NOT_FOUND);
    assert_eq!(unknown, garbage);
}

#[tokio::test]
async fn internal_id_is_not_a_token() {
    let router = router();
    let (id, _) = create(&router).await;

    let (status, _) = call(&router, get(&format!("/orders/{id}/fulfillment"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = call(&router, as_staff("GET", &format!("/internal/orders/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id.as_str());
}

// ---------------------------------------------------------------------------
// Scenario B: partial fill needs notes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_b_partial_fill_without_notes_then_with_notes() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");

    let (status, json) = call(&router, patch(&uri, json!({"status": "PartiallyFilled"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "IncompleteFulfillment");
    assert!(!json.to_string().contains(&token));

    let (status, json) = call(
        &router,
        patch(
            &uri,
            json!({"status": "PartiallyFilled", "dispensingNotes": "substituted generic, out of stock"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "PartiallyFilled");
    assert_eq!(json["submittedLock"], false);
    assert_eq!(json["version"], 1);
}

// ---------------------------------------------------------------------------
// Scenario C: complete and freeze
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scenario_c_complete_with_submit_freezes_order() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");

    let (status, json) = call(
        &router,
        patch(
            &uri,
            json!({
                "status": "Completed",
                "dispenserIdentity": {"name": "Pharm A", "contact": "555-1111"},
                "submit": true,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["submittedLock"], true);
    let frozen = json;

    for body in [
        json!({"status": "Declined"}),
        json!({"status": "Completed", "dispenserIdentity": {"name": "X", "contact": "Y"}}),
    ] {
        let (status, json) = call(&router, patch(&uri, body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"], "OrderFrozen");
    }

    let (_, after) = call(&router, get(&uri)).await;
    assert_eq!(after, frozen);
}

#[tokio::test]
async fn frozen_order_answers_every_patch_with_order_frozen() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");

    let (status, _) = call(
        &router,
        patch(&uri, json!({"status": "Declined", "submit": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    for body in [
        json!({}),
        json!({"dispensingNotes": "late edit"}),
        json!({"status": "Shipped"}),
        json!({"lines": []}),
    ] {
        let (status, json) = call(&router, patch(&uri, body.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT, "{body}");
        assert_eq!(json["error"], "OrderFrozen", "{body}");
    }

    let garbled = Request::builder()
        .method("PATCH")
        .uri(&uri)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, json) = call(&router, garbled).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "OrderFrozen");
}

#[tokio::test]
async fn partial_fill_finalizes_with_saved_dispenser() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");

    let (status, _) = call(
        &router,
        patch(
            &uri,
            json!({
                "status": "PartiallyFilled",
                "dispensingNotes": "generic",
                "dispenserIdentity": {"name": "Pharm A", "contact": "555"},
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(
        &router,
        patch(
            &uri,
            json!({"status": "PartiallyFilled", "dispensingNotes": "generic", "submit": true}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["submittedLock"], true);
    assert_eq!(json["dispenserIdentity"]["name"], "Pharm A");
}

#[tokio::test]
async fn stale_incomplete_completion_is_incomplete_not_conflict() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");

    let (status, _) = call(
        &router,
        patch(
            &uri,
            json!({"status": "Completed", "dispenserIdentity": {"name": "Pharm A", "contact": "555"}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, json) = call(&router, patch(&uri, json!({"status": "Completed", "version": 0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "IncompleteFulfillment");
}

#[tokio::test]
async fn completion_gate_leaves_order_unchanged() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");
    let (_, before) = call(&router, get(&uri)).await;

    let (status, json) = call(&router, patch(&uri, json!({"status": "Completed"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json["details"],
        json!(["dispenserIdentity.name", "dispenserIdentity.contact"])
    );

    let (_, after) = call(&router, get(&uri)).await;
    assert_eq!(after, before);
}

// ---------------------------------------------------------------------------
// Capability allow-list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pharmacy_cannot_touch_clinician_fields() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");
    let (_, before) = call(&router, get(&uri)).await;

    let (status, json) = call(
        &router,
        patch(
            &uri,
            json!({
                "status": "Declined",
                "lines": [{"diagnosis": "x", "medication": "y", "dosage": "z", "frequency": "w"}],
                "validUntil": Utc::now() + Duration::days(365),
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "ValidationError");
    assert_eq!(
        json["details"],
        json!(["field 'lines' is not writable", "field 'validUntil' is not writable"])
    );

    let (_, after) = call(&router, get(&uri)).await;
    assert_eq!(after, before);
}

// ---------------------------------------------------------------------------
// Concurrency
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_patches_at_same_version_have_one_winner() {
    let router = router();
    let (_, token) = create(&router).await;
    let uri = format!("/orders/{token}/fulfillment");

    let (_, read) = call(&router, get(&uri)).await;
    assert_eq!(read["version"], 0);

    let first = {
        let (router, uri) = (router.clone(), uri.clone());
        tokio::spawn(async move {
            call(
                &router,
                patch(&uri, json!({"status": "PartiallyFilled", "dispensingNotes": "first", "version": 0})),
            )
            .await
        })
    };
    let second = {
        let (router, uri) = (router.clone(), uri.clone());
        tokio::spawn(async move {
            call(
                &router,
                patch(&uri, json!({"status": "PartiallyFilled", "dispensingNotes": "second", "version": 0})),
            )
            .await
        })
    };

    let results = [first.await.unwrap(), second.await.unwrap()];
    let ok: Vec<_> = results.iter().filter(|(s, _)| *s == StatusCode::OK).collect();
    let conflicts: Vec<_> = results
        .iter()
        .filter(|(s, j)| *s == StatusCode::CONFLICT && j["error"] == "Conflict")
        .collect();
    assert_eq!(ok.len(), 1);
    assert_eq!(conflicts.len(), 1);

    let (_, stored) = call(&router, get(&uri)).await;
    assert_eq!(stored, ok[0].1);
}

// ---------------------------------------------------------------------------
// Internal variant
// ---------------------------------------------------------------------------

#[tokio::test]
async fn medication_order_lifecycle_is_internal() {
    let router = router();
    let mut body = scenario_a_body();
    body.as_object_mut().unwrap().remove("prescriberId");

    let (status, created) = call(
        &router,
        as_staff("POST", "/internal/medication-orders", Some(body)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created.get("publicToken").is_none());
    let uri = format!("/internal/orders/{}", created["id"].as_str().unwrap());

    let (status, json) = call(
        &router,
        as_staff(
            "PATCH",
            &uri,
            Some(json!({"status": "Declined", "submit": true, "version": 0})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["submittedLock"], true);

    let (status, json) = call(
        &router,
        as_staff("PATCH", &uri, Some(json!({"validUntil": Utc::now() + Duration::days(90)}))),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "OrderFrozen");

    let (_, history) = call(&router, as_staff("GET", "/internal/patients/patient-1/orders", None)).await;
    assert_eq!(history["orderIds"], json!([created["id"]]));
}
