use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rx_domain::{
    prescriptions::{inputs::CreateOrderInput, PublicToken},
    Error,
};
use serde_json::Value;

use crate::{auth::Authenticated, error::ApiError, AppState};

fn json_body(body: &Bytes) -> Result<Value, Error> {
    if body.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| Error::validation(format!("malformed JSON body: {}", e)))
}

// Write payloads are judged by the service after the order is loaded, so an
// unreadable body is handed over as a non-object and rejected there.
fn patch_body(body: &Bytes) -> Value {
    json_body(body).unwrap_or(Value::Null)
}

// Create prescription
pub async fn create_order(
    State(state): State<AppState>,
    Authenticated(staff): Authenticated,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let input = CreateOrderInput::from_json(json_body(&body)?)?;
    let view = state.orders.create_order(&staff, input).await?;

    Ok((StatusCode::CREATED, Json(view)))
}

// Public read
pub async fn get_public(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let token = PublicToken::from_presented(token);
    let view = state.orders.resolve_public(&token).await?;

    Ok(Json(view))
}

// Pharmacy read
pub async fn get_fulfillment(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let token = PublicToken::from_presented(token);
    let view = state.orders.resolve_fulfillment(&token).await?;

    Ok(Json(view))
}

// Pharmacy write
pub async fn patch_fulfillment(
    Path(token): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let token = PublicToken::from_presented(token);
    let view = state.orders.transition(&token, patch_body(&body)).await?;

    Ok(Json(view))
}

// Create in-house medication order
pub async fn create_medication_order(
    State(state): State<AppState>,
    Authenticated(staff): Authenticated,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let input = CreateOrderInput::from_json(json_body(&body)?)?;
    let view = state.orders.create_medication_order(&staff, input).await?;

    Ok((StatusCode::CREATED, Json(view)))
}

// Internal read
pub async fn get_internal(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Authenticated(staff): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.orders.resolve_internal(&id, &staff).await?;

    Ok(Json(view))
}

// Internal write
pub async fn patch_internal(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Authenticated(staff): Authenticated,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .orders
        .update_internal(&id, &staff, patch_body(&body))
        .await?;

    Ok(Json(view))
}

// Patient medication history (order references only)
pub async fn get_patient_history(
    Path(patient_id): Path<String>,
    State(state): State<AppState>,
    Authenticated(_staff): Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.orders.patient_history(&patient_id).await?;

    Ok(Json(history))
}
