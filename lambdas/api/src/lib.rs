//! Prescription order API.
//!
//! `build_router` is the single entry point; `main.rs` wires the Lambda
//! adapter around it and the scenario tests in `tests/` drive it directly.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use rx_domain::prescriptions::OrderService;

pub mod auth;
pub mod error;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
}

impl AppState {
    pub fn new(orders: OrderService) -> Self {
        Self {
            orders: Arc::new(orders),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/orders", post(routes::create_order))
        .route("/orders/:token", get(routes::get_public))
        .route(
            "/orders/:token/fulfillment",
            get(routes::get_fulfillment).patch(routes::patch_fulfillment),
        )
        .route(
            "/internal/medication-orders",
            post(routes::create_medication_order),
        )
        .route(
            "/internal/orders/:id",
            get(routes::get_internal).patch(routes::patch_internal),
        )
        .route(
            "/internal/patients/:patient_id/orders",
            get(routes::get_patient_history),
        )
        .with_state(state)
}
