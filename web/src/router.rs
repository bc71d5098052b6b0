//! Router configuration.
//!
//! Builds the complete Axum router with all endpoints.

use crate::handlers::health::{health_check, readiness_check};
use crate::handlers::requests;
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, patch},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// Health checks live at the root; the request API is nested under `/api`.
/// Every route runs inside the correlation-id and HTTP trace layers.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/requests",
            get(requests::list_requests).post(requests::create_request),
        )
        .route("/requests/my", get(requests::list_my_requests))
        .route("/requests/:id", get(requests::get_request))
        .route("/requests/:id/assign", patch(requests::assign_request))
        .route("/requests/:id/cancel", patch(requests::cancel_request))
        .route("/requests/:id/take", patch(requests::take_request))
        .route("/requests/:id/complete", patch(requests::complete_request))
        .route("/masters", get(requests::list_masters));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(correlation_id_layer())
        .with_state(state)
}
