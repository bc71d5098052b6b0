//! Health check endpoints.
//!
//! These endpoints are used by load balancers and monitoring systems
//! to verify service health.

use crate::WebResult;
use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Liveness check.
///
/// Returns 200 OK if the process is serving requests. Does NOT check the
/// database.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Store round-trip succeeded
    pub database: bool,
}

/// Readiness check.
///
/// Performs one store round-trip. Returns 503 `SERVICE_UNAVAILABLE` when the
/// store is unreachable so the instance is taken out of rotation.
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"database":true}
/// ```
///
/// # Errors
///
/// - 503 `SERVICE_UNAVAILABLE`: the store round-trip failed
pub async fn readiness_check(State(state): State<AppState>) -> WebResult<Json<ReadinessResponse>> {
    state.engine.store().count_users().await.map_err(|e| {
        tracing::warn!(error = %e, "Readiness check failed");
        AppError::unavailable("Database is not reachable").with_source(e.into())
    })?;

    Ok(Json(ReadinessResponse {
        ready: true,
        database: true,
    }))
}
