//! Pool and circuit breaker status endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::state::AppState;
use minaret_types::api::{BreakerListResponse, BreakerStatus, ErrorResponse, PoolStatusResponse};

/// Get a snapshot of the connection pool.
#[utoipa::path(
    get,
    path = "/api/pool",
    tag = "status",
    responses(
        (status = 200, description = "Pool snapshot", body = PoolStatusResponse)
    )
)]
pub async fn pool_status(State(state): State<AppState>) -> Json<PoolStatusResponse> {
    Json(state.manager().pool_status())
}

/// List every registered circuit breaker.
#[utoipa::path(
    get,
    path = "/api/breakers",
    tag = "status",
    responses(
        (status = 200, description = "All circuit breakers", body = BreakerListResponse)
    )
)]
pub async fn list_breakers(State(state): State<AppState>) -> Json<BreakerListResponse> {
    let mut breakers: Vec<BreakerStatus> = state.manager().breaker_statuses().into_values().collect();
    breakers.sort_by(|a, b| a.name.cmp(&b.name));
    Json(BreakerListResponse { breakers })
}

/// Get one circuit breaker by device name.
#[utoipa::path(
    get,
    path = "/api/breakers/{name}",
    tag = "status",
    params(
        ("name" = String, Path, description = "Device display name")
    ),
    responses(
        (status = 200, description = "Breaker snapshot", body = BreakerStatus),
        (status = 404, description = "No breaker registered for this device", body = ErrorResponse)
    )
)]
pub async fn get_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, (StatusCode, Json<ErrorResponse>)> {
    match state.manager().breaker_status(&name) {
        Some(status) => Ok(Json(status)),
        None => Err(breaker_not_found(&name)),
    }
}

/// Reset a circuit breaker back to closed.
#[utoipa::path(
    post,
    path = "/api/breakers/{name}/reset",
    tag = "status",
    params(
        ("name" = String, Path, description = "Device display name")
    ),
    responses(
        (status = 200, description = "Breaker reset", body = BreakerStatus),
        (status = 404, description = "No breaker registered for this device", body = ErrorResponse)
    )
)]
pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<BreakerStatus>, (StatusCode, Json<ErrorResponse>)> {
    if !state.manager().reset_breaker(&name) {
        return Err(breaker_not_found(&name));
    }
    info!("Circuit breaker for '{}' reset via API", name);
    match state.manager().breaker_status(&name) {
        Some(status) => Ok(Json(status)),
        None => Err(breaker_not_found(&name)),
    }
}

fn breaker_not_found(name: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            "breaker_not_found",
            format!("No circuit breaker registered for '{}'", name),
        )),
    )
}
