//! Device discovery API endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::api::error_reply;
use crate::state::AppState;
use minaret_types::api::{DeviceListResponse, DiscoverResponse, ErrorResponse};
use minaret_types::device::Device;

/// List the currently cached devices.
#[utoipa::path(
    get,
    path = "/api/devices",
    tag = "devices",
    responses(
        (status = 200, description = "Cached devices", body = DeviceListResponse)
    )
)]
pub async fn list_devices(State(state): State<AppState>) -> Json<DeviceListResponse> {
    Json(DeviceListResponse {
        devices: state.manager().devices(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct DiscoverParams {
    /// Bypass the cooldown window and force a network round.
    #[serde(default)]
    pub force: bool,
}

/// Run a discovery round.
///
/// Results are cached; repeat calls inside the cooldown window are served
/// from the cache unless `force=true`.
#[utoipa::path(
    post,
    path = "/api/devices/discover",
    tag = "devices",
    params(
        ("force" = Option<bool>, Query, description = "Bypass the discovery cooldown")
    ),
    responses(
        (status = 200, description = "Discovery result", body = DiscoverResponse),
        (status = 503, description = "No devices found", body = ErrorResponse)
    )
)]
pub async fn discover(
    State(state): State<AppState>,
    Query(params): Query<DiscoverParams>,
) -> Result<Json<DiscoverResponse>, (StatusCode, Json<ErrorResponse>)> {
    info!("Discovery requested (force={})", params.force);

    match state.manager().discover(params.force).await {
        Ok(outcome) => Ok(Json(DiscoverResponse {
            devices: outcome.devices,
            from_cache: outcome.from_cache,
            skipped: outcome.skipped,
            strategy: outcome.strategy.map(String::from),
        })),
        Err(e) => Err(error_reply(&e)),
    }
}

/// Get a cached device by display name.
#[utoipa::path(
    get,
    path = "/api/devices/{name}",
    tag = "devices",
    params(
        ("name" = String, Path, description = "Device display name")
    ),
    responses(
        (status = 200, description = "Device found", body = Device),
        (status = 404, description = "Device not in cache", body = ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Device>, (StatusCode, Json<ErrorResponse>)> {
    match state.manager().get_device(&name) {
        Some(device) => Ok(Json(device)),
        None => Err(error_reply(&crate::cast::CastError::DeviceNotFound(name))),
    }
}
