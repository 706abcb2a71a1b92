//! Broadcast API endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::api::status_for_code;
use crate::state::AppState;
use minaret_types::api::PlayBroadcastRequest;
use minaret_types::broadcast::{BroadcastOutcome, BroadcastStatus, StopOutcome};

/// Start a broadcast on the configured target device.
///
/// The response body is always a [`BroadcastOutcome`]; on failure the HTTP
/// status reflects the outcome's error code (409 for a collision, 503 when
/// no device is reachable, and so on).
#[utoipa::path(
    post,
    path = "/api/broadcast/play",
    tag = "broadcast",
    request_body = PlayBroadcastRequest,
    responses(
        (status = 200, description = "Broadcast confirmed playing", body = BroadcastOutcome),
        (status = 409, description = "Another broadcast is already active", body = BroadcastOutcome),
        (status = 503, description = "No device reachable", body = BroadcastOutcome),
        (status = 504, description = "Device accepted the load but never reported playback", body = BroadcastOutcome)
    )
)]
pub async fn play_broadcast(
    State(state): State<AppState>,
    Json(req): Json<PlayBroadcastRequest>,
) -> (StatusCode, Json<BroadcastOutcome>) {
    info!("Play broadcast requested: kind={}", req.kind);

    let outcome = state.manager().play_broadcast(req.kind).await;
    let status = match &outcome.error_code {
        None => StatusCode::OK,
        Some(code) => status_for_code(code),
    };
    (status, Json(outcome))
}

/// Stop the active broadcast, if any.
#[utoipa::path(
    post,
    path = "/api/broadcast/stop",
    tag = "broadcast",
    responses(
        (status = 200, description = "Stop processed", body = StopOutcome)
    )
)]
pub async fn stop_broadcast(State(state): State<AppState>) -> Json<StopOutcome> {
    info!("Stop broadcast requested");
    Json(state.manager().stop_broadcast().await)
}

/// Get the current broadcast state.
#[utoipa::path(
    get,
    path = "/api/broadcast/status",
    tag = "broadcast",
    responses(
        (status = 200, description = "Current broadcast state", body = BroadcastStatus)
    )
)]
pub async fn broadcast_status(State(state): State<AppState>) -> Json<BroadcastStatus> {
    Json(state.manager().broadcast_status())
}
