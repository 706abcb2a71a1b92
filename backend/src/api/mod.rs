//! API handlers.

pub mod broadcast;
pub mod devices;
pub mod sse;
pub mod status;

use crate::cast::CastError;
use axum::http::StatusCode;
use axum::Json;
use minaret_types::api::ErrorResponse;

/// HTTP status for a stable error code.
///
/// Policy rejections and remote failures get distinct statuses so a
/// scheduler or dashboard can branch without parsing messages.
pub(crate) fn status_for_code(code: &str) -> StatusCode {
    match code {
        "broadcast_collision" => StatusCode::CONFLICT,
        "circuit_open" | "unreachable" | "no_devices_found" | "no_suitable_device" => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        "device_not_found" => StatusCode::NOT_FOUND,
        "invalid_url" => StatusCode::BAD_REQUEST,
        "load_timeout" => StatusCode::GATEWAY_TIMEOUT,
        "handshake_timeout" | "max_retries_exceeded" | "session_error" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map a cast error to its HTTP status and standard error body.
pub(crate) fn error_reply(err: &CastError) -> (StatusCode, Json<ErrorResponse>) {
    (
        status_for_code(err.code()),
        Json(ErrorResponse::new(err.code(), err.to_string())),
    )
}
