//! Minaret backend library.
//!
//! This module exposes the application builder for use in tests.

use axum::http::{header, Method};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod api;
pub mod cast;
pub mod config;
pub mod events;
pub mod network;
pub mod openapi;
pub mod state;

use state::AppState;

/// Create the Axum application router.
///
/// This function is used both by the main server binary and by integration tests.
pub async fn create_app() -> Router {
    create_app_with_state(AppState::default()).await
}

/// Create the Axum application router with a given state.
pub async fn create_app_with_state(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/devices", get(api::devices::list_devices))
        .route("/devices/discover", post(api::devices::discover))
        .route("/devices/{name}", get(api::devices::get_device))
        .route("/broadcast/play", post(api::broadcast::play_broadcast))
        .route("/broadcast/stop", post(api::broadcast::stop_broadcast))
        .route("/broadcast/status", get(api::broadcast::broadcast_status))
        .route("/pool", get(api::status::pool_status))
        .route("/breakers", get(api::status::list_breakers))
        .route("/breakers/{name}", get(api::status::get_breaker))
        .route("/breakers/{name}/reset", post(api::status::reset_breaker))
        .route("/events", get(api::sse::events_stream));

    // Announcement files the cast devices fetch over the LAN
    let media_service = ServeDir::new(state.media_path());

    Router::new()
        .route("/health", get(health))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
        .nest("/api", api_router)
        .nest_service("/media", media_service)
        .layer(
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
                .allow_origin(Any),
        )
        .with_state(state)
}

/// Health check endpoint.
async fn health() -> &'static str {
    "OK"
}
