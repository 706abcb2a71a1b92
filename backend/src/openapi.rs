//! OpenAPI documentation configuration.

use minaret_types::api::{
    BreakerListResponse, BreakerState, BreakerStatus, DeviceListResponse, DiscoverResponse,
    ErrorResponse, PlayBroadcastRequest, PooledConnectionInfo, PoolStatusResponse,
};
use minaret_types::broadcast::{BroadcastKind, BroadcastOutcome, BroadcastStatus, StopOutcome};
use minaret_types::device::{Device, MediaSnapshot, PlayerState};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::devices::list_devices,
        crate::api::devices::discover,
        crate::api::devices::get_device,
        crate::api::broadcast::play_broadcast,
        crate::api::broadcast::stop_broadcast,
        crate::api::broadcast::broadcast_status,
        crate::api::status::pool_status,
        crate::api::status::list_breakers,
        crate::api::status::get_breaker,
        crate::api::status::reset_breaker,
    ),
    components(
        schemas(
            Device,
            PlayerState,
            MediaSnapshot,
            BroadcastKind,
            BroadcastOutcome,
            StopOutcome,
            BroadcastStatus,
            DeviceListResponse,
            DiscoverResponse,
            PlayBroadcastRequest,
            BreakerState,
            BreakerStatus,
            BreakerListResponse,
            PooledConnectionInfo,
            PoolStatusResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "devices", description = "Cast device discovery endpoints"),
        (name = "broadcast", description = "Announcement broadcast endpoints"),
        (name = "status", description = "Connection pool and circuit breaker introspection")
    ),
    info(
        title = "Minaret Broadcast API",
        version = "0.1.0",
        description = "REST API for broadcasting scheduled announcements to Chromecast devices",
        license(
            name = "MIT OR Apache-2.0"
        )
    )
)]
pub struct ApiDoc;
