//! Shared types for the Minaret broadcast orchestrator.
//!
//! This crate contains domain models and API types shared between
//! the backend and any API consumers.

/// Default port for the Minaret backend server.
pub const DEFAULT_PORT: u16 = 5000;

pub mod api;
pub mod broadcast;
pub mod device;
pub mod events;

// Re-export commonly used types
pub use api::{
    BreakerListResponse, BreakerState, BreakerStatus, DeviceListResponse, DiscoverResponse,
    ErrorResponse, PlayBroadcastRequest, PoolStatusResponse, PooledConnectionInfo,
};
pub use broadcast::{BroadcastKind, BroadcastOutcome, BroadcastStatus, StopOutcome};
pub use device::{Device, MediaSnapshot, PlayerState, DEFAULT_CAST_PORT};
pub use events::MinaretEvent;
