//! API request and response types.

use crate::broadcast::BroadcastKind;
use crate::device::Device;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

// ============================================================================
// Device API Types
// ============================================================================

/// Response containing the currently cached devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DeviceListResponse {
    pub devices: Vec<Device>,
}

/// Response for a discovery round.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct DiscoverResponse {
    pub devices: Vec<Device>,
    /// True when the result was served from the cache.
    pub from_cache: bool,
    /// True when the cooldown window suppressed a network round.
    pub skipped: bool,
    /// Name of the enumeration strategy that produced the result, when a
    /// network round actually ran.
    pub strategy: Option<String>,
}

// ============================================================================
// Broadcast API Types
// ============================================================================

/// Request to start a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PlayBroadcastRequest {
    pub kind: BroadcastKind,
}

// ============================================================================
// Pool / Circuit Breaker API Types
// ============================================================================

/// Circuit breaker state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of one circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BreakerStatus {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    /// Seconds until the next trial call is allowed, when open.
    pub retry_in_secs: Option<u64>,
    /// Failure counts grouped by error classification.
    pub failure_reasons: HashMap<String, u32>,
}

/// Response listing every registered circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BreakerListResponse {
    pub breakers: Vec<BreakerStatus>,
}

/// Snapshot of one pooled connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PooledConnectionInfo {
    pub device_id: String,
    pub device_name: String,
    pub connected: bool,
    pub use_count: u64,
    /// Seconds since the session was last handed out.
    pub idle_secs: u64,
    /// Seconds since the session last passed validation.
    pub last_validated_secs: u64,
}

/// Response for the pool status endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct PoolStatusResponse {
    pub active_connections: Vec<PooledConnectionInfo>,
    pub circuit_breakers: HashMap<String, BreakerStatus>,
}

// ============================================================================
// Error Response
// ============================================================================

/// Standard error response shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable classification, e.g. "circuit_open".
    pub code: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        ErrorResponse {
            error: error.into(),
            code: code.into(),
        }
    }
}
