//! Error taxonomy for the cast orchestration core.

use crate::cast::session::SessionError;
use minaret_types::{BroadcastKind, PlayerState};
use std::time::Duration;
use thiserror::Error;

/// Every failure a cast operation can surface.
///
/// Policy rejections (`CircuitOpen`, `BroadcastCollision`) are distinct
/// variants so callers can tell them apart from actual remote failures.
#[derive(Debug, Error)]
pub enum CastError {
    #[error("no devices found by any enumeration strategy")]
    NoDevicesFound,

    #[error("device {name} is not reachable at {endpoint}")]
    Unreachable { name: String, endpoint: String },

    #[error("handshake with {name} timed out after {timeout_secs}s")]
    HandshakeTimeout { name: String, timeout_secs: u64 },

    #[error("giving up on {name} after {attempts} connection attempts: {last_error}")]
    MaxRetriesExceeded {
        name: String,
        attempts: u32,
        last_error: String,
    },

    #[error("circuit breaker for {device} is open, retry in {}s", retry_in.as_secs())]
    CircuitOpen { device: String, retry_in: Duration },

    #[error("invalid media url (http/https only): {url}")]
    InvalidUrl { url: String },

    #[error("media never reached playback on {name} after {attempts} status polls")]
    LoadTimeout {
        name: String,
        attempts: u32,
        observed: Vec<PlayerState>,
    },

    #[error("a {active} broadcast is already playing ({elapsed_seconds:.1}s elapsed)")]
    BroadcastCollision {
        active: BroadcastKind,
        elapsed_seconds: f64,
    },

    #[error("device '{0}' not found in discovery cache")]
    DeviceNotFound(String),

    #[error("no suitable device available for broadcast")]
    NoSuitableDevice,

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CastError {
    /// Stable machine-readable classification used in API responses.
    pub fn code(&self) -> &'static str {
        match self {
            CastError::NoDevicesFound => "no_devices_found",
            CastError::Unreachable { .. } => "unreachable",
            CastError::HandshakeTimeout { .. } => "handshake_timeout",
            CastError::MaxRetriesExceeded { .. } => "max_retries_exceeded",
            CastError::CircuitOpen { .. } => "circuit_open",
            CastError::InvalidUrl { .. } => "invalid_url",
            CastError::LoadTimeout { .. } => "load_timeout",
            CastError::BroadcastCollision { .. } => "broadcast_collision",
            CastError::DeviceNotFound(_) => "device_not_found",
            CastError::NoSuitableDevice => "no_suitable_device",
            CastError::Session(_) => "session_error",
        }
    }

    /// True for failures that happened while establishing a session.
    ///
    /// These are the failures where rediscovery can help: the device
    /// moved, dropped off the network, or its breaker is open. A load
    /// timeout is deliberately not in this set since the device was
    /// reachable and accepted the session.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            CastError::Unreachable { .. }
                | CastError::HandshakeTimeout { .. }
                | CastError::MaxRetriesExceeded { .. }
                | CastError::CircuitOpen { .. }
        )
    }

    /// True for connection-stage failures that the playback controller
    /// may retry within a single `play` call. Circuit-open is a policy
    /// rejection and is never retried internally.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CastError::Unreachable { .. }
                | CastError::HandshakeTimeout { .. }
                | CastError::MaxRetriesExceeded { .. }
                | CastError::Session(_)
        )
    }
}
