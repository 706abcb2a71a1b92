//! Cast device domain types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Default CASTV2 control port.
pub const DEFAULT_CAST_PORT: u16 = 8009;

/// An addressable cast appliance on the local network.
///
/// Created by discovery; the `available` flag and failure counter are
/// mutated by availability checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct Device {
    /// Opaque unique identity. Taken from the mDNS TXT `id` record when
    /// present, otherwise derived from the network endpoint.
    pub id: String,
    /// Display name as announced by the device.
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub address: IpAddr,
    pub port: u16,
    /// Model tag, e.g. "Google Nest Mini".
    pub model: String,
    pub manufacturer: String,
    pub available: bool,
    pub consecutive_failures: u32,
}

impl Device {
    /// The `address:port` endpoint string used for connection probes.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} at {})", self.name, self.model, self.endpoint())
    }
}

/// Player state as reported by a device status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum PlayerState {
    Idle,
    Buffering,
    Playing,
    Paused,
    Unknown,
}

impl PlayerState {
    /// Parse a device-reported state string, mapping anything
    /// unrecognized to `Unknown`.
    pub fn from_report(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "IDLE" => PlayerState::Idle,
            "BUFFERING" => PlayerState::Buffering,
            "PLAYING" => PlayerState::Playing,
            "PAUSED" => PlayerState::Paused,
            _ => PlayerState::Unknown,
        }
    }

    /// True for states that indicate media is starting or running.
    pub fn is_active(&self) -> bool {
        matches!(self, PlayerState::Buffering | PlayerState::Playing)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlayerState::Idle => "idle",
            PlayerState::Buffering => "buffering",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// One result of refreshing a session's media status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct MediaSnapshot {
    pub player_state: PlayerState,
    /// Content id (media URL) currently loaded, if any.
    pub content_id: Option<String>,
}

impl MediaSnapshot {
    pub fn idle() -> Self {
        MediaSnapshot {
            player_state: PlayerState::Idle,
            content_id: None,
        }
    }
}
