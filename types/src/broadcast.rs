//! Broadcast domain types and operation outcomes.

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// Which scheduled announcement is being cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub enum BroadcastKind {
    /// The standard announcement.
    Regular,
    /// The pre-dawn announcement, which uses its own media file.
    Fajr,
}

impl BroadcastKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastKind::Regular => "regular",
            BroadcastKind::Fajr => "fajr",
        }
    }
}

impl fmt::Display for BroadcastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a `play_broadcast` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BroadcastOutcome {
    pub success: bool,
    pub kind: BroadcastKind,
    /// Display name of the device the broadcast targeted, if one was resolved.
    pub device: Option<String>,
    /// Connection attempts consumed by the playback controller.
    pub attempts: u32,
    pub elapsed_ms: u64,
    /// Stable machine-readable error code, present on failure.
    pub error_code: Option<String>,
    pub error: Option<String>,
}

/// Result of a `stop_broadcast` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct StopOutcome {
    /// Whether a broadcast was active when stop was requested.
    pub was_playing: bool,
    /// How long that broadcast had been running.
    pub elapsed_seconds: f64,
}

/// Current broadcast state as reported by `broadcast_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
pub struct BroadcastStatus {
    pub active: bool,
    pub kind: Option<BroadcastKind>,
    pub device: Option<String>,
    pub elapsed_seconds: f64,
    pub media_url: Option<String>,
}

impl BroadcastStatus {
    pub fn inactive() -> Self {
        BroadcastStatus {
            active: false,
            kind: None,
            device: None,
            elapsed_seconds: 0.0,
            media_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialization() {
        assert_eq!(serde_json::to_string(&BroadcastKind::Fajr).unwrap(), "\"fajr\"");
        let kind: BroadcastKind = serde_json::from_str("\"regular\"").unwrap();
        assert_eq!(kind, BroadcastKind::Regular);
    }

    #[test]
    fn test_inactive_status() {
        let status = BroadcastStatus::inactive();
        assert!(!status.active);
        assert!(status.kind.is_none());
        assert_eq!(status.elapsed_seconds, 0.0);
    }
}
