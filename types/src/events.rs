//! Events for real-time updates across clients.

use crate::broadcast::BroadcastKind;
use serde::{Deserialize, Serialize};

/// Event types that can be broadcast to all connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MinaretEvent {
    /// A device appeared in a discovery round
    DeviceDiscovered {
        device_id: String,
        name: String,
        model: String,
    },
    /// A device dropped out of the discovery cache
    DeviceRemoved { device_id: String, name: String },
    /// A pooled session was established to a device
    ConnectionEstablished { device_id: String, name: String },
    /// A pooled session failed validation and was evicted
    ConnectionEvicted { device_id: String, reason: String },
    /// A circuit breaker tripped open
    BreakerOpened {
        device: String,
        failure_count: u32,
        retry_in_secs: u64,
    },
    /// A circuit breaker recovered to closed
    BreakerClosed { device: String },
    /// A broadcast started playing
    BroadcastStarted {
        kind: BroadcastKind,
        device: String,
        media_url: String,
    },
    /// A broadcast finished its load/confirm sequence successfully
    BroadcastFinished {
        kind: BroadcastKind,
        device: String,
        elapsed_ms: u64,
    },
    /// A broadcast failed
    BroadcastFailed {
        kind: BroadcastKind,
        error: String,
    },
    /// An active broadcast was stopped on request
    BroadcastStopped { elapsed_seconds: f64 },
    /// Ping event to keep connection alive
    Ping,
}

impl MinaretEvent {
    /// SSE event name for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            MinaretEvent::DeviceDiscovered { .. } => "device_discovered",
            MinaretEvent::DeviceRemoved { .. } => "device_removed",
            MinaretEvent::ConnectionEstablished { .. } => "connection_established",
            MinaretEvent::ConnectionEvicted { .. } => "connection_evicted",
            MinaretEvent::BreakerOpened { .. } => "breaker_opened",
            MinaretEvent::BreakerClosed { .. } => "breaker_closed",
            MinaretEvent::BroadcastStarted { .. } => "broadcast_started",
            MinaretEvent::BroadcastFinished { .. } => "broadcast_finished",
            MinaretEvent::BroadcastFailed { .. } => "broadcast_failed",
            MinaretEvent::BroadcastStopped { .. } => "broadcast_stopped",
            MinaretEvent::Ping => "ping",
        }
    }

    /// True for the events that narrate a broadcast's lifecycle. A new
    /// subscriber gets the latest of these replayed so it knows where
    /// the current broadcast stands.
    pub fn is_broadcast_lifecycle(&self) -> bool {
        matches!(
            self,
            MinaretEvent::BroadcastStarted { .. }
                | MinaretEvent::BroadcastFinished { .. }
                | MinaretEvent::BroadcastFailed { .. }
                | MinaretEvent::BroadcastStopped { .. }
        )
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            MinaretEvent::DeviceDiscovered {
                name, model, ..
            } => format!("Discovered device {} ({})", name, model),
            MinaretEvent::DeviceRemoved { name, .. } => {
                format!("Device {} removed from cache", name)
            }
            MinaretEvent::ConnectionEstablished { name, .. } => {
                format!("Connected to {}", name)
            }
            MinaretEvent::ConnectionEvicted { device_id, reason } => {
                format!("Evicted connection to {}: {}", device_id, reason)
            }
            MinaretEvent::BreakerOpened {
                device,
                failure_count,
                retry_in_secs,
            } => format!(
                "Circuit breaker for {} opened after {} failures (retry in {}s)",
                device, failure_count, retry_in_secs
            ),
            MinaretEvent::BreakerClosed { device } => {
                format!("Circuit breaker for {} closed", device)
            }
            MinaretEvent::BroadcastStarted { kind, device, .. } => {
                format!("{} broadcast started on {}", kind, device)
            }
            MinaretEvent::BroadcastFinished {
                kind,
                device,
                elapsed_ms,
            } => format!(
                "{} broadcast confirmed on {} after {}ms",
                kind, device, elapsed_ms
            ),
            MinaretEvent::BroadcastFailed { kind, error } => {
                format!("{} broadcast failed: {}", kind, error)
            }
            MinaretEvent::BroadcastStopped { elapsed_seconds } => {
                format!("Broadcast stopped after {:.1}s", elapsed_seconds)
            }
            MinaretEvent::Ping => "Ping".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_shape() {
        let event = MinaretEvent::BreakerOpened {
            device: "Adahn".to_string(),
            failure_count: 5,
            retry_in_secs: 60,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "BreakerOpened");
        assert_eq!(json["data"]["failure_count"], 5);
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(
            MinaretEvent::BreakerClosed {
                device: "Adahn".to_string(),
            }
            .kind(),
            "breaker_closed"
        );
        assert_eq!(
            MinaretEvent::BroadcastStopped {
                elapsed_seconds: 12.0,
            }
            .kind(),
            "broadcast_stopped"
        );
        assert_eq!(MinaretEvent::Ping.kind(), "ping");
    }

    #[test]
    fn test_broadcast_lifecycle_classification() {
        assert!(MinaretEvent::BroadcastFailed {
            kind: BroadcastKind::Regular,
            error: "unreachable".to_string(),
        }
        .is_broadcast_lifecycle());
        assert!(MinaretEvent::BroadcastStopped {
            elapsed_seconds: 3.0,
        }
        .is_broadcast_lifecycle());
        assert!(!MinaretEvent::Ping.is_broadcast_lifecycle());
        assert!(!MinaretEvent::DeviceRemoved {
            device_id: "id-adahn".to_string(),
            name: "Adahn".to_string(),
        }
        .is_broadcast_lifecycle());
    }

    #[test]
    fn test_descriptions() {
        let event = MinaretEvent::BroadcastStarted {
            kind: BroadcastKind::Fajr,
            device: "Adahn".to_string(),
            media_url: "http://host/media/azan_fajr.mp3".to_string(),
        };
        assert_eq!(event.description(), "fajr broadcast started on Adahn");
        assert_eq!(MinaretEvent::Ping.description(), "Ping");
    }
}
