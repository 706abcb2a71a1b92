//! Session abstraction over the cast wire protocol.
//!
//! The orchestration core never talks CASTV2 directly; it drives these
//! traits. The production implementation lives in [`crate::cast::castv2`],
//! tests substitute mocks.

use async_trait::async_trait;
use minaret_types::{Device, MediaSnapshot};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Failures surfaced by the session primitive itself.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Socket-level failure (connect, TLS, broken pipe).
    #[error("session transport error: {0}")]
    Transport(String),

    /// The device rejected or garbled a protocol exchange.
    #[error("cast protocol error: {0}")]
    Protocol(String),

    /// A single protocol operation exceeded its deadline.
    #[error("session operation timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The session's worker has shut down; the handle is dead.
    #[error("session closed")]
    Closed,
}

/// An open, stateful handle to a device.
#[async_trait]
pub trait MediaSession: Send + Sync {
    /// Load media on the device's default receiver.
    async fn load(&self, url: &str, content_type: &str) -> Result<(), SessionError>;

    /// Stop whatever is currently playing. Succeeds when nothing is.
    async fn stop(&self) -> Result<(), SessionError>;

    /// Query the device for its current media status.
    async fn refresh_status(&self) -> Result<MediaSnapshot, SessionError>;

    /// Gracefully tear the session down. The handle is unusable afterwards.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Opens sessions. The connection pool is the only caller.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        device: &Device,
        timeout: Duration,
    ) -> Result<Arc<dyn MediaSession>, SessionError>;
}
