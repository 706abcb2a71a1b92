//! Single-flight broadcast guard.
//!
//! At most one broadcast is in flight at a time. The guard carries a
//! TTL so a crash that never released it cannot block broadcasts
//! forever: a record older than the TTL is treated as stale and cleared
//! the next time anyone consults the guard.

use crate::cast::error::CastError;
use minaret_types::{BroadcastKind, BroadcastStatus, Device, StopOutcome};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct ActiveBroadcast {
    kind: BroadcastKind,
    started_at: Instant,
    device_id: String,
    device_name: String,
    media_url: String,
}

/// Serializes broadcasts and answers "is one playing right now".
pub struct BroadcastController {
    ttl: Duration,
    active: Mutex<Option<ActiveBroadcast>>,
}

impl BroadcastController {
    pub fn new(ttl: Duration) -> Self {
        BroadcastController {
            ttl,
            active: Mutex::new(None),
        }
    }

    /// Claim the broadcast slot, or report the collision.
    ///
    /// Must be called before any network work; the slot is released
    /// with [`finish`](Self::finish) (also on failure).
    pub fn try_begin(
        &self,
        kind: BroadcastKind,
        device: &Device,
        media_url: &str,
    ) -> Result<(), CastError> {
        let mut active = self.active.lock();
        self.clear_if_stale(&mut active);
        if let Some(current) = active.as_ref() {
            return Err(CastError::BroadcastCollision {
                active: current.kind,
                elapsed_seconds: current.started_at.elapsed().as_secs_f64(),
            });
        }
        *active = Some(ActiveBroadcast {
            kind,
            started_at: Instant::now(),
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            media_url: media_url.to_string(),
        });
        debug!("broadcast slot claimed ({} on {})", kind, device.name);
        Ok(())
    }

    /// Collision check without claiming the slot.
    ///
    /// Lets the manager reject a colliding request before doing any
    /// device resolution; [`try_begin`](Self::try_begin) re-checks
    /// atomically when the slot is actually claimed.
    pub fn check_available(&self) -> Result<(), CastError> {
        let mut active = self.active.lock();
        self.clear_if_stale(&mut active);
        match active.as_ref() {
            Some(current) => Err(CastError::BroadcastCollision {
                active: current.kind,
                elapsed_seconds: current.started_at.elapsed().as_secs_f64(),
            }),
            None => Ok(()),
        }
    }

    /// Release the slot after the broadcast ended or failed.
    pub fn finish(&self) {
        if self.active.lock().take().is_some() {
            debug!("broadcast slot released");
        }
    }

    /// Release the slot for an explicit stop request.
    ///
    /// Reports whether anything was actually playing and for how long.
    /// A stale record counts as "nothing playing".
    pub fn stop(&self) -> StopOutcome {
        let mut active = self.active.lock();
        self.clear_if_stale(&mut active);
        match active.take() {
            Some(current) => {
                let elapsed = current.started_at.elapsed().as_secs_f64();
                info!(
                    "stopping {} broadcast on {} after {:.1}s",
                    current.kind, current.device_name, elapsed
                );
                StopOutcome {
                    was_playing: true,
                    elapsed_seconds: elapsed,
                }
            }
            None => StopOutcome {
                was_playing: false,
                elapsed_seconds: 0.0,
            },
        }
    }

    /// Current state as the API reports it. Staleness is resolved here
    /// too, so a status read never shows a broadcast past its TTL.
    pub fn status(&self) -> BroadcastStatus {
        let mut active = self.active.lock();
        self.clear_if_stale(&mut active);
        match active.as_ref() {
            Some(current) => BroadcastStatus {
                active: true,
                kind: Some(current.kind),
                device: Some(current.device_name.clone()),
                elapsed_seconds: current.started_at.elapsed().as_secs_f64(),
                media_url: Some(current.media_url.clone()),
            },
            None => BroadcastStatus::inactive(),
        }
    }

    /// Device id of the in-flight broadcast, if any.
    pub fn active_device_id(&self) -> Option<String> {
        let mut active = self.active.lock();
        self.clear_if_stale(&mut active);
        active.as_ref().map(|a| a.device_id.clone())
    }

    pub fn is_active(&self) -> bool {
        let mut active = self.active.lock();
        self.clear_if_stale(&mut active);
        active.is_some()
    }

    fn clear_if_stale(&self, active: &mut Option<ActiveBroadcast>) {
        if let Some(current) = active.as_ref() {
            let elapsed = current.started_at.elapsed();
            if elapsed >= self.ttl {
                warn!(
                    "clearing stale {} broadcast record ({}s old, ttl {}s)",
                    current.kind,
                    elapsed.as_secs(),
                    self.ttl.as_secs()
                );
                *active = None;
            }
        }
    }
}
