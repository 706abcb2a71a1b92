//! Playback with load confirmation.
//!
//! Loading media on a cast device is fire-and-forget at the protocol
//! level, so the controller polls the device until it observes the
//! media actually running. Polling is tiered (quick checks first, then
//! progressively longer waits) and debounced: transient `BUFFERING ->
//! IDLE -> BUFFERING` flickers during startup reset the confirmation
//! count instead of failing the load.

use crate::cast::error::CastError;
use crate::cast::pool::ConnectionPool;
use crate::cast::session::MediaSession;
use minaret_types::{Device, PlayerState};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Poll pacing and confirmation knobs, from the `[playback]` section.
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    /// Delay between whole play attempts after a retryable failure.
    pub retry_delay: Duration,
    /// Status polls per load before giving up.
    pub load_max_attempts: u32,
    /// Settle time between issuing the load and the first poll.
    pub initial_wait: Duration,
    /// Poll spacing for polls 1-3.
    pub short_wait: Duration,
    /// Poll spacing for polls 4-6.
    pub medium_wait: Duration,
    /// Poll spacing from poll 7 on.
    pub long_wait: Duration,
    /// Settle time after stopping foreign media.
    pub stop_wait: Duration,
    /// Settle time after stopping our own media for a restart.
    pub restart_wait: Duration,
    /// Consecutive active polls required to confirm playback.
    pub consecutive_threshold: u32,
    /// Poll count after which persistent IDLE is logged as a concern.
    pub idle_concern_threshold: u32,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        PlaybackSettings {
            retry_delay: Duration::from_secs(2),
            load_max_attempts: 15,
            initial_wait: Duration::from_millis(500),
            short_wait: Duration::from_secs(1),
            medium_wait: Duration::from_secs(2),
            long_wait: Duration::from_secs(3),
            stop_wait: Duration::from_millis(1500),
            restart_wait: Duration::from_secs(1),
            consecutive_threshold: 2,
            idle_concern_threshold: 8,
        }
    }
}

/// What a successful play call did.
#[derive(Debug, Clone)]
pub struct PlaybackReport {
    /// Play attempts consumed, including the successful one.
    pub attempts: u32,
    pub elapsed: Duration,
    /// Player states observed while confirming, in poll order.
    pub observed: Vec<PlayerState>,
}

/// A failed play call and the attempts it consumed before giving up.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct PlaybackError {
    pub attempts: u32,
    #[source]
    pub source: CastError,
}

/// Drives load/confirm cycles through the connection pool.
#[derive(Clone)]
pub struct PlaybackController {
    pool: ConnectionPool,
    settings: PlaybackSettings,
}

impl PlaybackController {
    pub fn new(pool: ConnectionPool, settings: PlaybackSettings) -> Self {
        PlaybackController { pool, settings }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Load `url` on the device and wait until playback is confirmed.
    ///
    /// Connection-stage and load failures are retried up to
    /// `max_retries` times beyond the initial attempt; a confirmation
    /// timeout is terminal because the device demonstrably received
    /// the load and refused to play.
    pub async fn play(
        &self,
        device: &Device,
        url: &str,
        content_type: &str,
        max_retries: u32,
    ) -> Result<PlaybackReport, PlaybackError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(PlaybackError {
                attempts: 0,
                source: CastError::InvalidUrl {
                    url: url.to_string(),
                },
            });
        }

        let started = Instant::now();
        // Initial attempt plus max_retries retries.
        let budget = max_retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_once(device, url, content_type).await {
                Ok(observed) => {
                    info!(
                        "playback of {} confirmed on {} after {} attempt(s)",
                        url, device.name, attempt
                    );
                    return Ok(PlaybackReport {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                        observed,
                    });
                }
                Err(e) if e.is_retryable() && attempt < budget => {
                    warn!(
                        "play attempt {}/{} on {} failed: {}",
                        attempt, budget, device.name, e
                    );
                    tokio::time::sleep(self.settings.retry_delay).await;
                }
                Err(e) => {
                    return Err(PlaybackError {
                        attempts: attempt,
                        source: e,
                    })
                }
            }
        }
    }

    async fn try_once(
        &self,
        device: &Device,
        url: &str,
        content_type: &str,
    ) -> Result<Vec<PlayerState>, CastError> {
        let session = self.pool.get_connection(device).await?;
        self.stop_existing(&session, device, url).await;
        session.load(url, content_type).await?;
        debug!("load of {} issued to {}", url, device.name);
        self.wait_for_playback(&session, device).await
    }

    /// Stop whatever the device is doing before loading.
    ///
    /// Re-loading over live media (notably the same URL again) is
    /// silently ignored by some receivers, so a stop-first pass makes
    /// repeat broadcasts deterministic. Failures here are logged and
    /// ignored; the load itself will surface real problems.
    async fn stop_existing(&self, session: &Arc<dyn MediaSession>, device: &Device, url: &str) {
        let snapshot = match session.refresh_status().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("pre-load status check on {} failed: {}", device.name, e);
                return;
            }
        };
        if snapshot.content_id.is_none() && !snapshot.player_state.is_active() {
            return;
        }

        let same_media = snapshot.content_id.as_deref() == Some(url);
        debug!(
            "stopping current media on {} ({}, same_media={})",
            device.name, snapshot.player_state, same_media
        );
        if let Err(e) = session.stop().await {
            debug!("pre-load stop on {} failed: {}", device.name, e);
            return;
        }
        let settle = if same_media {
            self.settings.restart_wait
        } else {
            self.settings.stop_wait
        };
        tokio::time::sleep(settle).await;
    }

    /// Poll until playback is confirmed or the attempt budget runs out.
    ///
    /// A single `PLAYING` observation confirms immediately; `BUFFERING`
    /// must hold for `consecutive_threshold` polls.
    async fn wait_for_playback(
        &self,
        session: &Arc<dyn MediaSession>,
        device: &Device,
    ) -> Result<Vec<PlayerState>, CastError> {
        let settings = &self.settings;
        let mut observed = Vec::new();
        let mut consecutive_active = 0u32;

        tokio::time::sleep(settings.initial_wait).await;
        for poll in 1..=settings.load_max_attempts {
            let state = match session.refresh_status().await {
                Ok(snapshot) => snapshot.player_state,
                Err(e) => {
                    debug!("status poll {} on {} failed: {}", poll, device.name, e);
                    PlayerState::Unknown
                }
            };
            observed.push(state);

            if state == PlayerState::Playing {
                return Ok(observed);
            }
            if state.is_active() {
                consecutive_active += 1;
                if consecutive_active >= settings.consecutive_threshold {
                    return Ok(observed);
                }
            } else {
                // Startup flicker; confirmation starts over.
                consecutive_active = 0;
            }

            if matches!(state, PlayerState::Idle | PlayerState::Unknown)
                && poll >= settings.idle_concern_threshold
            {
                warn!(
                    "{} still {} after {} polls, load may have been dropped",
                    device.name, state, poll
                );
            }

            if poll < settings.load_max_attempts {
                tokio::time::sleep(self.poll_wait(poll)).await;
            }
        }

        Err(CastError::LoadTimeout {
            name: device.name.clone(),
            attempts: settings.load_max_attempts,
            observed,
        })
    }

    /// Tiered poll spacing: quick first checks, longer tail.
    fn poll_wait(&self, poll: u32) -> Duration {
        if poll <= 3 {
            self.settings.short_wait
        } else if poll <= 6 {
            self.settings.medium_wait
        } else {
            self.settings.long_wait
        }
    }
}
