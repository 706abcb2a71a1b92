//! Composition root for the cast orchestration core.
//!
//! [`CastManager`] owns discovery, the connection pool, playback and
//! the broadcast guard, and is the only surface the API layer and the
//! external scheduler talk to. `play_broadcast` never returns an error:
//! every failure comes back as a structured [`BroadcastOutcome`] so a
//! failed scheduled announcement can never take the caller down.

use crate::cast::broadcast::BroadcastController;
use crate::cast::discovery::{DiscoveryManager, DiscoveryOutcome};
use crate::cast::error::CastError;
use crate::cast::playback::{PlaybackController, PlaybackError, PlaybackReport};
use crate::cast::pool::ConnectionPool;
use crate::events::EventBroadcaster;
use minaret_types::api::{BreakerStatus, PoolStatusResponse};
use minaret_types::{
    BroadcastKind, BroadcastOutcome, BroadcastStatus, Device, MinaretEvent, StopOutcome,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Device selection and media addressing, from the `[device]` and
/// `[media]` config sections.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Device name that always wins selection when present.
    pub primary_device: String,
    /// Model names tried in order when the primary is absent.
    pub fallback_models: Vec<String>,
    /// Play attempts per broadcast (connection-stage retries).
    pub playback_max_retries: u32,
    /// Overrides the derived `http://<local-ip>:<port>` media base.
    pub media_base_url: Option<String>,
    /// Port the media files are served on when no base URL is set.
    pub media_port: u16,
    pub regular_media: String,
    pub fajr_media: String,
    pub content_type: String,
    /// Periodic background discovery refresh; disabled when `None`.
    pub refresh_interval: Option<Duration>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        ManagerSettings {
            primary_device: "Adahn".to_string(),
            fallback_models: vec![
                "Google Nest Mini".to_string(),
                "Google Nest Hub".to_string(),
                "Google Home".to_string(),
                "Google Home Mini".to_string(),
            ],
            playback_max_retries: 2,
            media_base_url: None,
            media_port: minaret_types::DEFAULT_PORT,
            regular_media: "azan.mp3".to_string(),
            fajr_media: "azan_fajr.mp3".to_string(),
            content_type: "audio/mpeg".to_string(),
            refresh_interval: None,
        }
    }
}

/// A failed broadcast and the play attempts it actually consumed.
struct BroadcastFailure {
    attempts: u32,
    error: CastError,
}

impl BroadcastFailure {
    /// Failure before playback started; no attempts were made.
    fn upfront(error: CastError) -> Self {
        BroadcastFailure { attempts: 0, error }
    }
}

pub struct CastManager {
    discovery: Arc<DiscoveryManager>,
    playback: PlaybackController,
    guard: BroadcastController,
    events: EventBroadcaster,
    settings: ManagerSettings,
    /// Last device a broadcast succeeded against, reused until a
    /// connection-stage failure invalidates it.
    target: tokio::sync::RwLock<Option<Device>>,
    shutdown_tx: parking_lot::Mutex<Option<broadcast::Sender<()>>>,
}

impl CastManager {
    pub fn new(
        discovery: Arc<DiscoveryManager>,
        playback: PlaybackController,
        guard: BroadcastController,
        events: EventBroadcaster,
        settings: ManagerSettings,
    ) -> Self {
        CastManager {
            discovery,
            playback,
            guard,
            events,
            settings,
            target: tokio::sync::RwLock::new(None),
            shutdown_tx: parking_lot::Mutex::new(None),
        }
    }

    /// Start the background loops: pool health checks and, when
    /// configured, periodic discovery refresh.
    pub fn start(&self) {
        self.playback.pool().clone().start();

        if let Some(interval) = self.settings.refresh_interval {
            let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
            *self.shutdown_tx.lock() = Some(shutdown_tx);

            let discovery = self.discovery.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await; // first tick fires immediately
                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            debug!("discovery refresh loop stopped");
                            break;
                        }
                        _ = ticker.tick() => {
                            if let Err(e) = discovery.discover(false).await {
                                debug!("background discovery refresh: {}", e);
                            }
                        }
                    }
                }
            });
            info!("discovery refresh every {}s", interval.as_secs());
        }
    }

    pub async fn shutdown(&self) {
        if let Some(tx) = self.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        self.playback.pool().shutdown().await;
    }

    /// Cast the announcement for `kind` to the best available device.
    pub async fn play_broadcast(&self, kind: BroadcastKind) -> BroadcastOutcome {
        let started = Instant::now();
        match self.run_broadcast(kind).await {
            Ok((device, report)) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    "{} broadcast confirmed on {} in {}ms ({} attempt(s))",
                    kind, device.name, elapsed_ms, report.attempts
                );
                self.events.broadcast(MinaretEvent::BroadcastFinished {
                    kind,
                    device: device.name.clone(),
                    elapsed_ms,
                });
                BroadcastOutcome {
                    success: true,
                    kind,
                    device: Some(device.name),
                    attempts: report.attempts,
                    elapsed_ms,
                    error_code: None,
                    error: None,
                }
            }
            Err(failure) => {
                warn!("{} broadcast failed: {}", kind, failure.error);
                self.events.broadcast(MinaretEvent::BroadcastFailed {
                    kind,
                    error: failure.error.to_string(),
                });
                BroadcastOutcome {
                    success: false,
                    kind,
                    device: None,
                    attempts: failure.attempts,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    error_code: Some(failure.error.code().to_string()),
                    error: Some(failure.error.to_string()),
                }
            }
        }
    }

    async fn run_broadcast(
        &self,
        kind: BroadcastKind,
    ) -> Result<(Device, PlaybackReport), BroadcastFailure> {
        // Reject collisions before any device resolution or network work.
        self.guard.check_available().map_err(BroadcastFailure::upfront)?;

        let device = self
            .resolve_target()
            .await
            .map_err(BroadcastFailure::upfront)?;
        let url = self.media_url_for(kind);
        self.guard
            .try_begin(kind, &device, &url)
            .map_err(BroadcastFailure::upfront)?;
        self.events.broadcast(MinaretEvent::BroadcastStarted {
            kind,
            device: device.name.clone(),
            media_url: url.clone(),
        });

        match self
            .playback
            .play(
                &device,
                &url,
                &self.settings.content_type,
                self.settings.playback_max_retries,
            )
            .await
        {
            Ok(report) => {
                // The slot stays claimed while the media plays; stop,
                // a later staleness check, or the TTL releases it.
                self.discovery.record_success(&device.id);
                Ok((device, report))
            }
            Err(PlaybackError { attempts, source }) => {
                self.guard.finish();
                if source.is_connection_failure() {
                    // The device moved or dropped off the network;
                    // forget it so the next broadcast re-resolves.
                    *self.target.write().await = None;
                    self.discovery.record_failure(&device.id);
                }
                Err(BroadcastFailure {
                    attempts,
                    error: source,
                })
            }
        }
    }

    /// Stop an active broadcast, best-effort stopping device playback.
    pub async fn stop_broadcast(&self) -> StopOutcome {
        let device_id = self.guard.active_device_id();
        let outcome = self.guard.stop();
        if !outcome.was_playing {
            return outcome;
        }

        let device = match device_id {
            Some(id) => self.discovery.devices().into_iter().find(|d| d.id == id),
            None => None,
        };
        if let Some(device) = device {
            match self.playback.pool().get_connection(&device).await {
                Ok(session) => {
                    if let Err(e) = session.stop().await {
                        warn!("stopping media on {} failed: {}", device.name, e);
                    }
                }
                Err(e) => warn!("could not reach {} to stop media: {}", device.name, e),
            }
        }
        self.events.broadcast(MinaretEvent::BroadcastStopped {
            elapsed_seconds: outcome.elapsed_seconds,
        });
        outcome
    }

    pub fn broadcast_status(&self) -> BroadcastStatus {
        self.guard.status()
    }

    /// The cached broadcast target, if one survived the last broadcast.
    pub async fn cached_target(&self) -> Option<Device> {
        self.target.read().await.clone()
    }

    async fn resolve_target(&self) -> Result<Device, CastError> {
        if let Some(device) = self.target.read().await.clone() {
            return Ok(device);
        }
        if self.discovery.devices().is_empty() {
            self.discovery.discover(false).await?;
        }
        let device = self
            .discovery
            .find_best(&self.settings.primary_device, &self.settings.fallback_models)
            .ok_or(CastError::NoSuitableDevice)?;
        info!("broadcast target resolved to {}", device);
        *self.target.write().await = Some(device.clone());
        Ok(device)
    }

    /// Where the media file for `kind` is served from.
    pub fn media_url_for(&self, kind: BroadcastKind) -> String {
        let file = match kind {
            BroadcastKind::Regular => &self.settings.regular_media,
            BroadcastKind::Fajr => &self.settings.fajr_media,
        };
        let base = match &self.settings.media_base_url {
            Some(base) => base.trim_end_matches('/').to_string(),
            None => format!(
                "http://{}:{}",
                crate::network::local_ip(),
                self.settings.media_port
            ),
        };
        format!("{}/media/{}", base, file)
    }

    // Dashboard surface, delegated to the owned components.

    pub async fn discover(&self, force: bool) -> Result<DiscoveryOutcome, CastError> {
        self.discovery.discover(force).await
    }

    pub fn devices(&self) -> Vec<Device> {
        self.discovery.devices()
    }

    pub fn get_device(&self, name: &str) -> Option<Device> {
        self.discovery.get(name)
    }

    pub fn pool_status(&self) -> PoolStatusResponse {
        self.playback.pool().status()
    }

    pub fn breaker_status(&self, name: &str) -> Option<BreakerStatus> {
        self.playback.pool().breakers().status_of(name)
    }

    pub fn breaker_statuses(&self) -> std::collections::HashMap<String, BreakerStatus> {
        self.playback.pool().breakers().statuses()
    }

    /// Manually reset a breaker. Returns false for unknown names.
    pub fn reset_breaker(&self, name: &str) -> bool {
        if self.playback.pool().breakers().status_of(name).is_none() {
            return false;
        }
        self.playback.pool().breakers().get(name).reset();
        info!("circuit breaker for {} reset by request", name);
        true
    }
}
