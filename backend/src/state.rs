//! Application state management.

use crate::cast::breaker::BreakerRegistry;
use crate::cast::broadcast::BroadcastController;
use crate::cast::castv2::CastV2SessionFactory;
use crate::cast::discovery::{DiscoveryManager, EnumerationStrategy};
use crate::cast::manager::CastManager;
use crate::cast::mdns::MdnsStrategy;
use crate::cast::playback::PlaybackController;
use crate::cast::pool::ConnectionPool;
use crate::cast::probe::StaticHostStrategy;
use crate::cast::session::SessionFactory;
use crate::config::Config;
use crate::events::EventBroadcaster;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Loaded configuration
    config: Config,
    /// Cast orchestration facade
    manager: CastManager,
    /// Event broadcaster for real-time updates
    events: EventBroadcaster,
}

impl AppState {
    /// Create new application state from explicit enumeration strategies
    /// and a session factory. Tests inject doubles here.
    pub fn new(
        config: Config,
        strategies: Vec<Arc<dyn EnumerationStrategy>>,
        factory: Arc<dyn SessionFactory>,
    ) -> Self {
        let events = EventBroadcaster::default();

        let discovery = Arc::new(DiscoveryManager::new(
            strategies,
            config.discovery_cooldown(),
            config.discovery_timeout(),
            events.clone(),
        ));
        let breakers = Arc::new(BreakerRegistry::new(
            config.breaker.failure_threshold,
            config.breaker_recovery_timeout(),
        ));
        let pool = ConnectionPool::new(
            config.pool_settings(),
            factory,
            breakers,
            events.clone(),
        );
        let playback = PlaybackController::new(pool, config.playback_settings());
        let guard = BroadcastController::new(config.broadcast_ttl());
        let manager = CastManager::new(
            discovery,
            playback,
            guard,
            events.clone(),
            config.manager_settings(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                manager,
                events,
            }),
        }
    }

    /// Create application state wired to real devices: mDNS discovery
    /// (plus static host probing when configured) over the CASTV2
    /// session factory.
    pub fn with_cast_stack(config: Config) -> Self {
        let mut strategies: Vec<Arc<dyn EnumerationStrategy>> = vec![Arc::new(MdnsStrategy::new())];
        if !config.discovery.static_hosts.is_empty() {
            strategies.push(Arc::new(StaticHostStrategy::new(
                config.discovery.static_hosts.clone(),
                Duration::from_secs(config.connection.probe_timeout_secs),
            )));
        }
        let factory = Arc::new(CastV2SessionFactory::new(Duration::from_secs(
            config.connection.handshake_timeout_secs,
        )));
        Self::new(config, strategies, factory)
    }

    /// Get the cast manager.
    pub fn manager(&self) -> &CastManager {
        &self.inner.manager
    }

    /// Get the event broadcaster.
    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the media files directory path.
    pub fn media_path(&self) -> &PathBuf {
        &self.inner.config.media_path
    }

    /// Start background services (pool health checks, discovery refresh).
    pub fn start_services(&self) {
        info!("Starting cast background services...");
        self.inner.manager.start();
    }

    /// Stop background loops and close pooled sessions.
    pub async fn shutdown(&self) {
        self.inner.manager.shutdown().await;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::with_cast_stack(Config::default())
    }
}
