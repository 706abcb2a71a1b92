//! Per-device connection pool with liveness validation.
//!
//! At most one live session exists per device identity. Entries are
//! validated on checkout (idle TTL, reachability probe, status query)
//! and by a background health-check loop. Session creation goes through
//! the device's circuit breaker and a per-device creation lock, so
//! concurrent checkouts for the same device serialize instead of racing
//! to open duplicate sessions.

use crate::cast::breaker::BreakerRegistry;
use crate::cast::error::CastError;
use crate::cast::session::{MediaSession, SessionError, SessionFactory};
use crate::events::EventBroadcaster;
use minaret_types::api::{PoolStatusResponse, PooledConnectionInfo};
use minaret_types::{Device, MinaretEvent};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Pool tuning knobs, filled from the `[connection]` config section.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Idle age beyond which a pooled session fails validation.
    pub cache_ttl: Duration,
    /// Budget for the TCP reachability probe.
    pub probe_timeout: Duration,
    /// Budget for one protocol handshake attempt.
    pub handshake_timeout: Duration,
    /// Handshake attempts per session creation.
    pub max_retries: u32,
    /// Fixed delay between handshake attempts.
    pub retry_delay: Duration,
    /// Background validation sweep interval.
    pub health_check_interval: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        PoolSettings {
            cache_ttl: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(3),
            handshake_timeout: Duration::from_secs(10),
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            health_check_interval: Duration::from_secs(30),
        }
    }
}

struct PooledConnection {
    device: Device,
    session: Arc<dyn MediaSession>,
    connected: bool,
    use_count: u64,
    last_used: Instant,
    last_validated: Instant,
}

/// Per-device connection counters, cleared by `cleanup`.
#[derive(Debug, Default, Clone)]
pub struct DeviceStats {
    pub created: u64,
    pub reused: u64,
    pub evicted: u64,
}

struct PoolInner {
    settings: PoolSettings,
    factory: Arc<dyn SessionFactory>,
    breakers: Arc<BreakerRegistry>,
    connections: RwLock<HashMap<String, PooledConnection>>,
    creation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    stats: Mutex<HashMap<String, DeviceStats>>,
    events: EventBroadcaster,
    shutdown_tx: Mutex<Option<broadcast::Sender<()>>>,
}

/// Owns every live session. Cheap to clone.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

impl ConnectionPool {
    pub fn new(
        settings: PoolSettings,
        factory: Arc<dyn SessionFactory>,
        breakers: Arc<BreakerRegistry>,
        events: EventBroadcaster,
    ) -> Self {
        ConnectionPool {
            inner: Arc::new(PoolInner {
                settings,
                factory,
                breakers,
                connections: RwLock::new(HashMap::new()),
                creation_locks: Mutex::new(HashMap::new()),
                stats: Mutex::new(HashMap::new()),
                events,
                shutdown_tx: Mutex::new(None),
            }),
        }
    }

    pub fn breakers(&self) -> Arc<BreakerRegistry> {
        self.inner.breakers.clone()
    }

    /// Hand out a validated session for the device, creating one when
    /// the pool has none.
    pub async fn get_connection(
        &self,
        device: &Device,
    ) -> Result<Arc<dyn MediaSession>, CastError> {
        let creation_lock = {
            let mut locks = self.inner.creation_locks.lock();
            locks
                .entry(device.id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _guard = creation_lock.lock().await;

        let existing = {
            let connections = self.inner.connections.read();
            connections
                .get(&device.id)
                .map(|c| (c.session.clone(), c.last_used))
        };
        if let Some((session, last_used)) = existing {
            match self.inner.validate(device, &session, last_used).await {
                Ok(()) => {
                    let now = Instant::now();
                    let mut connections = self.inner.connections.write();
                    if let Some(conn) = connections.get_mut(&device.id) {
                        conn.use_count += 1;
                        conn.last_used = now;
                        conn.last_validated = now;
                    }
                    self.inner
                        .stats
                        .lock()
                        .entry(device.id.clone())
                        .or_default()
                        .reused += 1;
                    debug!("reusing pooled session for {}", device.name);
                    return Ok(session);
                }
                Err(reason) => {
                    debug!("pooled session for {} failed validation: {}", device.name, reason);
                    self.inner.evict(&device.id, &reason);
                }
            }
        }

        self.establish(device).await
    }

    /// Build a fresh session through the device's circuit breaker.
    async fn establish(&self, device: &Device) -> Result<Arc<dyn MediaSession>, CastError> {
        let settings = &self.inner.settings;
        let breaker = self.inner.breakers.get(&device.name);
        breaker.try_acquire()?;

        // Cheap reachability probe before the expensive handshake.
        if !self.inner.probe(device).await {
            if breaker.record_failure("unreachable") {
                self.emit_breaker_opened(&device.name, &breaker);
            }
            return Err(CastError::Unreachable {
                name: device.name.clone(),
                endpoint: device.endpoint(),
            });
        }

        let attempts = settings.max_retries.max(1);
        let mut last_error: Option<CastError> = None;
        for attempt in 1..=attempts {
            match self
                .inner
                .factory
                .open(device, settings.handshake_timeout)
                .await
            {
                Ok(session) => {
                    if breaker.record_success() {
                        self.inner
                            .events
                            .broadcast(MinaretEvent::BreakerClosed {
                                device: device.name.clone(),
                            });
                    }
                    let now = Instant::now();
                    self.inner.connections.write().insert(
                        device.id.clone(),
                        PooledConnection {
                            device: device.clone(),
                            session: session.clone(),
                            connected: true,
                            use_count: 1,
                            last_used: now,
                            last_validated: now,
                        },
                    );
                    self.inner
                        .stats
                        .lock()
                        .entry(device.id.clone())
                        .or_default()
                        .created += 1;
                    self.inner
                        .events
                        .broadcast(MinaretEvent::ConnectionEstablished {
                            device_id: device.id.clone(),
                            name: device.name.clone(),
                        });
                    info!("session to {} established (attempt {})", device.name, attempt);
                    return Ok(session);
                }
                Err(SessionError::Timeout(t)) => {
                    warn!(
                        "handshake with {} timed out (attempt {}/{})",
                        device.name, attempt, attempts
                    );
                    last_error = Some(CastError::HandshakeTimeout {
                        name: device.name.clone(),
                        timeout_secs: t.as_secs(),
                    });
                }
                Err(e) => {
                    warn!(
                        "handshake with {} failed (attempt {}/{}): {}",
                        device.name, attempt, attempts, e
                    );
                    last_error = Some(CastError::Session(e));
                }
            }
            if attempt < attempts {
                tokio::time::sleep(settings.retry_delay).await;
            }
        }

        // Loop above always sets last_error before falling through.
        let last = last_error.unwrap_or(CastError::NoSuitableDevice);
        let reason = match &last {
            CastError::HandshakeTimeout { .. } => "handshake_timeout",
            _ => "handshake_failed",
        };
        if breaker.record_failure(reason) {
            self.emit_breaker_opened(&device.name, &breaker);
        }
        if attempts == 1 {
            Err(last)
        } else {
            Err(CastError::MaxRetriesExceeded {
                name: device.name.clone(),
                attempts,
                last_error: last.to_string(),
            })
        }
    }

    fn emit_breaker_opened(&self, device: &str, breaker: &crate::cast::breaker::CircuitBreaker) {
        let status = breaker.status();
        self.inner.events.broadcast(MinaretEvent::BreakerOpened {
            device: device.to_string(),
            failure_count: status.failure_count,
            retry_in_secs: status.retry_in_secs.unwrap_or(0),
        });
    }

    /// Start the background health-check loop.
    pub fn start(&self) {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
        *self.inner.shutdown_tx.lock() = Some(shutdown_tx);

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.settings.health_check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // first tick fires immediately
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("connection pool health loop stopped");
                        break;
                    }
                    _ = interval.tick() => {
                        inner.health_sweep().await;
                    }
                }
            }
        });
        info!(
            "connection pool health checks every {}s",
            self.inner.settings.health_check_interval.as_secs()
        );
    }

    /// Stop the health loop and close every pooled session.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.inner.shutdown_tx.lock().take() {
            let _ = tx.send(());
        }
        self.cleanup().await;
    }

    /// Best-effort close of every session, then clear pool and stats.
    pub async fn cleanup(&self) {
        let drained: Vec<(String, PooledConnection)> =
            self.inner.connections.write().drain().collect();
        for (_, conn) in drained {
            if let Err(e) = conn.session.close().await {
                debug!("closing session to {} failed: {}", conn.device.name, e);
            }
        }
        self.inner.stats.lock().clear();
        info!("connection pool cleared");
    }

    pub fn status(&self) -> PoolStatusResponse {
        let connections = self.inner.connections.read();
        PoolStatusResponse {
            active_connections: connections
                .values()
                .map(|c| PooledConnectionInfo {
                    device_id: c.device.id.clone(),
                    device_name: c.device.name.clone(),
                    connected: c.connected,
                    use_count: c.use_count,
                    idle_secs: c.last_used.elapsed().as_secs(),
                    last_validated_secs: c.last_validated.elapsed().as_secs(),
                })
                .collect(),
            circuit_breakers: self.inner.breakers.statuses(),
        }
    }

    /// Per-device counters, mainly for tests and debug logging.
    pub fn stats_for(&self, device_id: &str) -> DeviceStats {
        self.inner
            .stats
            .lock()
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl PoolInner {
    /// TCP connect probe against the device endpoint.
    async fn probe(&self, device: &Device) -> bool {
        matches!(
            tokio::time::timeout(
                self.settings.probe_timeout,
                tokio::net::TcpStream::connect((device.address, device.port)),
            )
            .await,
            Ok(Ok(_))
        )
    }

    /// Check a pooled entry without holding the map lock.
    async fn validate(
        &self,
        device: &Device,
        session: &Arc<dyn MediaSession>,
        last_used: Instant,
    ) -> Result<(), String> {
        if last_used.elapsed() > self.settings.cache_ttl {
            return Err(format!(
                "idle for {}s (ttl {}s)",
                last_used.elapsed().as_secs(),
                self.settings.cache_ttl.as_secs()
            ));
        }
        if !self.probe(device).await {
            return Err("endpoint unreachable".to_string());
        }
        session
            .refresh_status()
            .await
            .map_err(|e| format!("status check failed: {}", e))?;
        Ok(())
    }

    /// Remove an entry and close its session in the background.
    fn evict(&self, device_id: &str, reason: &str) {
        let removed = self.connections.write().remove(device_id);
        if let Some(conn) = removed {
            self.stats.lock().entry(device_id.to_string()).or_default().evicted += 1;
            self.events.broadcast(MinaretEvent::ConnectionEvicted {
                device_id: device_id.to_string(),
                reason: reason.to_string(),
            });
            let session = conn.session;
            tokio::spawn(async move {
                let _ = session.close().await;
            });
        }
    }

    /// Validate every entry; evict the ones that fail.
    ///
    /// Validation runs against a snapshot so foreground checkouts are
    /// never blocked on network calls. An entry is only evicted if it
    /// was not refreshed while the sweep ran.
    async fn health_sweep(&self) {
        let snapshot: Vec<(String, Device, Arc<dyn MediaSession>, Instant)> = {
            let connections = self.connections.read();
            connections
                .iter()
                .map(|(id, c)| (id.clone(), c.device.clone(), c.session.clone(), c.last_used))
                .collect()
        };
        if snapshot.is_empty() {
            return;
        }
        debug!("health check validating {} pooled session(s)", snapshot.len());

        for (id, device, session, seen_last_used) in snapshot {
            if let Err(reason) = self.validate(&device, &session, seen_last_used).await {
                let still_stale = {
                    let connections = self.connections.read();
                    connections
                        .get(&id)
                        .map(|c| c.last_used == seen_last_used)
                        .unwrap_or(false)
                };
                if still_stale {
                    warn!("health check evicting session to {}: {}", device.name, reason);
                    self.evict(&id, &reason);
                }
            } else {
                let mut connections = self.connections.write();
                if let Some(conn) = connections.get_mut(&id) {
                    conn.last_validated = Instant::now();
                }
            }
        }
    }
}
