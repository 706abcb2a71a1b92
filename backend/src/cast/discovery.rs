//! Device discovery with result caching and a cooldown window.
//!
//! Enumeration strategies are tried in order; the first strategy that
//! returns a non-empty set is authoritative for the round and replaces
//! the cache wholesale. Raw strategy output is normalized into the
//! [`Device`] shape here, so nothing downstream ever branches on what a
//! particular enumeration backend happened to report.

use crate::cast::error::CastError;
use crate::events::EventBroadcaster;
use async_trait::async_trait;
use minaret_types::{Device, MinaretEvent};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Raw device description as reported by an enumeration strategy.
///
/// Strategies may report partial or duplicated candidates; the discovery
/// manager normalizes and deduplicates before anything enters the cache.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub id: Option<String>,
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub model: Option<String>,
    pub manufacturer: Option<String>,
}

/// One way of enumerating devices on the network.
#[async_trait]
pub trait EnumerationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Enumerate candidate devices, spending at most roughly `timeout`.
    async fn enumerate(&self, timeout: Duration) -> anyhow::Result<Vec<DeviceCandidate>>;
}

/// Result of one `discover` call.
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub devices: Vec<Device>,
    pub from_cache: bool,
    pub skipped: bool,
    /// Which strategy produced the result, when a network round ran.
    pub strategy: Option<&'static str>,
}

struct DiscoveryCache {
    /// Devices in the order the winning strategy reported them. Scan
    /// order matters for fallback selection, so this is a Vec rather
    /// than a map.
    devices: Vec<Device>,
    last_discovery: Option<Instant>,
}

/// Enumerates and caches devices, and picks the broadcast target.
pub struct DiscoveryManager {
    strategies: Vec<Arc<dyn EnumerationStrategy>>,
    cooldown: Duration,
    timeout: Duration,
    cache: RwLock<DiscoveryCache>,
    /// Serializes discovery rounds so at most one network sweep runs
    /// per cooldown window regardless of caller concurrency.
    round_lock: tokio::sync::Mutex<()>,
    events: EventBroadcaster,
}

impl DiscoveryManager {
    pub fn new(
        strategies: Vec<Arc<dyn EnumerationStrategy>>,
        cooldown: Duration,
        timeout: Duration,
        events: EventBroadcaster,
    ) -> Self {
        DiscoveryManager {
            strategies,
            cooldown,
            timeout,
            cache: RwLock::new(DiscoveryCache {
                devices: Vec::new(),
                last_discovery: None,
            }),
            round_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    /// Run a discovery round, or serve the cache when inside the
    /// cooldown window and `force` is false.
    pub async fn discover(&self, force: bool) -> Result<DiscoveryOutcome, CastError> {
        let _round = self.round_lock.lock().await;

        if !force {
            let cache = self.cache.read();
            if let Some(last) = cache.last_discovery {
                if last.elapsed() < self.cooldown {
                    debug!(
                        "discovery cooldown active ({}s remaining), serving {} cached device(s)",
                        (self.cooldown - last.elapsed()).as_secs(),
                        cache.devices.len()
                    );
                    return Ok(DiscoveryOutcome {
                        devices: cache.devices.clone(),
                        from_cache: true,
                        skipped: true,
                        strategy: None,
                    });
                }
            }
        }

        for strategy in &self.strategies {
            let candidates = match strategy.enumerate(self.timeout).await {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!("enumeration strategy '{}' failed: {}", strategy.name(), e);
                    continue;
                }
            };
            if candidates.is_empty() {
                debug!("enumeration strategy '{}' found nothing", strategy.name());
                continue;
            }

            let devices = normalize(candidates);
            info!(
                "strategy '{}' found {} device(s): {}",
                strategy.name(),
                devices.len(),
                devices
                    .iter()
                    .map(|d| d.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            let snapshot = {
                let mut cache = self.cache.write();
                for device in &devices {
                    if !cache.devices.iter().any(|d| d.id == device.id) {
                        self.events.broadcast(MinaretEvent::DeviceDiscovered {
                            device_id: device.id.clone(),
                            name: device.name.clone(),
                            model: device.model.clone(),
                        });
                    }
                }
                for old in &cache.devices {
                    if !devices.iter().any(|d| d.id == old.id) {
                        self.events.broadcast(MinaretEvent::DeviceRemoved {
                            device_id: old.id.clone(),
                            name: old.name.clone(),
                        });
                    }
                }
                cache.devices = devices;
                cache.last_discovery = Some(Instant::now());
                cache.devices.clone()
            };

            return Ok(DiscoveryOutcome {
                devices: snapshot,
                from_cache: false,
                skipped: false,
                strategy: Some(strategy.name()),
            });
        }

        // Every strategy came back empty; the previous cache stays as-is.
        warn!("no devices found by any enumeration strategy");
        Err(CastError::NoDevicesFound)
    }

    /// Pick the best broadcast target: a case-insensitive exact match on
    /// the primary name wins unconditionally, otherwise the first device
    /// matching the earliest entry of the ordered fallback model list.
    pub fn find_best(&self, primary_name: &str, fallback_models: &[String]) -> Option<Device> {
        let cache = self.cache.read();

        if let Some(device) = cache
            .devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(primary_name))
        {
            return Some(device.clone());
        }

        for model in fallback_models {
            if let Some(device) = cache.devices.iter().find(|d| &d.model == model) {
                debug!(
                    "primary device '{}' not found, falling back to {} ({})",
                    primary_name, device.name, device.model
                );
                return Some(device.clone());
            }
        }
        None
    }

    /// Case-insensitive lookup by display name.
    pub fn get(&self, name: &str) -> Option<Device> {
        self.cache
            .read()
            .devices
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Currently cached devices, in enumeration order.
    pub fn devices(&self) -> Vec<Device> {
        self.cache.read().devices.clone()
    }

    /// Drop every cached device and forget the last discovery time.
    pub fn clear(&self) {
        let mut cache = self.cache.write();
        cache.devices.clear();
        cache.last_discovery = None;
    }

    /// Note a connection failure against a cached device.
    pub fn record_failure(&self, device_id: &str) {
        let mut cache = self.cache.write();
        if let Some(device) = cache.devices.iter_mut().find(|d| d.id == device_id) {
            device.consecutive_failures += 1;
            device.available = false;
        }
    }

    /// Note a successful connection to a cached device.
    pub fn record_success(&self, device_id: &str) {
        let mut cache = self.cache.write();
        if let Some(device) = cache.devices.iter_mut().find(|d| d.id == device_id) {
            device.consecutive_failures = 0;
            device.available = true;
        }
    }
}

/// Normalize raw candidates into the `Device` shape, deduplicating on
/// identity and preserving first-encountered order.
fn normalize(candidates: Vec<DeviceCandidate>) -> Vec<Device> {
    let mut seen = HashSet::new();
    let mut devices = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let id = candidate
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| generate_id(&candidate.address, candidate.port));
        if !seen.insert(id.clone()) {
            continue;
        }
        devices.push(Device {
            id,
            name: candidate.name,
            address: candidate.address,
            port: candidate.port,
            model: candidate.model.unwrap_or_else(|| "Unknown".to_string()),
            manufacturer: candidate
                .manufacturer
                .unwrap_or_else(|| "Unknown".to_string()),
            available: true,
            consecutive_failures: 0,
        });
    }
    devices
}

/// Stable identity for candidates that did not announce one.
fn generate_id(address: &IpAddr, port: u16) -> String {
    let mut hasher = DefaultHasher::new();
    address.hash(&mut hasher);
    port.hash(&mut hasher);
    format!("cast-{:016x}", hasher.finish())
}
