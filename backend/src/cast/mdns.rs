//! mDNS enumeration of cast devices.
//!
//! Browses `_googlecast._tcp.local.` for the discovery window and turns
//! resolved services into device candidates. Cast devices announce their
//! display name, model and identity in TXT records (`fn`, `md`, `id`).

use crate::cast::discovery::{DeviceCandidate, EnumerationStrategy};
use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Service type cast devices announce themselves under.
pub const CAST_SERVICE_TYPE: &str = "_googlecast._tcp.local.";

/// Enumerates cast devices via mDNS.
#[derive(Default)]
pub struct MdnsStrategy;

impl MdnsStrategy {
    pub fn new() -> Self {
        MdnsStrategy
    }
}

#[async_trait]
impl EnumerationStrategy for MdnsStrategy {
    fn name(&self) -> &'static str {
        "mdns"
    }

    async fn enumerate(&self, timeout: Duration) -> anyhow::Result<Vec<DeviceCandidate>> {
        let daemon = ServiceDaemon::new()?;
        let receiver = daemon.browse(CAST_SERVICE_TYPE)?;
        let deadline = tokio::time::Instant::now() + timeout;
        let mut candidates = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, receiver.recv_async()).await {
                Ok(Ok(ServiceEvent::ServiceResolved(info))) => {
                    // Prefer an IPv4 address; cast devices listen on v4.
                    let address = info
                        .addresses
                        .iter()
                        .filter_map(|a| IpAddr::from_str(&a.to_string()).ok())
                        .find(|a| a.is_ipv4());
                    let Some(address) = address else {
                        debug!("skipping {} (no usable address)", info.fullname);
                        continue;
                    };

                    let name = txt_value(&info.txt_properties, "fn")
                        .unwrap_or_else(|| instance_name(&info.fullname));
                    candidates.push(DeviceCandidate {
                        id: txt_value(&info.txt_properties, "id"),
                        name,
                        address,
                        port: info.port,
                        model: txt_value(&info.txt_properties, "md"),
                        manufacturer: Some("Google Inc.".to_string()),
                    });
                }
                Ok(Ok(_)) => {
                    // SearchStarted and friends - ignore
                }
                Ok(Err(e)) => {
                    warn!("mDNS receiver error: {}", e);
                    break;
                }
                Err(_) => break, // browse window elapsed
            }
        }

        if let Err(e) = daemon.stop_browse(CAST_SERVICE_TYPE) {
            debug!("stop_browse failed: {}", e);
        }
        if let Err(e) = daemon.shutdown() {
            debug!("mDNS daemon shutdown failed: {}", e);
        }
        Ok(candidates)
    }
}

/// Extract a TXT record value by key.
///
/// Some mDNS stacks include the `key=` prefix in the stringified
/// property, so it is stripped when present.
fn txt_value(props: &mdns_sd::TxtProperties, key: &str) -> Option<String> {
    props
        .get(key)
        .map(|p| {
            let s = p.to_string();
            match s.strip_prefix(&format!("{}=", key)) {
                Some(stripped) => stripped.to_string(),
                None => s,
            }
        })
        .filter(|s| !s.is_empty())
}

/// Instance part of an mDNS fullname, used when no `fn` TXT record exists.
fn instance_name(fullname: &str) -> String {
    fullname
        .split('.')
        .next()
        .unwrap_or(fullname)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_name() {
        assert_eq!(
            instance_name("Adahn-3f9a._googlecast._tcp.local."),
            "Adahn-3f9a"
        );
        assert_eq!(instance_name("plain"), "plain");
    }
}
