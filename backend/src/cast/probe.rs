//! Static-host enumeration strategy.
//!
//! Fallback for networks where mDNS is filtered: probes a configured
//! list of `host[:port]` entries with a plain TCP connect and reports
//! the ones that answer. Names and models come out generic, which is
//! enough for `find_best` to match a configured primary host entry.

use crate::cast::discovery::{DeviceCandidate, EnumerationStrategy};
use async_trait::async_trait;
use minaret_types::DEFAULT_CAST_PORT;
use std::time::Duration;
use tokio::net::{lookup_host, TcpStream};
use tracing::debug;

pub struct StaticHostStrategy {
    hosts: Vec<String>,
    probe_timeout: Duration,
}

impl StaticHostStrategy {
    pub fn new(hosts: Vec<String>, probe_timeout: Duration) -> Self {
        StaticHostStrategy {
            hosts,
            probe_timeout,
        }
    }
}

#[async_trait]
impl EnumerationStrategy for StaticHostStrategy {
    fn name(&self) -> &'static str {
        "static-hosts"
    }

    async fn enumerate(&self, _timeout: Duration) -> anyhow::Result<Vec<DeviceCandidate>> {
        let mut candidates = Vec::new();
        for spec in &self.hosts {
            let (host, port) = split_host_port(spec);
            let addr = match lookup_host((host.as_str(), port)).await {
                Ok(mut addrs) => addrs.find(|a| a.is_ipv4()),
                Err(e) => {
                    debug!("static host '{}' did not resolve: {}", spec, e);
                    None
                }
            };
            let Some(addr) = addr else { continue };

            match tokio::time::timeout(self.probe_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_)) => {
                    candidates.push(DeviceCandidate {
                        id: None,
                        name: host.clone(),
                        address: addr.ip(),
                        port,
                        model: None,
                        manufacturer: None,
                    });
                }
                Ok(Err(e)) => debug!("static host '{}' refused: {}", spec, e),
                Err(_) => debug!("static host '{}' probe timed out", spec),
            }
        }
        Ok(candidates)
    }
}

fn split_host_port(spec: &str) -> (String, u16) {
    match spec.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (spec.to_string(), DEFAULT_CAST_PORT),
        },
        None => (spec.to_string(), DEFAULT_CAST_PORT),
    }
}
