//! Local address detection for building media URLs.

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use std::net::{IpAddr, Ipv4Addr};

/// Get the source IPv4 address that the kernel would use to reach the given destination.
///
/// This uses the UDP connect() + getsockname() trick: by "connecting" a UDP socket
/// to the destination (no actual packets are sent), we can ask the kernel which
/// local address it would use based on the routing table.
pub fn get_source_ipv4_for_destination(dest: &str) -> Option<Ipv4Addr> {
    use std::net::UdpSocket;

    // Create an unbound UDP socket
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;

    // "Connect" to the destination - this doesn't send any packets for UDP,
    // but it does cause the kernel to select a source address based on routing
    let dest_with_port = if dest.contains(':') {
        dest.to_string()
    } else {
        format!("{}:9", dest) // Use discard port, doesn't matter for UDP connect
    };
    socket.connect(&dest_with_port).ok()?;

    // Get the local address the kernel selected
    let local_addr = socket.local_addr().ok()?;

    match local_addr.ip() {
        IpAddr::V4(ipv4) => Some(ipv4),
        IpAddr::V6(_) => None,
    }
}

/// Get the default local IPv4 address by asking the kernel which address it would
/// use to reach a public IP (8.8.8.8). This is more reliable than iterating
/// interfaces, as it respects the routing table.
///
/// Falls back to interface iteration if the routing query fails.
pub fn get_default_ipv4() -> Option<Ipv4Addr> {
    // First, try to get the source IP for a well-known destination
    // This respects the routing table and default gateway
    if let Some(ip) = get_source_ipv4_for_destination("8.8.8.8") {
        return Some(ip);
    }

    // Fallback: iterate interfaces
    let interfaces = NetworkInterface::show().ok()?;

    for iface in interfaces {
        // Skip loopback interfaces
        if iface.name.starts_with("lo") {
            continue;
        }

        for addr in iface.addr {
            if let Addr::V4(v4) = addr {
                let ip = v4.ip;
                // Skip loopback and link-local addresses
                if !ip.is_loopback() && !ip.is_link_local() {
                    return Some(ip);
                }
            }
        }
    }

    None
}

/// Address to advertise in media URLs handed to cast devices.
///
/// Cast devices fetch media over the LAN, so a loopback fallback only
/// matters for tests and single-host setups.
pub fn local_ip() -> IpAddr {
    match get_default_ipv4() {
        Some(ip) => IpAddr::V4(ip),
        None => IpAddr::V4(Ipv4Addr::LOCALHOST),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_source_ipv4_for_destination() {
        // Query for a public IP - should return a non-loopback address
        if let Some(ip) = get_source_ipv4_for_destination("8.8.8.8") {
            assert!(
                !ip.is_loopback(),
                "Should not return loopback for public destination"
            );
            assert!(!ip.is_unspecified(), "Should not return 0.0.0.0");
        }
        // It's OK if this returns None (e.g., no network connectivity)
    }

    #[test]
    fn test_get_default_ipv4() {
        // Should return some IP on a system with network connectivity
        if let Some(ip) = get_default_ipv4() {
            assert!(!ip.is_loopback(), "Default IP should not be loopback");
            assert!(!ip.is_unspecified(), "Default IP should not be 0.0.0.0");
        }
    }

    #[test]
    fn test_local_ip_never_unspecified() {
        assert!(!local_ip().is_unspecified());
    }
}
