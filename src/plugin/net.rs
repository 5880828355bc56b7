use super::context::InboundRequest;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::debug;

const IPV4_MAPPED_PREFIX: &str = "::ffff:";

/// Best guess at the real client address.
///
/// The first `x-forwarded-for` hop wins, then `x-real-ip`, then the socket
/// peer. Without a peer address the result is empty.
pub fn client_ip(req: &InboundRequest) -> String {
    let Some(peer) = req.remote_addr else {
        return String::new();
    };
    let mut ip = peer.ip().to_string();

    if let Some(forwarded) = req.header("x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        if !first.is_empty() {
            ip = first.to_string();
        }
    } else if let Some(real_ip) = req.header("x-real-ip") {
        ip = real_ip.to_string();
    }

    match ip.strip_prefix(IPV4_MAPPED_PREFIX) {
        Some(v4) => v4.to_string(),
        None => ip,
    }
}

/// This host's intranet address, used as the directory's self key.
///
/// `configured` wins when set. Otherwise the address of the interface that
/// would route to the outside world is used (no packet is sent), falling
/// back to loopback.
pub fn intranet_ip(configured: Option<&str>) -> String {
    if let Some(ip) = configured.filter(|ip| !ip.is_empty()) {
        return ip.to_string();
    }

    match outbound_interface_ip() {
        Some(ip) => ip.to_string(),
        None => {
            debug!("Could not determine intranet address, using loopback");
            Ipv4Addr::LOCALHOST.to_string()
        }
    }
}

fn outbound_interface_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    (!ip.is_unspecified() && !ip.is_loopback()).then_some(ip)
}
