use http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// Label used when neither a forwarding header nor a peer address exists.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp {
    /// First forwarded hop without its port; the key every count uses.
    pub ip: String,
    /// The forwarding header as received, or the peer address.
    pub real_ip: String,
}

pub fn extract(headers: &HeaderMap, peer: Option<SocketAddr>) -> ClientIp {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = match (forwarded, peer) {
        (Some(header), _) => header.to_string(),
        (None, Some(peer)) => peer.to_string(),
        (None, None) => return ClientIp { ip: UNKNOWN.into(), real_ip: String::new() },
    };

    let first = real_ip.split(',').next().unwrap_or_default().trim();
    let ip = match strip_port(first) {
        "" => UNKNOWN.to_string(),
        ip => ip.to_string(),
    };
    ClientIp { ip, real_ip }
}

/// Remove a trailing `:port`, keeping IPv6 literals intact.
///
/// `[::1]:443` and `[::1]` become `::1`; a bare `::1` is left alone.
pub fn strip_port(addr: &str) -> &str {
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    if addr.parse::<IpAddr>().is_ok() {
        return addr;
    }
    match addr.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => addr,
    }
}
