//! Client-IP extraction for rate-limit keys.
//!
//! Forwarded headers are attacker-controlled unless the immediate peer is
//! a proxy we operate, so:
//!
//! - not behind a proxy → the socket peer is the client;
//! - behind a proxy but the peer is *not* in a trusted CIDR → the peer is
//!   the client and every forwarded header is ignored;
//! - behind a trusted proxy → walk `X-Forwarded-For` right to left and
//!   take the first hop that is not one of our proxies, falling back to
//!   `X-Real-IP`, then the peer.

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;

/// Derives the rate-limit key for a request.
///
/// Returns `None` only when there is no socket peer at all (e.g. a
/// malformed transport), which callers treat as an unratelimitable
/// request and reject.
pub fn client_ip(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    behind_proxy: bool,
    trusted: &[IpNet],
) -> Option<String> {
    let peer = peer?;

    if !behind_proxy {
        return Some(peer.to_string());
    }

    // Untrusted hop: do not believe any forwarded header.
    if !is_trusted(&peer, trusted) {
        return Some(peer.to_string());
    }

    // X-Forwarded-For is "client, proxy1, proxy2"; the rightmost entries
    // are the hops closest to us. The first one that is not a trusted
    // proxy is the real client. Entries that do not parse as addresses
    // cannot be our proxies, so they are returned as-is.
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        for entry in forwarded.split(',').rev() {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            match entry.parse::<IpAddr>() {
                Ok(ip) if is_trusted(&ip, trusted) => continue,
                _ => return Some(entry.to_string()),
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        return Some(real_ip.to_string());
    }

    Some(peer.to_string())
}

fn is_trusted(ip: &IpAddr, trusted: &[IpNet]) -> bool {
    trusted.iter().any(|net| net.contains(ip))
}

// =============================================================================
// Tests
// =============================================================================
