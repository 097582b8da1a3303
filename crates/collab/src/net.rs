//! Client-IP resolution for the rate-limit `Ip` scope (§4.A).
//!
//! Grounded on the teacher's `gateway/src/request_throttle.rs::resolve_client_ip`:
//! behind a trusted proxy, prefer `X-Forwarded-For` (first valid address),
//! then `X-Real-IP`, then `CF-Connecting-IP`; otherwise trust only the
//! socket's own peer address.

use std::net::{IpAddr, SocketAddr};

use axum::http::HeaderMap;

#[must_use]
pub fn resolve_client_ip(headers: &HeaderMap, addr: SocketAddr, behind_proxy: bool) -> IpAddr {
    if behind_proxy
        && let Some(ip) = extract_forwarded_ip(headers)
    {
        return ip;
    }
    addr.ip()
}

fn extract_forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok())
        && let Some(ip) = xff.split(',').find_map(|candidate| candidate.trim().parse().ok())
    {
        return Some(ip);
    }

    if let Some(xri) = headers.get("x-real-ip").and_then(|v| v.to_str().ok())
        && let Ok(ip) = xri.trim().parse()
    {
        return Some(ip);
    }

    if let Some(cf_ip) = headers.get("cf-connecting-ip").and_then(|v| v.to_str().ok())
        && let Ok(ip) = cf_ip.trim().parse()
    {
        return Some(ip);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "203.0.113.9:4000".parse().unwrap()
    }

    #[test]
    fn trusts_socket_addr_when_not_behind_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.1".parse().unwrap());
        assert_eq!(resolve_client_ip(&headers, addr(), false), addr().ip());
    }

    #[test]
    fn prefers_first_valid_xff_entry_behind_proxy() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip, 10.0.0.5, 10.0.0.6".parse().unwrap());
        assert_eq!(resolve_client_ip(&headers, addr(), true), "10.0.0.5".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn falls_back_to_socket_addr_when_no_headers_present() {
        let headers = HeaderMap::new();
        assert_eq!(resolve_client_ip(&headers, addr(), true), addr().ip());
    }
}
