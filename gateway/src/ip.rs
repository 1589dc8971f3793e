//! Client-IP derivation: immediate peer unless it is within a
//! configured trusted-proxy CIDR set, in which case the left-most entry of
//! `X-Forwarded-For` is authoritative.

use std::net::IpAddr;

use ipnet::IpNet;

pub fn derive_client_ip(peer: IpAddr, forwarded_for: Option<&str>, trusted_proxies: &[IpNet]) -> IpAddr {
    let peer_is_trusted = trusted_proxies.iter().any(|net| net.contains(&peer));
    match (peer_is_trusted, forwarded_for) {
        (true, Some(chain)) => chain
        .split(',')
        .next()
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
        .unwrap_or(peer),
        _ => peer,
    }
}

/// Appends `client_ip` to an existing forwarded chain (extending it when the
/// peer is itself trusted, creating a new one-entry chain otherwise), per
///
pub fn extend_forwarded_for(existing: Option<&str>, client_ip: IpAddr, peer_is_trusted: bool) -> String {
    match (peer_is_trusted, existing) {
        (true, Some(chain)) if !chain.is_empty() => format!("{chain}, {client_ip}"),
        _ => client_ip.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cidr(s: &str) -> IpNet {
        s.parse().unwrap()
    }

    #[test]
    fn untrusted_peer_is_used_directly() {
        let peer: IpAddr = "203.0.113.5".parse().unwrap();
        let ip = derive_client_ip(peer, Some("198.51.100.1"), &[]);
        assert_eq!(ip, peer);
    }

    #[test]
    fn trusted_peer_uses_left_most_forwarded_entry() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let trusted = [cidr("10.0.0.0/8")];
        let ip = derive_client_ip(peer, Some("198.51.100.1, 10.0.0.1"), &trusted);
        assert_eq!(ip, "198.51.100.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn trusted_peer_with_no_forwarded_header_falls_back_to_peer() {
        let peer: IpAddr = "10.0.0.1".parse().unwrap();
        let trusted = [cidr("10.0.0.0/8")];
        let ip = derive_client_ip(peer, None, &trusted);
        assert_eq!(ip, peer);
    }

    #[test]
    fn extends_chain_only_when_trusted() {
        let client_ip: IpAddr = "198.51.100.1".parse().unwrap();
        assert_eq!(extend_forwarded_for(Some("1.1.1.1"), client_ip, true), "1.1.1.1, 198.51.100.1");
        assert_eq!(extend_forwarded_for(Some("1.1.1.1"), client_ip, false), "198.51.100.1");
        assert_eq!(extend_forwarded_for(None, client_ip, true), "198.51.100.1");
    }
}
