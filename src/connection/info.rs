use std::net::SocketAddr;

/// Addressing metadata of one accepted connection.
///
/// Addresses are kept as strings so unix-domain peers fit the same shape;
/// the ip/port helpers return empty values for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer: String,
    pub local: String,
}

impl ConnectionInfo {
    pub fn new(id: u64, peer: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            id,
            peer: peer.into(),
            local: local.into(),
        }
    }

    pub fn remote_ip(&self) -> String {
        ip_of(&self.peer)
    }

    pub fn remote_port(&self) -> u16 {
        port_of(&self.peer)
    }

    pub fn local_ip(&self) -> String {
        ip_of(&self.local)
    }

    pub fn local_port(&self) -> u16 {
        port_of(&self.local)
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self.peer.parse::<SocketAddr>(), Ok(SocketAddr::V4(_)))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self.peer.parse::<SocketAddr>(), Ok(SocketAddr::V6(_)))
    }
}

fn ip_of(address: &str) -> String {
    address
        .parse::<SocketAddr>()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_default()
}

fn port_of(address: &str) -> u16 {
    address.parse::<SocketAddr>().map(|addr| addr.port()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_ipv4_and_ipv6_addresses() {
        let info = ConnectionInfo::new(1, "10.0.0.7:51234", "[::1]:8080");
        assert_eq!(info.remote_ip(), "10.0.0.7");
        assert_eq!(info.remote_port(), 51234);
        assert!(info.is_ipv4());
        assert_eq!(info.local_ip(), "::1");
        assert_eq!(info.local_port(), 8080);
    }

    #[test]
    fn unix_peers_have_no_ip() {
        let info = ConnectionInfo::new(2, "unix", "/tmp/app.sock");
        assert_eq!(info.remote_ip(), "");
        assert_eq!(info.remote_port(), 0);
        assert!(!info.is_ipv4() && !info.is_ipv6());
    }
}
