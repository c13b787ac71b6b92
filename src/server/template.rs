use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::app::Application;
use crate::connection::ConnectionLimits;
use crate::error::ServerError;
use crate::http::HttpOptions;

pub const DEFAULT_BACKLOG: i32 = 102_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Raw TCP, no framing
    Tcp,
    Text,
    Frame,
    Http,
}

impl Protocol {
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "text" => Some(Protocol::Text),
            "frame" => Some(Protocol::Frame),
            "http" => Some(Protocol::Http),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Text => "text",
            Protocol::Frame => "frame",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenAddress {
    /// `host:port`, resolved at bind time
    Inet(String),
    Unix(PathBuf),
}

/// A parsed `proto://host:port` or `proto:///absolute/path` listen string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenTarget {
    pub protocol: Protocol,
    pub address: ListenAddress,
}

impl FromStr for ListenTarget {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ServerError::InvalidTarget {
            target: s.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = s.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
        let protocol = Protocol::from_scheme(scheme).ok_or_else(|| invalid("unknown protocol"))?;

        if rest.starts_with('/') {
            return Ok(ListenTarget {
                protocol,
                address: ListenAddress::Unix(PathBuf::from(rest)),
            });
        }

        // A non-special scheme keeps url from applying http's default port.
        let url = Url::parse(&format!("tcp://{rest}")).map_err(|e| invalid(&e.to_string()))?;
        if !matches!(url.path(), "" | "/") || url.query().is_some() {
            return Err(invalid("unexpected path"));
        }
        let host = match url.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(ip)) => ip.to_string(),
            Some(Host::Ipv6(ip)) => format!("[{ip}]"),
            _ => return Err(invalid("missing host")),
        };
        let port = url.port().ok_or_else(|| invalid("missing port"))?;

        Ok(ListenTarget {
            protocol,
            address: ListenAddress::Inet(format!("{host}:{port}")),
        })
    }
}

impl fmt::Display for ListenTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.address {
            ListenAddress::Inet(address) => write!(f, "{}://{}", self.protocol, address),
            ListenAddress::Unix(path) => write!(f, "{}://{}", self.protocol, path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketOptions {
    pub backlog: i32,
    pub reuse_port: bool,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            backlog: DEFAULT_BACKLOG,
            reuse_port: false,
        }
    }
}

/// Everything needed to run replicas of one listener.
#[derive(Clone)]
pub struct WorkerTemplate {
    pub name: String,
    pub target: ListenTarget,
    pub count: usize,
    pub socket: SocketOptions,
    pub limits: ConnectionLimits,
    pub http: HttpOptions,
    pub app: Rc<dyn Application>,
}

impl WorkerTemplate {
    pub fn protocol(&self) -> Protocol {
        self.target.protocol
    }

    /// Whether `other` can keep using a socket bound for `self`.
    pub fn same_listener(&self, other: &WorkerTemplate) -> bool {
        self.target.address == other.target.address && self.socket == other.socket
    }
}

impl fmt::Debug for WorkerTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerTemplate")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("count", &self.count)
            .field("socket", &self.socket)
            .field("limits", &self.limits)
            .field("http", &self.http)
            .field("app", &self.app.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_inet_targets() {
        let target: ListenTarget = "http://0.0.0.0:8080".parse().unwrap();
        assert_eq!(target.protocol, Protocol::Http);
        assert_eq!(target.address, ListenAddress::Inet("0.0.0.0:8080".into()));

        let target: ListenTarget = "frame://[::1]:9000".parse().unwrap();
        assert_eq!(target.address, ListenAddress::Inet("[::1]:9000".into()));
        assert_eq!(target.to_string(), "frame://[::1]:9000");
    }

    #[test]
    fn http_port_80_is_kept() {
        let target: ListenTarget = "http://localhost:80".parse().unwrap();
        assert_eq!(target.address, ListenAddress::Inet("localhost:80".into()));
    }

    #[test]
    fn parses_unix_targets() {
        let target: ListenTarget = "text:///tmp/prefork.sock".parse().unwrap();
        assert_eq!(target.protocol, Protocol::Text);
        assert_eq!(target.address, ListenAddress::Unix("/tmp/prefork.sock".into()));
    }

    #[test]
    fn rejects_bad_targets() {
        assert!("udp://0.0.0.0:53".parse::<ListenTarget>().is_err());
        assert!("tcp://0.0.0.0".parse::<ListenTarget>().is_err());
        assert!("0.0.0.0:80".parse::<ListenTarget>().is_err());
        assert!("tcp://host:1/path".parse::<ListenTarget>().is_err());
    }
}
