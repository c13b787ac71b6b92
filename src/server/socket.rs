use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use socket2::{Domain, SockAddr, SockRef, Socket, Type};
use tracing::debug;

use crate::connection::Transport;
use crate::error::{Result, ServerError};
use crate::server::template::{ListenAddress, ListenTarget, SocketOptions};

/// A bound, non-blocking listening socket. Forked workers inherit it.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Unix(UnixListener, PathBuf),
}

/// One accepted socket with its addresses.
pub struct Accepted {
    pub transport: Box<dyn Transport>,
    pub peer: String,
    pub local: String,
}

impl Listener {
    pub fn bind(target: &ListenTarget, options: &SocketOptions) -> Result<Self> {
        let bind_error = |source: io::Error| ServerError::Bind {
            target: target.to_string(),
            source,
        };

        match &target.address {
            ListenAddress::Inet(address) => {
                let addr = resolve(address).map_err(bind_error)?;
                bind_tcp(addr, options).map(Listener::Tcp).map_err(bind_error)
            }
            ListenAddress::Unix(path) => bind_unix(path, options)
                .map(|listener| Listener::Unix(listener, path.clone()))
                .map_err(bind_error),
        }
    }

    /// Accepts one pending connection. TCP sockets get keepalive and nodelay.
    pub fn accept(&self) -> io::Result<Accepted> {
        match self {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept()?;
                tune_tcp(&stream)?;
                let local = stream.local_addr()?;
                Ok(Accepted {
                    transport: Box::new(stream),
                    peer: peer.to_string(),
                    local: local.to_string(),
                })
            }
            Listener::Unix(listener, path) => {
                let (stream, peer) = listener.accept()?;
                let peer = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unix".to_string());
                Ok(Accepted {
                    transport: Box::new(stream),
                    peer,
                    local: path.display().to_string(),
                })
            }
        }
    }

    /// Bound address; for an ephemeral TCP port this is the chosen one.
    pub fn local_addr(&self) -> String {
        match self {
            Listener::Tcp(listener) => listener
                .local_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_default(),
            Listener::Unix(_, path) => path.display().to_string(),
        }
    }
}

impl AsRawFd for Listener {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Listener::Tcp(listener) => listener.as_raw_fd(),
            Listener::Unix(listener, _) => listener.as_raw_fd(),
        }
    }
}

fn resolve(address: &str) -> io::Result<SocketAddr> {
    address.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::AddrNotAvailable, format!("{address} resolves to nothing"))
    })
}

fn bind_tcp(addr: SocketAddr, options: &SocketOptions) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(socket2::Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if options.reuse_port {
        socket.set_reuse_port(true)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(options.backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn bind_unix(path: &Path, options: &SocketOptions) -> io::Result<UnixListener> {
    if path.exists() && UnixStream::connect(path).is_err() {
        debug!(path = %path.display(), "removing stale socket file");
        std::fs::remove_file(path)?;
    }
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    socket.bind(&SockAddr::unix(path)?)?;
    socket.listen(options.backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

fn tune_tcp(stream: &TcpStream) -> io::Result<()> {
    SockRef::from(stream).set_keepalive(true)?;
    stream.set_nodelay(true)
}
