//! Listening side of a worker process.

pub mod acceptor;
pub mod listener;
pub mod socket;
pub mod stats;
pub mod template;

pub use acceptor::{Acceptor, CodecAcceptor};
pub use listener::Worker;
pub use socket::Listener;
pub use stats::{StatsSnapshot, WorkerStats};
pub use template::{ListenAddress, ListenTarget, Protocol, SocketOptions, WorkerTemplate};
