//! Buffered, non-blocking connections driven by a [`Reactor`].
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────┐
//!        │ Established  │ ← read → frame → handle → send, repeated per packet
//!        └──────┬───────┘
//!               │ close() with bytes still queued
//!               ▼
//!        ┌──────────────┐
//!        │   Closing    │ ← reads paused, send buffer draining
//!        └──────┬───────┘
//!               │ buffer drained / peer gone / error
//!               ▼
//!        ┌──────────────┐
//!        │    Closed    │ ← fd deregistered and closed, buffers cleared
//!        └──────────────┘
//! ```
//!
//! `close()` on an empty send buffer goes straight to `Closed`.
//!
//! The acceptor that opened a connection owns it until it is closed, and
//! every reactor registration holds a further strong handle that
//! [`Connection::destroy`] drops. Handlers only ever get a weak
//! [`ConnectionHandle`].

mod info;
mod transport;

use std::cell::RefCell;
use std::io::{self, Read, Write};
use std::os::fd::RawFd;
use std::rc::{Rc, Weak};

use bytes::{Buf, BytesMut};
use tracing::{debug, warn};

use crate::app::{Reply, SharedHandler};
use crate::codec::{Boundary, Codec, ProtocolError};
use crate::reactor::{EventKind, Reactor};
use crate::server::WorkerStats;

pub use info::ConnectionInfo;
pub use transport::Transport;

/// Size of a single read from the socket.
pub const READ_CHUNK: usize = (64 << 10) - 1;

pub type ConnectionRef<C> = Rc<RefCell<Connection<C>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Established,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Receive buffer size above which the connection is closed.
    pub max_receive: usize,
    /// Pending send buffer size above which further packets are dropped.
    pub max_send: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_receive: 10 << 20,
            max_send: 1 << 20,
        }
    }
}

pub struct Connection<C: Codec> {
    fd: RawFd,
    transport: Option<Box<dyn Transport>>,
    info: ConnectionInfo,
    status: Status,
    receive: BytesMut,
    send: BytesMut,
    bytes_read: u64,
    bytes_written: u64,
    paused: bool,
    codec: C,
    handler: SharedHandler<C>,
    limits: ConnectionLimits,
    stats: Rc<WorkerStats>,
    this: Weak<RefCell<Connection<C>>>,
}

impl<C: Codec + 'static> Connection<C> {
    /// Wraps an accepted socket and starts listening for its bytes.
    pub fn open(
        reactor: &mut dyn Reactor,
        transport: Box<dyn Transport>,
        info: ConnectionInfo,
        codec: C,
        handler: SharedHandler<C>,
        limits: ConnectionLimits,
        stats: Rc<WorkerStats>,
    ) -> io::Result<ConnectionRef<C>> {
        transport.set_nonblocking(true)?;
        let fd = transport.as_raw_fd();
        stats.connection_opened();

        let conn = Rc::new_cyclic(|this| {
            RefCell::new(Connection {
                fd,
                transport: Some(transport),
                info,
                status: Status::Established,
                receive: BytesMut::with_capacity(4096),
                send: BytesMut::new(),
                bytes_read: 0,
                bytes_written: 0,
                paused: false,
                codec,
                handler,
                limits,
                stats,
                this: this.clone(),
            })
        });
        conn.borrow().register_readable(reactor);
        Ok(conn)
    }

    fn register_readable(&self, reactor: &mut dyn Reactor) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        reactor.add(
            self.fd,
            EventKind::Readable,
            Box::new(move |reactor, _fd| {
                if let Ok(mut conn) = this.try_borrow_mut() {
                    conn.on_readable(reactor);
                }
            }),
        );
    }

    fn register_writable(&self, reactor: &mut dyn Reactor) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        reactor.add(
            self.fd,
            EventKind::Writable,
            Box::new(move |reactor, _fd| {
                if let Ok(mut conn) = this.try_borrow_mut() {
                    conn.on_writable(reactor);
                }
            }),
        );
    }

    /// Reads what the socket has and processes every complete packet.
    pub fn on_readable(&mut self, reactor: &mut dyn Reactor) {
        if self.read_socket(reactor, true) {
            self.process(reactor);
        }
    }

    /// Returns whether new bytes were appended to the receive buffer.
    fn read_socket(&mut self, reactor: &mut dyn Reactor, check_eof: bool) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        let start = self.receive.len();
        self.receive.resize(start + READ_CHUNK, 0);
        let result = transport.read(&mut self.receive[start..]);
        self.receive.truncate(start + *result.as_ref().unwrap_or(&0));
        match result {
            Ok(0) => {
                if check_eof {
                    self.destroy(reactor);
                }
                false
            }
            Ok(n) => {
                self.bytes_read += n as u64;
                true
            }
            Err(e) if is_transient(&e) => false,
            Err(e) => {
                debug!(id = self.info.id, peer = %self.info.peer, error = %e, "read failed");
                self.destroy(reactor);
                false
            }
        }
    }

    fn process(&mut self, reactor: &mut dyn Reactor) {
        if self.paused || self.status != Status::Established {
            return;
        }

        if self.receive.len() > self.limits.max_receive {
            warn!(
                id = self.info.id,
                peer = %self.info.peer,
                buffered = self.receive.len(),
                limit = self.limits.max_receive,
                "receive buffer over limit, closing"
            );
            let farewell = self.codec.over_limit(self.limits.max_receive);
            self.receive.clear();
            self.close_raw(reactor, farewell);
            return;
        }

        while self.status == Status::Established && !self.paused && !self.receive.is_empty() {
            match self.codec.boundary(&self.receive) {
                Boundary::Incomplete => break,
                Boundary::Invalid(error) => {
                    self.reject(reactor, error);
                    break;
                }
                Boundary::Complete(len) => {
                    if len == 0 || len > self.receive.len() {
                        break;
                    }
                    let packet = self.receive.split_to(len).freeze();
                    self.stats.request();
                    match self.codec.decode(packet, &self.info) {
                        Ok(request) => self.dispatch(reactor, request),
                        Err(error) => {
                            self.reject(reactor, error);
                            break;
                        }
                    }
                }
            }
        }
    }

    fn dispatch(&mut self, reactor: &mut dyn Reactor, request: C::Request) {
        let reply = self.handler.borrow_mut().handle(request, &self.info);
        match reply {
            Reply::Send(response) => self.respond(reactor, response),
            Reply::Close(farewell) => self.close(reactor, farewell),
            Reply::Pause(response) => {
                if let Some(response) = response {
                    self.respond(reactor, response);
                }
                if self.status == Status::Established {
                    self.pause_receive(reactor);
                    let handle = self.handle();
                    self.handler.borrow_mut().paused(handle);
                }
            }
            Reply::Nothing => {}
        }
    }

    fn respond(&mut self, reactor: &mut dyn Reactor, response: C::Response) {
        self.send(reactor, response);
        if !self.codec.keep_alive() || self.stats.is_draining() {
            self.close(reactor, None);
        }
    }

    fn reject(&mut self, reactor: &mut dyn Reactor, error: ProtocolError) {
        self.stats.protocol_error();
        debug!(id = self.info.id, peer = %self.info.peer, %error, "protocol violation, closing");
        let farewell = self.codec.reject(&error);
        self.receive.clear();
        self.close_raw(reactor, farewell);
    }

    /// Encodes and sends `response`. Returns false when the connection is
    /// closing, closed, or the packet had to be dropped.
    pub fn send(&mut self, reactor: &mut dyn Reactor, response: C::Response) -> bool {
        if self.status != Status::Established {
            return false;
        }
        let data = self.codec.encode(response);
        self.send_raw(reactor, data)
    }

    /// Sends already-encoded bytes.
    pub fn send_raw(&mut self, reactor: &mut dyn Reactor, data: Vec<u8>) -> bool {
        if self.status != Status::Established {
            return false;
        }
        if data.is_empty() {
            return true;
        }

        if !self.send.is_empty() {
            if self.send.len() + data.len() > self.limits.max_send {
                warn!(
                    id = self.info.id,
                    pending = self.send.len(),
                    limit = self.limits.max_send,
                    "send buffer full, packet dropped"
                );
                self.stats.send_failed();
                return false;
            }
            self.send.extend_from_slice(&data);
            return true;
        }

        let Some(transport) = self.transport.as_mut() else {
            return false;
        };
        match transport.write(&data) {
            Ok(n) if n == data.len() => {
                self.bytes_written += n as u64;
                true
            }
            Ok(n) => {
                self.bytes_written += n as u64;
                self.send.extend_from_slice(&data[n..]);
                self.register_writable(reactor);
                true
            }
            Err(e) if is_transient(&e) => {
                self.send.extend_from_slice(&data);
                self.register_writable(reactor);
                true
            }
            Err(e) => {
                debug!(id = self.info.id, peer = %self.info.peer, error = %e, "write failed");
                self.stats.send_failed();
                self.destroy(reactor);
                false
            }
        }
    }

    /// Flushes the pending send buffer.
    pub fn on_writable(&mut self, reactor: &mut dyn Reactor) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match transport.write(&self.send) {
            Ok(n) => {
                self.bytes_written += n as u64;
                self.send.advance(n);
                if self.send.is_empty() {
                    reactor.remove(self.fd, EventKind::Writable);
                    if self.status == Status::Closing {
                        self.destroy(reactor);
                    }
                }
            }
            Err(e) if is_transient(&e) => {}
            Err(e) => {
                debug!(id = self.info.id, peer = %self.info.peer, error = %e, "flush failed");
                self.stats.send_failed();
                self.destroy(reactor);
            }
        }
    }

    pub fn pause_receive(&mut self, reactor: &mut dyn Reactor) {
        reactor.remove(self.fd, EventKind::Readable);
        self.paused = true;
    }

    /// Re-enables reads and immediately processes anything already buffered.
    pub fn resume_receive(&mut self, reactor: &mut dyn Reactor) {
        if !self.paused || self.status != Status::Established {
            return;
        }
        self.paused = false;
        self.register_readable(reactor);
        self.read_socket(reactor, false);
        self.process(reactor);
    }

    /// Closes after `farewell` (if any) and the pending buffer are flushed.
    pub fn close(&mut self, reactor: &mut dyn Reactor, farewell: Option<C::Response>) {
        if self.status != Status::Established {
            return;
        }
        let farewell = farewell.map(|response| self.codec.encode(response));
        self.close_raw(reactor, farewell);
    }

    /// Closes a connection that sits between requests. One with a partial
    /// request buffered is left to finish it.
    pub fn close_if_idle(&mut self, reactor: &mut dyn Reactor) -> bool {
        if self.status == Status::Established && self.receive.is_empty() {
            self.close_raw(reactor, None);
            true
        } else {
            false
        }
    }

    fn close_raw(&mut self, reactor: &mut dyn Reactor, farewell: Option<Vec<u8>>) {
        if self.status != Status::Established {
            return;
        }
        if let Some(data) = farewell {
            self.send_raw(reactor, data);
        }
        if self.status == Status::Closed {
            return;
        }
        self.status = Status::Closing;
        if self.send.is_empty() {
            self.destroy(reactor);
        } else {
            self.pause_receive(reactor);
        }
    }

    /// Tears the connection down. Only the first call has any effect.
    pub fn destroy(&mut self, reactor: &mut dyn Reactor) {
        if self.status == Status::Closed {
            return;
        }
        reactor.remove(self.fd, EventKind::Readable);
        reactor.remove(self.fd, EventKind::Writable);
        self.transport = None;
        self.status = Status::Closed;
        self.receive.clear();
        self.send.clear();

        debug!(
            id = self.info.id,
            peer = %self.info.peer,
            bytes_read = self.bytes_read,
            bytes_written = self.bytes_written,
            "connection closed"
        );
        if self.stats.connection_closed() {
            reactor.stop();
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn buffered(&self) -> usize {
        self.receive.len()
    }

    pub fn pending_send(&self) -> usize {
        self.send.len()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn handle(&self) -> ConnectionHandle<C> {
        ConnectionHandle {
            conn: self.this.clone(),
        }
    }
}

/// Weak reference to a connection, held by handlers that paused it.
pub struct ConnectionHandle<C: Codec> {
    conn: Weak<RefCell<Connection<C>>>,
}

impl<C: Codec> Clone for ConnectionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl<C: Codec + 'static> ConnectionHandle<C> {
    /// Resumes reading and processes every packet already buffered.
    ///
    /// Returns false, and changes nothing, when the connection is gone or
    /// when called from inside a handler of the same worker.
    pub fn resume(&self, reactor: &mut dyn Reactor) -> bool {
        let Some(conn) = self.conn.upgrade() else {
            return false;
        };
        let Ok(mut conn) = conn.try_borrow_mut() else {
            return false;
        };
        if conn.status != Status::Established || conn.handler.try_borrow_mut().is_err() {
            return false;
        }
        conn.resume_receive(reactor);
        true
    }

    pub fn pause(&self, reactor: &mut dyn Reactor) -> bool {
        let Some(conn) = self.conn.upgrade() else {
            return false;
        };
        let Ok(mut conn) = conn.try_borrow_mut() else {
            return false;
        };
        if conn.status != Status::Established {
            return false;
        }
        conn.pause_receive(reactor);
        true
    }

    pub fn is_open(&self) -> bool {
        self.conn
            .upgrade()
            .is_some_and(|conn| conn.try_borrow().map_or(true, |conn| conn.status != Status::Closed))
    }
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
