use std::io;
use std::rc::Rc;

use crate::app::SharedHandler;
use crate::codec::{Codec, FrameCodec, RawCodec, TextCodec};
use crate::connection::{Connection, ConnectionInfo, ConnectionLimits, ConnectionRef, Status, Transport};
use crate::error::{Result, ServerError};
use crate::http::HttpCodec;
use crate::reactor::Reactor;
use crate::server::WorkerStats;
use crate::server::template::{Protocol, WorkerTemplate};

/// Turns accepted sockets into connections of one protocol.
pub trait Acceptor {
    fn accept(
        &mut self,
        reactor: &mut dyn Reactor,
        transport: Box<dyn Transport>,
        info: ConnectionInfo,
    ) -> io::Result<()>;

    /// Closes every connection that sits between requests.
    fn drain(&mut self, reactor: &mut dyn Reactor);

    fn live(&self) -> usize;
}

/// Owns every connection it opened until that connection is closed, so one
/// paused with no reactor registration left stays alive.
pub struct CodecAcceptor<C: Codec> {
    codec: C,
    handler: SharedHandler<C>,
    limits: ConnectionLimits,
    stats: Rc<WorkerStats>,
    connections: Vec<ConnectionRef<C>>,
}

impl<C: Codec + Clone + 'static> CodecAcceptor<C> {
    pub fn new(codec: C, handler: SharedHandler<C>, limits: ConnectionLimits, stats: Rc<WorkerStats>) -> Self {
        Self {
            codec,
            handler,
            limits,
            stats,
            connections: Vec::new(),
        }
    }
}

impl<C: Codec + Clone + 'static> Acceptor for CodecAcceptor<C> {
    fn accept(
        &mut self,
        reactor: &mut dyn Reactor,
        transport: Box<dyn Transport>,
        info: ConnectionInfo,
    ) -> io::Result<()> {
        self.connections.retain(is_open);
        let conn = Connection::open(
            reactor,
            transport,
            info,
            self.codec.clone(),
            self.handler.clone(),
            self.limits,
            self.stats.clone(),
        )?;
        self.connections.push(conn);
        Ok(())
    }

    fn drain(&mut self, reactor: &mut dyn Reactor) {
        for conn in &self.connections {
            if let Ok(mut conn) = conn.try_borrow_mut() {
                conn.close_if_idle(reactor);
            }
        }
        self.connections.retain(is_open);
    }

    fn live(&self) -> usize {
        self.connections.iter().filter(|conn| is_open(conn)).count()
    }
}

fn is_open<C: Codec + 'static>(conn: &ConnectionRef<C>) -> bool {
    conn.try_borrow().map_or(true, |conn| conn.status() != Status::Closed)
}

/// Pairs the template's protocol codec with the application's handler for it.
pub fn build(template: &WorkerTemplate, stats: Rc<WorkerStats>) -> Result<Box<dyn Acceptor>> {
    let unsupported = || ServerError::UnsupportedProtocol {
        app: template.app.name().to_string(),
        protocol: template.protocol().to_string(),
    };
    let limits = template.limits;

    let acceptor: Box<dyn Acceptor> = match template.protocol() {
        Protocol::Tcp => {
            let handler = template.app.raw().ok_or_else(unsupported)?;
            Box::new(CodecAcceptor::new(RawCodec, handler, limits, stats))
        }
        Protocol::Text => {
            let handler = template.app.text().ok_or_else(unsupported)?;
            Box::new(CodecAcceptor::new(TextCodec, handler, limits, stats))
        }
        Protocol::Frame => {
            let handler = template.app.frame().ok_or_else(unsupported)?;
            Box::new(CodecAcceptor::new(FrameCodec, handler, limits, stats))
        }
        Protocol::Http => {
            let handler = template.app.http().ok_or_else(unsupported)?;
            Box::new(CodecAcceptor::new(HttpCodec::new(template.http), handler, limits, stats))
        }
    };
    Ok(acceptor)
}
