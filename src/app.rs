//! Application handlers layered on top of connections.
//!
//! An [`Application`] hands out one handler per protocol it understands. A
//! handler sees decoded requests and answers with a [`Reply`]; it never
//! touches the socket. A handler that cannot keep up answers
//! [`Reply::Pause`], keeps the [`ConnectionHandle`] it is given, and resumes
//! the connection later from another reactor callback.

use std::cell::RefCell;
use std::rc::Rc;

use bytes::Bytes;

use crate::codec::{Codec, FrameCodec, RawCodec, TextCodec};
use crate::connection::{ConnectionHandle, ConnectionInfo};
use crate::http::HttpCodec;
use crate::http::request::Request;
use crate::http::response::Response;

/// What the connection should do once a request has been handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Send(T),
    /// Close, optionally after a farewell response.
    Close(Option<T>),
    /// Stop reading from this connection, optionally after a response.
    /// Packets already buffered wait until the connection is resumed.
    Pause(Option<T>),
    Nothing,
}

pub trait Handler<C: Codec> {
    fn handle(&mut self, request: C::Request, info: &ConnectionInfo) -> Reply<C::Response>;

    /// Receives the handle of a connection that was just paused by
    /// [`Reply::Pause`]. Dropping it leaves the connection paused.
    fn paused(&mut self, _handle: ConnectionHandle<C>) {}
}

impl<C, F> Handler<C> for F
where
    C: Codec,
    F: FnMut(C::Request, &ConnectionInfo) -> Reply<C::Response>,
{
    fn handle(&mut self, request: C::Request, info: &ConnectionInfo) -> Reply<C::Response> {
        self(request, info)
    }
}

pub type SharedHandler<C> = Rc<RefCell<dyn Handler<C>>>;

/// Wraps a closure as a handler shared by every connection of one worker.
pub fn handler<C, F>(f: F) -> SharedHandler<C>
where
    C: Codec + 'static,
    F: FnMut(C::Request, &ConnectionInfo) -> Reply<C::Response> + 'static,
{
    Rc::new(RefCell::new(f))
}

/// A pluggable application. Handlers are created inside the worker process,
/// so their state is never shared across processes.
pub trait Application {
    fn name(&self) -> &str;

    fn raw(&self) -> Option<SharedHandler<RawCodec>> {
        None
    }

    fn text(&self) -> Option<SharedHandler<TextCodec>> {
        None
    }

    fn frame(&self) -> Option<SharedHandler<FrameCodec>> {
        None
    }

    fn http(&self) -> Option<SharedHandler<HttpCodec>> {
        None
    }
}

/// Sends every request straight back.
#[derive(Debug, Clone, Copy, Default)]
pub struct Echo;

impl Application for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn raw(&self) -> Option<SharedHandler<RawCodec>> {
        Some(handler::<RawCodec, _>(|request: Bytes, _: &ConnectionInfo| {
            Reply::Send(request.to_vec())
        }))
    }

    fn text(&self) -> Option<SharedHandler<TextCodec>> {
        Some(handler::<TextCodec, _>(|request: String, _: &ConnectionInfo| {
            Reply::Send(request)
        }))
    }

    fn frame(&self) -> Option<SharedHandler<FrameCodec>> {
        Some(handler::<FrameCodec, _>(|request: Bytes, _: &ConnectionInfo| {
            Reply::Send(request.to_vec())
        }))
    }

    fn http(&self) -> Option<SharedHandler<HttpCodec>> {
        Some(handler::<HttpCodec, _>(|request: Request, _: &ConnectionInfo| {
            let content_type = request
                .header("Content-Type")
                .unwrap_or("application/octet-stream")
                .to_string();
            Reply::Send(
                Response::builder(crate::http::response::StatusCode::Ok)
                    .header("Content-Type", content_type)
                    .body(request.body)
                    .build(),
            )
        }))
    }
}

/// Answers every HTTP request with a fixed greeting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hello;

impl Application for Hello {
    fn name(&self) -> &str {
        "hello"
    }

    fn http(&self) -> Option<SharedHandler<HttpCodec>> {
        Some(handler::<HttpCodec, _>(|_: Request, _: &ConnectionInfo| {
            Reply::Send(Response::ok("Hello from prefork\n"))
        }))
    }
}

/// Looks up a built-in application by its configuration name.
pub fn builtin(name: &str) -> Option<Rc<dyn Application>> {
    match name {
        "echo" => Some(Rc::new(Echo)),
        "hello" => Some(Rc::new(Hello)),
        _ => None,
    }
}
