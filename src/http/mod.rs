//! HTTP/1.x framing for the connection layer.
//!
//! # Architecture
//!
//! - **`parser`**: request-size detection on a raw receive buffer, and request decoding
//! - **`body`**: query string, cookie, urlencoded, JSON and multipart decoding
//! - **`request`**: HTTP request representation with its decoded views
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes responses, optionally gzip-compressed
//!
//! # Request Framing
//!
//! ```text
//!   buffer ──► head terminator found? ──no──► request line / header caps (414 / 413)
//!                     │
//!                    yes
//!                     ▼
//!        request line + Host line valid? ──no──► 400
//!                     │
//!                     ▼
//!        head length + body length (GET/HEAD/OPTIONS: 0,
//!        POST/PUT/PATCH: Content-Length or 400, DELETE: optional)
//! ```
//!
//! Every refusal is answered with a bodiless status response and the
//! connection is closed once it is flushed.

pub mod body;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{Boundary, Codec, ProtocolError};
use crate::connection::ConnectionInfo;
use request::{Method, Request};
use response::{Response, StatusCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpOptions {
    /// Bytes allowed before the first CRLF
    pub max_request_line: usize,
    /// Bytes allowed for the whole head, terminator included
    pub max_header: usize,
    /// Compress bodies for clients sending `Accept-Encoding: gzip`
    pub gzip: bool,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            max_request_line: 4096,
            max_header: 4096,
            gzip: true,
        }
    }
}

/// Per-connection HTTP codec. Remembers the size of a request whose body is
/// still arriving, and the method, encoding and keep-alive wishes of the last
/// request.
#[derive(Debug, Clone)]
pub struct HttpCodec {
    options: HttpOptions,
    pending: Option<usize>,
    gzip: bool,
    keep_alive: bool,
    head: bool,
}

impl HttpCodec {
    pub fn new(options: HttpOptions) -> Self {
        Self {
            options,
            pending: None,
            gzip: false,
            keep_alive: true,
            head: false,
        }
    }

    pub fn options(&self) -> &HttpOptions {
        &self.options
    }
}

impl Default for HttpCodec {
    fn default() -> Self {
        Self::new(HttpOptions::default())
    }
}

impl Codec for HttpCodec {
    type Request = Request;
    type Response = Response;

    fn boundary(&mut self, buffer: &[u8]) -> Boundary {
        let total = match self.pending {
            Some(total) => total,
            None => match parser::request_size(buffer, &self.options) {
                Ok(Some(total)) => total,
                Ok(None) => return Boundary::Incomplete,
                Err(error) => return Boundary::Invalid(error),
            },
        };
        if buffer.len() >= total {
            self.pending = None;
            Boundary::Complete(total)
        } else {
            self.pending = Some(total);
            Boundary::Incomplete
        }
    }

    fn decode(&mut self, packet: Bytes, info: &ConnectionInfo) -> Result<Request, ProtocolError> {
        self.pending = None;
        let request = parser::decode_request(&packet, info)?;
        self.gzip = self.options.gzip && request.accepts_gzip();
        self.keep_alive = request.keep_alive();
        self.head = request.method == Method::HEAD;
        Ok(request)
    }

    fn encode(&mut self, response: Response) -> Vec<u8> {
        if self.head {
            writer::serialize_head_response(&response)
        } else {
            writer::serialize_response(&response, self.gzip)
        }
    }

    fn reject(&mut self, error: &ProtocolError) -> Option<Vec<u8>> {
        let status = match error {
            ProtocolError::RequestLineTooLong(_) => StatusCode::UriTooLong,
            ProtocolError::HeaderTooLarge(_) => StatusCode::PayloadTooLarge,
            _ => StatusCode::BadRequest,
        };
        Some(writer::serialize_status(status))
    }

    fn over_limit(&mut self, _limit: usize) -> Option<Vec<u8>> {
        Some(writer::serialize_status(StatusCode::PayloadTooLarge))
    }

    fn keep_alive(&self) -> bool {
        self.keep_alive
    }
}
