//! Packet framing strategies.
//!
//! A codec answers three questions about a receive buffer: where the next
//! packet ends ([`Codec::boundary`]), what it means ([`Codec::decode`]) and
//! how a reply goes back on the wire ([`Codec::encode`]). Codecs never touch
//! sockets; the [`Connection`](crate::connection::Connection) owns the buffers.

pub mod frame;
pub mod raw;
pub mod text;

use bytes::Bytes;

use crate::connection::ConnectionInfo;

pub use frame::FrameCodec;
pub use raw::RawCodec;
pub use text::TextCodec;

/// Result of scanning the front of a receive buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Boundary {
    /// More bytes are needed before a packet can be cut.
    Incomplete,
    /// The first `n` bytes form exactly one packet.
    Complete(usize),
    /// The buffer can never become a valid packet.
    Invalid(ProtocolError),
}

/// Client-caused protocol violations. Recovered by closing the offending connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed packet: {0}")]
    Malformed(String),

    #[error("request line exceeds {0} bytes")]
    RequestLineTooLong(usize),

    #[error("header block exceeds {0} bytes")]
    HeaderTooLarge(usize),

    #[error("missing Content-Length for {0}")]
    LengthRequired(String),

    #[error("frame length {0} does not cover its own prefix")]
    InvalidFrameLength(u32),
}

pub trait Codec {
    type Request;
    type Response;

    fn boundary(&mut self, buffer: &[u8]) -> Boundary;

    /// Decodes one packet previously cut at a [`Boundary::Complete`] length.
    fn decode(&mut self, packet: Bytes, info: &ConnectionInfo) -> Result<Self::Request, ProtocolError>;

    fn encode(&mut self, response: Self::Response) -> Vec<u8>;

    /// Farewell bytes sent before closing on a protocol violation.
    fn reject(&mut self, _error: &ProtocolError) -> Option<Vec<u8>> {
        None
    }

    /// Farewell bytes sent when the receive buffer outgrows `limit`.
    fn over_limit(&mut self, _limit: usize) -> Option<Vec<u8>> {
        None
    }

    /// Whether the connection stays open after the last response.
    fn keep_alive(&self) -> bool {
        true
    }
}
