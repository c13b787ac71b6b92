use bytes::Bytes;

use super::{Boundary, Codec, ProtocolError};
use crate::connection::ConnectionInfo;

/// No framing: whatever is buffered is one packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Request = Bytes;
    type Response = Vec<u8>;

    fn boundary(&mut self, buffer: &[u8]) -> Boundary {
        if buffer.is_empty() {
            Boundary::Incomplete
        } else {
            Boundary::Complete(buffer.len())
        }
    }

    fn decode(&mut self, packet: Bytes, _info: &ConnectionInfo) -> Result<Bytes, ProtocolError> {
        Ok(packet)
    }

    fn encode(&mut self, response: Vec<u8>) -> Vec<u8> {
        response
    }
}
