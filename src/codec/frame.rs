use bytes::{Buf, BufMut, Bytes};

use super::{Boundary, Codec, ProtocolError};
use crate::connection::ConnectionInfo;

pub const PREFIX_LEN: usize = 4;

/// 4-byte big-endian length prefix counting itself, then the payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec;

impl Codec for FrameCodec {
    type Request = Bytes;
    type Response = Vec<u8>;

    fn boundary(&mut self, mut buffer: &[u8]) -> Boundary {
        if buffer.len() < PREFIX_LEN {
            return Boundary::Incomplete;
        }
        let available = buffer.len();
        let length = buffer.get_u32();
        if (length as usize) < PREFIX_LEN {
            return Boundary::Invalid(ProtocolError::InvalidFrameLength(length));
        }
        if available >= length as usize {
            Boundary::Complete(length as usize)
        } else {
            Boundary::Incomplete
        }
    }

    fn decode(&mut self, mut packet: Bytes, _info: &ConnectionInfo) -> Result<Bytes, ProtocolError> {
        if packet.len() < PREFIX_LEN {
            return Err(ProtocolError::InvalidFrameLength(packet.len() as u32));
        }
        packet.advance(PREFIX_LEN);
        Ok(packet)
    }

    fn encode(&mut self, response: Vec<u8>) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREFIX_LEN + response.len());
        out.put_u32((PREFIX_LEN + response.len()) as u32);
        out.extend_from_slice(&response);
        out
    }
}
