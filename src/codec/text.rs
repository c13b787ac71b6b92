use bytes::Bytes;

use super::{Boundary, Codec, ProtocolError};
use crate::connection::ConnectionInfo;

/// Newline-delimited lines. Requests tolerate a trailing `\r`; replies end in CRLF.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    type Request = String;
    type Response = String;

    fn boundary(&mut self, buffer: &[u8]) -> Boundary {
        match memchr::memchr(b'\n', buffer) {
            Some(index) => Boundary::Complete(index + 1),
            None => Boundary::Incomplete,
        }
    }

    fn decode(&mut self, packet: Bytes, _info: &ConnectionInfo) -> Result<String, ProtocolError> {
        let end = packet
            .iter()
            .rposition(|b| *b != b'\r' && *b != b'\n')
            .map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&packet[..end]).into_owned())
    }

    fn encode(&mut self, response: String) -> Vec<u8> {
        let mut out = response.into_bytes();
        out.extend_from_slice(b"\r\n");
        out
    }

    fn over_limit(&mut self, _limit: usize) -> Option<Vec<u8>> {
        Some(self.encode("Receive message up to limit!".to_string()))
    }
}
