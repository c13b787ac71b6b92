use std::io::Write;

use flate2::Compression;
use flate2::write::GzEncoder;

use crate::http::response::{Response, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";
pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Renders a response. With `gzip` set, a non-empty body that is not already
/// encoded is compressed and `Content-Length` follows the compressed size.
pub fn serialize_response(resp: &Response, gzip: bool) -> Vec<u8> {
    serialize(resp, gzip, true)
}

/// Renders the reply to a HEAD request: the headers a GET would carry,
/// `Content-Length` included, and no body.
pub fn serialize_head_response(resp: &Response) -> Vec<u8> {
    serialize(resp, false, false)
}

fn serialize(resp: &Response, gzip: bool, with_body: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(resp.body.len() + 256);

    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    let mut compressed = None;
    if gzip && !resp.body.is_empty() && resp.header("Content-Encoding").is_none() {
        compressed = compress(&resp.body);
    }

    let content_type = resp.header("Content-Type").unwrap_or(DEFAULT_CONTENT_TYPE);
    write_header(&mut buf, "Content-Type", content_type);

    let mut names: Vec<&String> = resp
        .headers
        .keys()
        .filter(|name| {
            !name.eq_ignore_ascii_case("Content-Type")
                && !name.eq_ignore_ascii_case("Content-Length")
        })
        .collect();
    names.sort();
    for name in names {
        write_header(&mut buf, name, &resp.headers[name]);
    }

    for cookie in &resp.cookies {
        write_header(&mut buf, "Set-Cookie", cookie);
    }

    let body: &[u8] = match &compressed {
        Some(encoded) => {
            write_header(&mut buf, "Content-Encoding", "gzip");
            write_header(&mut buf, "Vary", "Accept-Encoding");
            encoded.as_slice()
        }
        None => resp.body.as_slice(),
    };

    let length = match (&compressed, resp.header("Content-Length")) {
        (None, Some(declared)) => declared.to_string(),
        _ => body.len().to_string(),
    };
    write_header(&mut buf, "Content-Length", &length);

    buf.extend_from_slice(b"\r\n");
    if with_body {
        buf.extend_from_slice(body);
    }
    buf
}

/// Bodiless response for a request the framing layer refused.
pub fn serialize_status(status: StatusCode) -> Vec<u8> {
    format!(
        "{} {} {}\r\n\r\n",
        HTTP_VERSION,
        status.as_u16(),
        status.reason_phrase()
    )
    .into_bytes()
}

fn write_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn compress(body: &[u8]) -> Option<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).ok()?;
    encoder.finish().ok()
}
