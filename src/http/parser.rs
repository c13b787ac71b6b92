use std::collections::HashMap;

use memchr::memmem;

use crate::codec::ProtocolError;
use crate::connection::ConnectionInfo;
use crate::http::HttpOptions;
use crate::http::body;
use crate::http::request::{Method, Request, ServerInfo};

/// Total size of the request at the front of `buf`, once its head is buffered.
///
/// `Ok(None)` means the head is still incomplete. Size caps are checked on
/// every call so an oversized head is refused before its terminator arrives.
pub fn request_size(buf: &[u8], options: &HttpOptions) -> Result<Option<usize>, ProtocolError> {
    let Some(headers_end) = find_headers_end(buf) else {
        return match memmem::find(buf, b"\r\n") {
            None if buf.len() > options.max_request_line => {
                Err(ProtocolError::RequestLineTooLong(options.max_request_line))
            }
            None => Ok(None),
            Some(line_end) => {
                if !check_first_line(&buf[..line_end]) {
                    return Err(malformed("request line"));
                }
                if buf.len() > options.max_header {
                    return Err(ProtocolError::HeaderTooLarge(options.max_header));
                }
                Ok(None)
            }
        };
    };

    if headers_end + 4 > options.max_header {
        return Err(ProtocolError::HeaderTooLarge(options.max_header));
    }

    let head = std::str::from_utf8(&buf[..headers_end]).map_err(|_| malformed("head encoding"))?;
    let mut lines = head.split("\r\n");
    let first = lines.next().unwrap_or_default();
    if first.len() > options.max_request_line {
        return Err(ProtocolError::RequestLineTooLong(options.max_request_line));
    }
    if !check_first_line(first.as_bytes()) {
        return Err(malformed("request line"));
    }
    if !lines.next().is_some_and(check_second_line) {
        return Err(malformed("Host line"));
    }

    let min_length = headers_end + 4;
    let method = parse_method(first).ok_or_else(|| malformed("method"))?;
    if method.ignores_body() {
        return Ok(Some(min_length));
    }

    match declared_length(head)? {
        Some(length) => min_length
            .checked_add(length)
            .map(Some)
            .ok_or_else(|| malformed("Content-Length")),
        None if method.requires_length() => {
            Err(ProtocolError::LengthRequired(method.as_str().to_string()))
        }
        None => Ok(Some(min_length)),
    }
}

/// `METHOD SP /target SP HTTP/version`, method case-insensitive.
pub fn check_first_line(line: &[u8]) -> bool {
    let Ok(line) = std::str::from_utf8(line) else {
        return false;
    };
    let Some((method, rest)) = line.split_once(' ') else {
        return false;
    };
    if Method::from_str(&method.to_ascii_uppercase()).is_none() || !rest.starts_with('/') {
        return false;
    }
    let Some((_target, version)) = rest.rsplit_once(' ') else {
        return false;
    };
    let Some(prefix) = version.get(..5) else {
        return false;
    };
    let number = &version[5..];
    prefix.eq_ignore_ascii_case("HTTP/")
        && !number.is_empty()
        && number.bytes().all(|b| b.is_ascii_digit() || b == b'.')
}

/// `Host: name[:port]` with a port of 1 to 99999.
pub fn check_second_line(line: &str) -> bool {
    let Some(prefix) = line.get(..6) else {
        return false;
    };
    if !prefix.eq_ignore_ascii_case("host: ") {
        return false;
    }
    let value = &line[6..];
    let (host, port) = match value.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (value, None),
    };
    let host_ok = !host.is_empty()
        && host
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-');
    let port_ok = port.is_none_or(|port| {
        (1..=5).contains(&port.len())
            && !port.starts_with('0')
            && port.bytes().all(|b| b.is_ascii_digit())
    });
    host_ok && port_ok
}

fn parse_method(first_line: &str) -> Option<Method> {
    let method = first_line.split(' ').next()?;
    Method::from_str(&method.to_ascii_uppercase())
}

fn declared_length(head: &str) -> Result<Option<usize>, ProtocolError> {
    for line in head.split("\r\n").skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case("Content-Length") {
            return value
                .trim()
                .parse::<usize>()
                .map(Some)
                .map_err(|_| malformed("Content-Length"));
        }
    }
    Ok(None)
}

fn malformed(what: &str) -> ProtocolError {
    ProtocolError::Malformed(format!("invalid {what}"))
}

/// Splits a framed packet into request line, headers and body. The body is
/// whatever follows the head, cut to `Content-Length` when one is declared.
fn parse_packet(packet: &[u8]) -> Result<Request, ProtocolError> {
    let headers_end = find_headers_end(packet).ok_or_else(|| malformed("head terminator"))?;
    let head = std::str::from_utf8(&packet[..headers_end]).map_err(|_| malformed("head encoding"))?;
    let mut lines = head.split("\r\n");

    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(malformed("request line"));
    };
    let method = Method::from_str(&method.to_ascii_uppercase()).ok_or_else(|| malformed("method"))?;

    let mut headers = HashMap::new();
    for line in lines.filter(|line| !line.is_empty()) {
        let (key, value) = line.split_once(':').ok_or_else(|| malformed("header"))?;
        headers.insert(key.trim().to_string(), value.trim().to_string());
    }

    let mut body = if method.ignores_body() {
        &[][..]
    } else {
        &packet[headers_end + 4..]
    };
    if let Some(length) = declared_length(head)? {
        body = &body[..length.min(body.len())];
    }

    Ok(Request {
        method,
        path: path.to_string(),
        version: version.to_string(),
        headers,
        body: body.to_vec(),
        ..Request::default()
    })
}

/// Decodes one framed packet into a request with every derived view filled in.
pub fn decode_request(packet: &[u8], info: &ConnectionInfo) -> Result<Request, ProtocolError> {
    let mut request = parse_packet(packet)?;

    let query_string = request
        .path
        .split_once('?')
        .map(|(_, query)| query.to_string())
        .unwrap_or_default();
    request.query = body::parse_urlencoded(query_string.as_bytes());

    if let Some(cookies) = request.header("Cookie").map(body::parse_cookies) {
        request.cookies = cookies;
    }

    let content_type = request.header("Content-Type").unwrap_or_default().to_string();
    let mime = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    match mime.as_str() {
        "application/x-www-form-urlencoded" => {
            request.form = body::parse_urlencoded(&request.body);
        }
        "application/json" => {
            if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&request.body) {
                request.form = body::json_fields(&value);
                request.json = Some(value);
            }
        }
        "multipart/form-data" => {
            if let Some(boundary) = body::multipart_boundary(&content_type) {
                let (fields, files) = body::parse_multipart(&request.body, boundary);
                request.multipart = fields;
                request.files = files;
            }
        }
        _ => {}
    }
    request.merge_params();

    request.server = ServerInfo {
        method: request.method.as_str().to_string(),
        path: request.uri_path().to_string(),
        query_string,
        protocol: request.version.clone(),
        remote_addr: info.remote_ip(),
        remote_port: info.remote_port(),
        local_addr: info.local_ip(),
        local_port: info.local_port(),
        request_time: chrono::Utc::now(),
    };

    Ok(request)
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    memmem::find(buf, b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_body_stops_at_declared_length() {
        let parsed = parse_packet(b"DELETE /x HTTP/1.1\r\nHost: a\r\nContent-Length: 2\r\n\r\nokay").unwrap();

        assert_eq!(parsed.method, Method::DELETE);
        assert_eq!(parsed.headers.get("Host").unwrap(), "a");
        assert_eq!(parsed.body, b"ok".to_vec());
    }

    #[test]
    fn first_line_shapes() {
        assert!(check_first_line(b"GET / HTTP/1.1"));
        assert!(check_first_line(b"get /a?b=c HTTP/1.0"));
        assert!(!check_first_line(b"GET index.html HTTP/1.1"));
        assert!(!check_first_line(b"BREW / HTTP/1.1"));
        assert!(!check_first_line(b"GET / HTTP/"));
        assert!(!check_first_line(b"GET / FTP/1.1"));
    }

    #[test]
    fn second_line_shapes() {
        assert!(check_second_line("Host: example.com"));
        assert!(check_second_line("host: my-app.local:8080"));
        assert!(!check_second_line("Host: example.com:0"));
        assert!(!check_second_line("Host: example.com:123456"));
        assert!(!check_second_line("Host:"));
        assert!(!check_second_line("Accept: */*"));
    }
}
