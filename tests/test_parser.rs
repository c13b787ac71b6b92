use prefork::codec::ProtocolError;
use prefork::connection::ConnectionInfo;
use prefork::http::HttpOptions;
use prefork::http::parser::{decode_request, request_size};
use prefork::http::request::Method;

fn info() -> ConnectionInfo {
    ConnectionInfo::new(1, "10.0.0.7:51000", "10.0.0.1:8080")
}

#[test]
fn test_decode_simple_get_request() {
    let parsed = decode_request(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n", &info()).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.path, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert!(parsed.body.is_empty());
}

#[test]
fn test_decode_post_request_with_body() {
    let req = b"POST /api HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let parsed = decode_request(req, &info()).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.body, b"hello".to_vec());
}

#[test]
fn test_decode_lowercase_method() {
    let req = b"post /api HTTP/1.1\r\nHost: localhost\r\ncontent-length: 2\r\n\r\nok";
    let parsed = decode_request(req, &info()).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.body, b"ok".to_vec());
}

#[test]
fn test_decode_get_ignores_trailing_bytes() {
    let req = b"GET / HTTP/1.1\r\nHost: a\r\nContent-Length: 3\r\n\r\nabc";
    let parsed = decode_request(req, &info()).unwrap();

    assert!(parsed.body.is_empty());
}

#[test]
fn test_decode_without_head_terminator() {
    let err = decode_request(b"GET / HTTP/1.1\r\nHost: example.com\r\n", &info()).unwrap_err();
    assert_eq!(err, ProtocolError::Malformed("invalid head terminator".into()));
}

#[test]
fn test_decode_invalid_http_method() {
    let err = decode_request(b"INVALID / HTTP/1.1\r\n\r\n", &info()).unwrap_err();
    assert_eq!(err, ProtocolError::Malformed("invalid method".into()));
}

#[test]
fn test_decode_malformed_header() {
    let err = decode_request(b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n", &info()).unwrap_err();
    assert_eq!(err, ProtocolError::Malformed("invalid header".into()));
}

#[test]
fn test_request_size_waits_for_head() {
    let options = HttpOptions::default();
    assert_eq!(request_size(b"GET / HT", &options), Ok(None));
    assert_eq!(request_size(b"GET / HTTP/1.1\r\nHost: a", &options), Ok(None));
}

#[test]
fn test_request_size_counts_body() {
    let options = HttpOptions::default();
    let head = b"POST /submit HTTP/1.1\r\nHost: a\r\nContent-Length: 5\r\n\r\n";
    assert_eq!(request_size(head, &options), Ok(Some(head.len() + 5)));

    let get = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n";
    assert_eq!(request_size(get, &options), Ok(Some(get.len())));
}

#[test]
fn test_request_size_requires_length_for_post() {
    let options = HttpOptions::default();
    let head = b"POST /submit HTTP/1.1\r\nHost: a\r\n\r\n";
    assert_eq!(
        request_size(head, &options),
        Err(ProtocolError::LengthRequired("POST".into()))
    );
}

#[test]
fn test_request_size_limits() {
    let options = HttpOptions {
        max_request_line: 32,
        max_header: 64,
        gzip: true,
    };

    let long_line = vec![b'A'; 33];
    assert_eq!(
        request_size(&long_line, &options),
        Err(ProtocolError::RequestLineTooLong(32))
    );

    let mut big_head = b"GET / HTTP/1.1\r\nHost: a\r\n".to_vec();
    big_head.extend_from_slice(&[b'x'; 64]);
    assert_eq!(
        request_size(&big_head, &options),
        Err(ProtocolError::HeaderTooLarge(64))
    );

    assert!(matches!(
        request_size(b"FETCH / HTTP/1.1\r\n", &options),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_request_size_requires_host_line() {
    let options = HttpOptions::default();
    let head = b"GET / HTTP/1.1\r\nAccept: */*\r\nHost: a\r\n\r\n";
    assert!(matches!(request_size(head, &options), Err(ProtocolError::Malformed(_))));
}

#[test]
fn test_decode_request_fills_views() {
    let body = b"name=ada&lang=rust";
    let mut raw = format!(
        "POST /form?lang=c&page=2 HTTP/1.1\r\nHost: example.com\r\nCookie: session=abc; lang=go\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);

    let request = decode_request(&raw, &info()).unwrap();

    assert_eq!(request.query.get("page").map(String::as_str), Some("2"));
    assert_eq!(request.cookie("session"), Some("abc"));
    assert_eq!(request.form.get("name").map(String::as_str), Some("ada"));
    assert_eq!(request.param("lang"), Some("rust"));
    assert_eq!(request.param("page"), Some("2"));

    assert_eq!(request.server.method, "POST");
    assert_eq!(request.server.path, "/form");
    assert_eq!(request.server.query_string, "lang=c&page=2");
    assert_eq!(request.server.remote_addr, "10.0.0.7");
    assert_eq!(request.server.remote_port, 51000);
    assert_eq!(request.server.local_port, 8080);
}

#[test]
fn test_decode_request_json_body() {
    let body = br#"{"id":7,"name":"ada"}"#;
    let mut raw = format!(
        "PUT /users HTTP/1.1\r\nHost: a\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);

    let request = decode_request(&raw, &info()).unwrap();

    assert!(request.json.is_some());
    assert_eq!(request.param("name"), Some("ada"));
    assert_eq!(request.param("id"), Some("7"));
}

#[test]
fn test_decode_request_multipart_upload() {
    let body = b"--XyZ\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\nreport\r\n--XyZ\r\nContent-Disposition: form-data; name=\"doc\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--XyZ--\r\n";
    let mut raw = format!(
        "POST /upload HTTP/1.1\r\nHost: a\r\nContent-Type: multipart/form-data; boundary=XyZ\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(body);

    let request = decode_request(&raw, &info()).unwrap();

    assert_eq!(request.param("title"), Some("report"));
    let file = request.file("doc").unwrap();
    assert_eq!(file.filename, "a.txt");
    assert_eq!(file.content_type, "text/plain");
    assert_eq!(file.data, b"hello".to_vec());
}
