use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// The seven verbs the request-line check accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Method {
    #[default]
    GET,
    POST,
    PUT,
    DELETE,
    HEAD,
    OPTIONS,
    PATCH,
}

/// One file from a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Form field name
    pub field: String,
    /// Client-side file name
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Per-request server and peer metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    pub method: String,
    /// Request target without the query string
    pub path: String,
    pub query_string: String,
    pub protocol: String,
    pub remote_addr: String,
    pub remote_port: u16,
    pub local_addr: String,
    pub local_port: u16,
    pub request_time: DateTime<Utc>,
}

/// A complete request as cut from the stream by the HTTP codec.
///
/// `path` is the raw request target including any query string. The
/// decoded views of the request (query, cookies, body forms, uploaded
/// files) sit next to the raw `body`, and `params` merges them with the
/// precedence body > multipart > query > cookies.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    /// Raw target, e.g. `/search?q=rust`
    pub path: String,
    pub version: String,
    /// Later duplicates overwrite earlier ones
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub query: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    /// Fields of a urlencoded or JSON object body
    pub form: HashMap<String, String>,
    /// Non-file fields of a multipart body
    pub multipart: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
    pub json: Option<serde_json::Value>,
    pub params: HashMap<String, String>,
    pub server: ServerInfo,
}

impl Method {
    /// Case-sensitive lookup of a request-line verb.
    ///
    /// ```
    /// # use prefork::http::request::Method;
    /// assert_eq!(Method::from_str("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Method::GET),
            "POST" => Some(Method::POST),
            "PUT" => Some(Method::PUT),
            "DELETE" => Some(Method::DELETE),
            "HEAD" => Some(Method::HEAD),
            "OPTIONS" => Some(Method::OPTIONS),
            "PATCH" => Some(Method::PATCH),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
        }
    }

    /// Whether the request carries no body regardless of its headers.
    pub fn ignores_body(&self) -> bool {
        matches!(self, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    /// Whether a `Content-Length` header is mandatory.
    pub fn requires_length(&self) -> bool {
        matches!(self, Method::POST | Method::PUT | Method::PATCH)
    }
}

impl Request {
    /// Retrieves a header value by name, ignoring ASCII case.
    pub fn header(&self, key: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(key) {
            return Some(value.as_str());
        }
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    /// Determines whether the connection should remain open after the response.
    ///
    /// An explicit Connection header wins. Without one, HTTP/1.0 closes and
    /// everything else keeps the connection alive.
    pub fn keep_alive(&self) -> bool {
        match self.header("Connection") {
            Some(value) => !value.eq_ignore_ascii_case("close"),
            None => !self.version.eq_ignore_ascii_case("HTTP/1.0"),
        }
    }

    /// Request target without the query string.
    pub fn uri_path(&self) -> &str {
        self.path
            .split_once('?')
            .map_or(self.path.as_str(), |(path, _)| path)
    }

    /// Looks a name up in the merged parameters.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|file| file.field == field)
    }

    pub fn accepts_gzip(&self) -> bool {
        self.header("Accept-Encoding")
            .map(|v| v.split(',').any(|coding| coding.trim().starts_with("gzip")))
            .unwrap_or(false)
    }

    /// Rebuilds `params` from the decoded sources.
    pub fn merge_params(&mut self) {
        let mut params = self.cookies.clone();
        params.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        params.extend(self.multipart.iter().map(|(k, v)| (k.clone(), v.clone())));
        params.extend(self.form.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.params = params;
    }
}
