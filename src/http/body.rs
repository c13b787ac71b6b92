//! Request body, query string and cookie decoding.

use std::collections::HashMap;

use memchr::memmem;
use url::form_urlencoded;

use crate::http::request::UploadedFile;

/// Decodes `a=1&b=two%20words` style input.
pub fn parse_urlencoded(input: &[u8]) -> HashMap<String, String> {
    form_urlencoded::parse(input).into_owned().collect()
}

/// Decodes a `Cookie` header value (`a=1; b=2`).
pub fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .flat_map(|pair| form_urlencoded::parse(pair.as_bytes()).into_owned())
        .collect()
}

/// Flattens the top level of a JSON object into string values.
pub fn json_fields(value: &serde_json::Value) -> HashMap<String, String> {
    let Some(object) = value.as_object() else {
        return HashMap::new();
    };
    object
        .iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        })
        .collect()
}

/// Extracts the `boundary` parameter of a `multipart/form-data` content type.
pub fn multipart_boundary(content_type: &str) -> Option<&str> {
    let (mime, params) = content_type.split_once(';')?;
    if !mime.trim().eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }
    params.split(';').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        if key.trim().eq_ignore_ascii_case("boundary") {
            let value = value.trim().trim_matches('"');
            (!value.is_empty()).then_some(value)
        } else {
            None
        }
    })
}

/// Splits a multipart body into plain fields and uploaded files. Parts
/// without a name are skipped, as are file parts with an empty file name.
pub fn parse_multipart(body: &[u8], boundary: &str) -> (HashMap<String, String>, Vec<UploadedFile>) {
    let mut fields = HashMap::new();
    let mut files = Vec::new();

    let delimiter = format!("--{boundary}");
    let positions: Vec<usize> = memmem::find_iter(body, delimiter.as_bytes()).collect();

    for window in positions.windows(2) {
        let start = window[0] + delimiter.len();
        let part = &body[start..window[1]];
        if part.starts_with(b"--") {
            break;
        }
        let part = part.strip_prefix(b"\r\n").unwrap_or(part);
        let part = part.strip_suffix(b"\r\n").unwrap_or(part);

        let Some(split) = memmem::find(part, b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&part[..split]);
        let content = &part[split + 4..];

        let mut name = None;
        let mut filename = None;
        let mut content_type = String::from("application/octet-stream");
        for line in head.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("Content-Disposition") {
                name = disposition_param(value, "name");
                filename = disposition_param(value, "filename");
            } else if key.trim().eq_ignore_ascii_case("Content-Type") {
                content_type = value.trim().to_string();
            }
        }

        let Some(name) = name else {
            continue;
        };
        match filename {
            Some(filename) if !filename.is_empty() => files.push(UploadedFile {
                field: name,
                filename,
                content_type,
                data: content.to_vec(),
            }),
            Some(_) => {}
            None => {
                fields.insert(name, String::from_utf8_lossy(content).into_owned());
            }
        }
    }

    (fields, files)
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    value.split(';').skip(1).find_map(|param| {
        let (k, v) = param.trim().split_once('=')?;
        k.trim()
            .eq_ignore_ascii_case(key)
            .then(|| v.trim().trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cookies_are_trimmed_and_decoded() {
        let cookies = parse_cookies("session=abc; theme=dark%20mode;flag=1");
        assert_eq!(cookies.get("session").map(String::as_str), Some("abc"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark mode"));
        assert_eq!(cookies.get("flag").map(String::as_str), Some("1"));
    }

    #[test]
    fn boundary_is_extracted_with_or_without_quotes() {
        assert_eq!(
            multipart_boundary("multipart/form-data; boundary=XyZ"),
            Some("XyZ")
        );
        assert_eq!(
            multipart_boundary("multipart/form-data; charset=utf-8; boundary=\"q q\""),
            Some("q q")
        );
        assert_eq!(multipart_boundary("application/json"), None);
    }

    #[test]
    fn name_attribute_does_not_match_filename() {
        assert_eq!(
            disposition_param(" form-data; filename=\"a.txt\"; name=\"doc\"", "name"),
            Some("doc".to_string())
        );
    }

    #[test]
    fn json_object_fields_become_strings() {
        let value: serde_json::Value = serde_json::from_str(r#"{"a":"x","n":3,"b":true}"#).unwrap();
        let fields = json_fields(&value);
        assert_eq!(fields.get("a").map(String::as_str), Some("x"));
        assert_eq!(fields.get("n").map(String::as_str), Some("3"));
        assert_eq!(fields.get("b").map(String::as_str), Some("true"));
    }
}
