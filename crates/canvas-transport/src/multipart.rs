//! Multipart bodies for the remote API.
//!
//! Two shapes are needed:
//! - `multipart/mixed` batch requests, where each part is an embedded HTTP
//!   request and the response carries one embedded HTTP response per part;
//! - `multipart/related` uploads, metadata JSON followed by raw content.
//!
//! Batch parts are matched back to ids through their `Content-ID` headers
//! (`<item-N>` on the way out, `<response-item-N>` on the way back), never by
//! position, because the remote does not promise response order.

use std::collections::HashMap;

use crate::client::{BatchResults, RemoteFile};
use crate::error::RemoteError;

/// Build a fresh boundary string.
pub fn new_boundary(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// `Content-Type` header value for a multipart body.
pub fn content_type(kind: &str, boundary: &str) -> String {
    format!("multipart/{}; boundary={}", kind, boundary)
}

/// Encode a batch of metadata GETs against `files_path` (e.g. `/drive/v3/files`).
pub fn encode_batch_get(files_path: &str, ids: &[String], fields: &str, boundary: &str) -> String {
    let fields = urlencoding::encode(fields);
    let mut body = String::new();
    for (index, id) in ids.iter().enumerate() {
        body.push_str(&format!("--{}\r\n", boundary));
        body.push_str("Content-Type: application/http\r\n");
        body.push_str(&format!("Content-ID: <item-{}>\r\n\r\n", index));
        body.push_str(&format!(
            "GET {}/{}?fields={}&supportsAllDrives=true\r\n\r\n",
            files_path.trim_end_matches('/'),
            urlencoding::encode(id),
            fields
        ));
    }
    body.push_str(&format!("--{}--\r\n", boundary));
    body
}

/// Decode a batch response. `ids` must be the slice passed to
/// [`encode_batch_get`]; parts are mapped back through their Content-ID index.
pub fn decode_batch_response(
    content_type: &str,
    body: &str,
    ids: &[String],
) -> Result<BatchResults, RemoteError> {
    let boundary = boundary_from_content_type(content_type).ok_or_else(|| {
        RemoteError::Decode(format!("batch response has no boundary: {}", content_type))
    })?;
    let delimiter = format!("--{}", boundary);

    let mut results: BatchResults = HashMap::new();
    for section in body.split(delimiter.as_str()).skip(1) {
        if section.starts_with("--") {
            break;
        }
        let part = EmbeddedResponse::parse(section)?;
        let id = ids.get(part.index).ok_or_else(|| {
            RemoteError::Decode(format!("batch part index {} out of range", part.index))
        })?;
        let result = if (200..300).contains(&part.status) {
            serde_json::from_str::<RemoteFile>(part.body)
                .map_err(|e| RemoteError::Decode(format!("batch item {}: {}", id, e)))
        } else {
            Err(RemoteError::from_status(id, part.status, part.body))
        };
        results.insert(id.clone(), result);
    }
    Ok(results)
}

/// Encode a `multipart/related` upload: metadata JSON, then content.
pub fn encode_related_upload(metadata: &serde_json::Value, content: &[u8], boundary: &str) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .skip(1)
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
}

/// One embedded HTTP response inside a batch body.
struct EmbeddedResponse<'a> {
    index: usize,
    status: u16,
    body: &'a str,
}

impl<'a> EmbeddedResponse<'a> {
    fn parse(section: &'a str) -> Result<Self, RemoteError> {
        let section = section.trim_start_matches(['\r', '\n']);
        let (part_headers, http) = split_head(section)
            .ok_or_else(|| RemoteError::Decode("batch part has no body".to_string()))?;

        let index = header_value(part_headers, "content-id")
            .and_then(content_id_index)
            .ok_or_else(|| RemoteError::Decode("batch part has no usable Content-ID".to_string()))?;

        let (http_head, body) = split_head(http).unwrap_or((http, ""));
        let status = http_head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse::<u16>().ok())
            .ok_or_else(|| RemoteError::Decode("batch part has no status line".to_string()))?;

        Ok(Self {
            index,
            status,
            body: body.trim_end_matches(['\r', '\n']),
        })
    }
}

/// Split at the first blank line, accepting both CRLF and bare LF.
fn split_head(text: &str) -> Option<(&str, &str)> {
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let lf = text.find("\n\n").map(|i| (i, 2));
    let (at, len) = match (crlf, lf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&text[..at], &text[at + len..]))
}

fn header_value<'a>(head: &'a str, name: &str) -> Option<&'a str> {
    head.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
    })
}

/// `<response-item-12>` -> 12
fn content_id_index(value: &str) -> Option<usize> {
    value
        .trim_matches(['<', '>'])
        .rsplit('-')
        .next()
        .and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_encode_batch_get_has_one_part_per_id() {
        let body = encode_batch_get("/drive/v3/files/", &ids(&["a", "b c"]), "id,name", "xyz");

        assert_eq!(body.matches("--xyz\r\n").count(), 2);
        assert!(body.contains("Content-ID: <item-0>"));
        assert!(body.contains("Content-ID: <item-1>"));
        assert!(body.contains("GET /drive/v3/files/a?fields=id%2Cname&supportsAllDrives=true"));
        assert!(body.contains("GET /drive/v3/files/b%20c?"));
        assert!(body.ends_with("--xyz--\r\n"));
    }

    #[test]
    fn test_decode_maps_parts_by_content_id() {
        let body = concat!(
            "--batch_abc\r\n",
            "Content-Type: application/http\r\n",
            "Content-ID: <response-item-1>\r\n",
            "\r\n",
            "HTTP/1.1 404 Not Found\r\n",
            "Content-Type: application/json; charset=UTF-8\r\n",
            "\r\n",
            "{\"error\": {\"code\": 404, \"message\": \"File not found: b.\"}}\r\n",
            "--batch_abc\r\n",
            "Content-Type: application/http\r\n",
            "Content-ID: <response-item-0>\r\n",
            "\r\n",
            "HTTP/1.1 200 OK\r\n",
            "Content-Type: application/json; charset=UTF-8\r\n",
            "\r\n",
            "{\"id\": \"a\", \"name\": \"doc\", \"size\": \"3\"}\r\n",
            "--batch_abc\r\n",
            "Content-Type: application/http\r\n",
            "Content-ID: <response-item-2>\r\n",
            "\r\n",
            "HTTP/1.1 403 Forbidden\r\n",
            "\r\n",
            "{\"error\": {\"code\": 403, \"message\": \"User rate limit exceeded\"}}\r\n",
            "--batch_abc--\r\n",
        );

        let results = decode_batch_response(
            "multipart/mixed; boundary=batch_abc",
            body,
            &ids(&["a", "b", "c"]),
        )
        .unwrap();

        assert_eq!(results.len(), 3);
        let a = results["a"].as_ref().unwrap();
        assert_eq!(a.name.as_deref(), Some("doc"));
        assert_eq!(a.size, Some(3));
        assert!(results["b"].as_ref().unwrap_err().is_not_found());
        assert_eq!(
            results["c"].as_ref().unwrap_err(),
            &RemoteError::Status {
                status: 403,
                message: "User rate limit exceeded".to_string()
            }
        );
    }

    #[test]
    fn test_decode_accepts_bare_lf_and_quoted_boundary() {
        let body = "--b1\nContent-ID: <response-item-0>\n\nHTTP/1.1 200 OK\n\n{\"id\":\"a\"}\n--b1--\n";
        let results =
            decode_batch_response("multipart/mixed; boundary=\"b1\"", body, &ids(&["a"])).unwrap();
        assert_eq!(results["a"].as_ref().unwrap().id, "a");
    }

    #[test]
    fn test_decode_rejects_missing_boundary() {
        let err = decode_batch_response("application/json", "{}", &ids(&["a"])).unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[test]
    fn test_decode_rejects_out_of_range_index() {
        let body = "--b\r\nContent-ID: <response-item-5>\r\n\r\nHTTP/1.1 200 OK\r\n\r\n{}\r\n--b--";
        let err = decode_batch_response("multipart/mixed; boundary=b", body, &ids(&["a"])).unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }

    #[test]
    fn test_related_upload_layout() {
        let body = encode_related_upload(&serde_json::json!({"name": "n"}), b"\x00\x01", "rel");
        let text = String::from_utf8_lossy(&body);
        assert!(text.starts_with("--rel\r\nContent-Type: application/json"));
        assert!(text.contains("{\"name\":\"n\"}\r\n--rel\r\nContent-Type: application/octet-stream"));
        assert!(text.ends_with("\r\n--rel--\r\n"));
    }

    #[test]
    fn test_new_boundary_is_unique() {
        assert_ne!(new_boundary("batch"), new_boundary("batch"));
        assert_eq!(
            content_type("mixed", "abc"),
            "multipart/mixed; boundary=abc"
        );
    }
}
