//! Tagged errors produced at the transport boundary.
//!
//! Every remote failure is classified here, once, so callers match on
//! [`RemoteError`] instead of inspecting response bodies.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote reports the resource does not exist (HTTP 404).
    #[error("resource not found: {id}")]
    NotFound { id: String },

    /// The remote answered with a non-success status.
    #[error("remote returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response (DNS, TLS, connection reset, ...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but could not be understood.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// No credentials could be produced for the request.
    #[error("authorization unavailable: {0}")]
    Unauthorized(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound { .. })
    }

    /// Classify an HTTP status plus its body for resource `id`.
    pub fn from_status(id: &str, status: u16, body: &str) -> Self {
        if status == 404 {
            return RemoteError::NotFound { id: id.to_string() };
        }
        RemoteError::Status {
            status,
            message: error_message(body).unwrap_or_else(|| format!("HTTP {}", status)),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Extract `error.message` from a JSON error body, if it has one.
pub(crate) fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .map(|envelope| envelope.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_404_is_not_found_regardless_of_body() {
        let err = RemoteError::from_status("abc", 404, "<html>gone</html>");
        assert_eq!(err, RemoteError::NotFound { id: "abc".to_string() });
        assert!(err.is_not_found());
    }

    #[test]
    fn test_status_uses_error_envelope_message() {
        let body = r#"{"error": {"code": 403, "message": "Rate limit exceeded"}}"#;
        let err = RemoteError::from_status("abc", 403, body);
        assert_eq!(
            err,
            RemoteError::Status {
                status: 403,
                message: "Rate limit exceeded".to_string()
            }
        );
    }

    #[test]
    fn test_status_without_envelope_falls_back_to_code() {
        let err = RemoteError::from_status("abc", 500, "oops");
        assert_eq!(err.to_string(), "remote returned status 500: HTTP 500");
    }
}
