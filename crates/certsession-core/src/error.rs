use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    // ----- Validation (construction-time, never retried) -----
    #[error("{field} cannot be empty")]
    MissingField { field: &'static str },

    #[error("Invalid {which}: {reason}")]
    InvalidCertificate { which: &'static str, reason: String },

    #[error("Invalid proxy URL: {0}")]
    InvalidProxy(#[from] url::ParseError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    // ----- Transport -----
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ----- Protocol -----
    #[error("Unable to parse response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Authentication rejected: status {status}, token {token}")]
    AuthRejected { status: String, token: String },

    #[error("Keep-alive rejected: status {status}, error {error}, token {token}")]
    KeepAliveRejected {
        status: String,
        error: String,
        token: String,
    },

    #[error("Logout rejected: status {status}, error {error}")]
    LogoutRejected { status: String, error: String },

    // ----- Lifecycle -----
    #[error("Session token not initialized")]
    NotInitialized,

    #[error("Session already closed")]
    AlreadyClosed,

    #[error("Timed out after {0:?} waiting for session shutdown")]
    ShutdownTimeout(Duration),

    // ----- Background notifications -----
    #[error("Keep-alive failed: {0}")]
    KeepAliveFailed(#[source] Box<SessionError>),

    #[error("Reconnect attempt {attempt} failed: {source}")]
    ReconnectFailed {
        attempt: u32,
        #[source]
        source: Box<SessionError>,
    },

    #[error("Max reconnect attempts reached ({attempts}), closing session")]
    RetriesExhausted { attempts: u32 },

    #[error("Logout failed: {0}")]
    LogoutFailed(#[source] Box<SessionError>),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Maximum length for response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Characters of a session token kept when it appears in an error
const TOKEN_PREVIEW_LENGTH: usize = 8;

impl SessionError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let cut = floor_char_boundary(body, MAX_ERROR_BODY_LENGTH);
            format!("{}... (truncated, {} total bytes)", &body[..cut], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        SessionError::Http {
            status: status.as_u16(),
            body: Self::truncate_body(body),
        }
    }

    /// Errors caused by bad construction inputs rather than the remote service
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SessionError::MissingField { .. }
                | SessionError::InvalidCertificate { .. }
                | SessionError::InvalidProxy(_)
                | SessionError::InvalidHeader(_)
                | SessionError::ClientBuild(_)
        )
    }

    /// The background notification that accompanies the automatic close
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionError::RetriesExhausted { .. })
    }
}

/// Shorten a token for diagnostics so full credentials never reach logs
pub(crate) fn preview_token(token: &str) -> String {
    if token.len() <= TOKEN_PREVIEW_LENGTH {
        token.to_string()
    } else {
        let cut = floor_char_boundary(token, TOKEN_PREVIEW_LENGTH);
        format!("{}...", &token[..cut])
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    let mut cut = max.min(s.len());
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_short_unchanged() {
        assert_eq!(SessionError::truncate_body("oops"), "oops");
    }

    #[test]
    fn test_truncate_body_long() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = SessionError::truncate_body(&body);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 520 total bytes)"));
    }

    #[test]
    fn test_preview_token() {
        assert_eq!(preview_token(""), "");
        assert_eq!(preview_token("abc"), "abc");
        assert_eq!(preview_token(&"t".repeat(44)), "tttttttt...");
    }

    #[test]
    fn test_missing_field_message() {
        let err = SessionError::MissingField { field: "username" };
        assert_eq!(err.to_string(), "username cannot be empty");
        assert!(err.is_validation());
        assert!(!err.is_terminal());
    }

    #[test]
    fn test_from_status() {
        let err = SessionError::from_status(reqwest::StatusCode::BAD_REQUEST, "bad filter");
        assert_eq!(err.to_string(), "HTTP 400: bad filter");
    }
}
