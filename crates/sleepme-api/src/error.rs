use thiserror::Error;

/// Top-level error type for the `sleepme-api` crate.
///
/// One variant per failure mode the REST API can produce. `sleepme-core`
/// classifies these through [`ErrorKind`] to decide whether to back off,
/// fail fast, or give up for good.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The bearer token was rejected (HTTP 403).
    #[error("Invalid API token (HTTP 403)")]
    InvalidToken,

    // ── Throttling / server ─────────────────────────────────────────
    /// The API is throttling this token (HTTP 429).
    #[error("Rate limited by the API (HTTP 429)")]
    RateLimited,

    /// The API failed on its side (HTTP 5xx).
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS or HTTP client construction error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Unclassified HTTP ───────────────────────────────────────────
    /// Any other non-success status.
    #[error("Unexpected HTTP {status}: {message}")]
    Http { status: u16, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

/// Coarse classification of an [`Error`], used by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Credential rejected. Never retried.
    Authentication,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    Server,
    /// The request did not complete within its timeout.
    Timeout,
    /// No response at all (connection refused, DNS, reset).
    Connectivity,
    /// Anything else: unexpected status, bad URL, undecodable body.
    Other,
}

impl Error {
    /// Classify this error for retry purposes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidToken => ErrorKind::Authentication,
            Self::RateLimited => ErrorKind::RateLimited,
            Self::Server { .. } => ErrorKind::Server,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transport(e) if e.is_timeout() => ErrorKind::Timeout,
            Self::Transport(e) if e.is_connect() || e.is_request() => ErrorKind::Connectivity,
            Self::Transport(_)
            | Self::InvalidUrl(_)
            | Self::Tls(_)
            | Self::Http { .. }
            | Self::Deserialization { .. } => ErrorKind::Other,
        }
    }

    /// Returns `true` if the credential was rejected and re-configuration is needed.
    pub fn is_auth_error(&self) -> bool {
        self.kind() == ErrorKind::Authentication
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::RateLimited | ErrorKind::Server | ErrorKind::Timeout
        )
    }

    /// The HTTP status behind this error, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidToken => Some(403),
            Self::RateLimited => Some(429),
            Self::Server { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Build the error for a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = body.chars().take(200).collect::<String>();
        match status {
            403 => Self::InvalidToken,
            429 => Self::RateLimited,
            500..=599 => Self::Server { status, message },
            _ => Self::Http { status, message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_kinds() {
        assert_eq!(Error::from_status(403, "").kind(), ErrorKind::Authentication);
        assert_eq!(Error::from_status(429, "").kind(), ErrorKind::RateLimited);
        assert_eq!(Error::from_status(500, "").kind(), ErrorKind::Server);
        assert_eq!(Error::from_status(503, "").kind(), ErrorKind::Server);
        assert_eq!(Error::from_status(404, "").kind(), ErrorKind::Other);
        assert_eq!(Error::from_status(401, "").kind(), ErrorKind::Other);
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(1000);
        match Error::from_status(502, &body) {
            Error::Server { message, .. } => assert_eq!(message.len(), 200),
            other => panic!("expected Server error, got {other:?}"),
        }
    }

    #[test]
    fn timeout_is_transient() {
        let err = Error::Timeout { timeout_secs: 30 };
        assert!(err.is_transient());
        assert!(!err.is_auth_error());
        assert_eq!(err.status(), None);
    }
}
