// ── Core error types ──
//
// What crosses the boundary to consumers. Transient API failures are
// retried inside the core; only fatal and exhausted conditions end up here.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Fatal ────────────────────────────────────────────────────────
    /// The API token was rejected. Never retried; the consumer should
    /// prompt for re-configuration.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Communication ────────────────────────────────────────────────
    /// No usable response: connection failure, exhausted retries, or an
    /// unclassified HTTP error.
    #[error("Communication failure: {message}")]
    CommunicationFailure { message: String },

    /// A newer command for the same device replaced this one.
    #[error("Command superseded by a newer command")]
    Superseded,

    /// A read was skipped to protect the request quota.
    #[error("Request skipped: rate limit window is full")]
    Throttled,

    /// The API accepted the command but the device never reported the
    /// requested value.
    #[error("Could not confirm '{command}' on the device after {attempts} attempts")]
    VerificationFailed { command: String, attempts: u32 },

    // ── Caller errors ────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Device controller disconnected")]
    Disconnected,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for errors that must reach the consumer immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<sleepme_api::Error> for CoreError {
    fn from(err: sleepme_api::Error) -> Self {
        match err {
            sleepme_api::Error::InvalidToken => CoreError::Authentication {
                message: "API token rejected (HTTP 403)".into(),
            },
            sleepme_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            other => CoreError::CommunicationFailure {
                message: other.to_string(),
            },
        }
    }
}
