//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use sleepme_config::ConfigError;
use sleepme_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const VERIFICATION: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not reach the Sleep.me API: {message}")]
    #[diagnostic(
        code(sleepme::connection_failed),
        help(
            "Check your network connection and the API URL.\n\
             Transient errors are already retried; try again in a minute."
        )
    )]
    ConnectionFailed { message: String },

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed for profile '{profile}'")]
    #[diagnostic(
        code(sleepme::auth_failed),
        help(
            "The API token was rejected. Create a new token in the Sleep.me\n\
             developer portal and run: sleepme config init --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No API token configured for profile '{profile}'")]
    #[diagnostic(
        code(sleepme::no_credentials),
        help(
            "Configure a token with: sleepme config init\n\
             Or set the SLEEPME_TOKEN environment variable."
        )
    )]
    NoCredentials { profile: String },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("Could not confirm '{command}' on the device after {attempts} attempt(s)")]
    #[diagnostic(
        code(sleepme::verification_failed),
        help(
            "The API accepted the request but the device never reported the new value.\n\
             Check that the device is online, then run: sleepme status"
        )
    )]
    VerificationFailed { command: String, attempts: u32 },

    #[error("Command was superseded by a newer command")]
    #[diagnostic(code(sleepme::superseded))]
    Superseded,

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(sleepme::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("No device selected for profile '{profile}'")]
    #[diagnostic(
        code(sleepme::no_device),
        help(
            "Pass --device <ID> or set device_id in the profile.\n\
             Run: sleepme devices to list your devices"
        )
    )]
    NoDevice { profile: String },

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(sleepme::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: sleepme config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(sleepme::config))]
    Config { message: String },

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    #[diagnostic(code(sleepme::json))]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    #[diagnostic(code(sleepme::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {0}")]
    #[diagnostic(code(sleepme::internal))]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::VerificationFailed { .. } => exit_code::VERIFICATION,
            Self::Validation { .. } | Self::NoDevice { .. } | Self::ProfileNotFound { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }

    /// Attach the active profile name to an authentication failure.
    pub fn with_profile(self, profile: &str) -> Self {
        match self {
            Self::AuthFailed { .. } => Self::AuthFailed {
                profile: profile.into(),
            },
            other => other,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Authentication { .. } => CliError::AuthFailed {
                profile: "current".into(),
            },
            CoreError::CommunicationFailure { message } => CliError::ConnectionFailed { message },
            CoreError::Disconnected => CliError::ConnectionFailed {
                message: "device controller disconnected".into(),
            },
            CoreError::Throttled => CliError::ConnectionFailed {
                message: "request quota exhausted, try again shortly".into(),
            },
            CoreError::Superseded => CliError::Superseded,
            CoreError::VerificationFailed { command, attempts } => {
                CliError::VerificationFailed { command, attempts }
            }
            CoreError::Validation { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => CliError::NoCredentials { profile },
            ConfigError::NoDevice { profile } => CliError::NoDevice { profile },
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
