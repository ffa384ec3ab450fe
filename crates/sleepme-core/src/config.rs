// ── Runtime device configuration ──
//
// Describes how to reach one device and how hard to push the API.
// Carries credential data but never touches disk: the CLI (or any other
// consumer) builds a `DeviceConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use sleepme_api::RetryPolicy;
use url::Url;

/// What the poll task does with a read when the quota window is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ReadPolicy {
    /// Skip this cycle and keep the last snapshot.
    #[default]
    Drop,
    /// Wait for a slot like a command would.
    Queue,
}

/// Request quota shared by every call to one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 9,
            window: Duration::from_secs(60),
        }
    }
}

/// Timing of the command → settle → verify cycle.
///
/// `settle_delay` absorbs device-side lag after the API acknowledges a
/// write; `retry_delay` spaces out whole-cycle retries. They are separate
/// knobs on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyConfig {
    pub max_attempts: u32,
    pub settle_delay: Duration,
    pub retry_delay: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            settle_delay: Duration::from_secs(10),
            retry_delay: Duration::from_secs(127),
        }
    }
}

/// Configuration for talking to a single device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// API root (e.g. `https://api.developer.sleep.me/v1`).
    pub api_url: Url,
    /// Bearer token.
    pub token: SecretString,
    /// Device to control.
    pub device_id: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Background poll cadence. Zero disables the poll task.
    pub poll_interval: Duration,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryPolicy,
    pub verify: VerifyConfig,
    /// How long a new command waits for a superseded one to wind down.
    pub cancel_grace: Duration,
    pub read_policy: ReadPolicy,
}

impl DeviceConfig {
    /// Build a config with default tuning.
    pub fn new(api_url: Url, token: SecretString, device_id: impl Into<String>) -> Self {
        Self {
            api_url,
            token,
            device_id: device_id.into(),
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_secs(20),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            verify: VerifyConfig::default(),
            cancel_grace: Duration::from_secs(5),
            read_policy: ReadPolicy::default(),
        }
    }
}
