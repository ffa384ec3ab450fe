//! Shared configuration for Sleep.me tools.
//!
//! TOML profiles, token resolution (env + keyring + plaintext), and
//! translation to `sleepme_core::DeviceConfig`. The CLI layers its
//! flag overrides on top.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use sleepme_core::{DEFAULT_API_URL, DeviceConfig, ReadPolicy};

/// Environment variable consulted for the API token when a profile
/// does not name its own.
pub const TOKEN_ENV: &str = "SLEEPME_TOKEN";

const KEYRING_SERVICE: &str = "sleepme";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API token configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("profile '{profile}' does not name a device")]
    NoDevice { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use when none is given.
    pub fn default_profile_name(&self) -> &str {
        self.default_profile.as_deref().unwrap_or("default")
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}

/// A named device profile. Tuning fields left unset use the core defaults.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct Profile {
    /// API root. Defaults to the public Sleep.me endpoint.
    pub api_url: Option<String>,

    /// Device to control.
    pub device_id: Option<String>,

    /// API token (plaintext, prefer keyring or env var).
    pub api_token: Option<String>,

    /// Environment variable name containing the API token.
    pub api_token_env: Option<String>,

    /// Request timeout, seconds.
    pub timeout: Option<u64>,

    /// Background poll interval, seconds. 0 disables polling.
    pub poll_interval: Option<u64>,

    /// Delay between a command and its verification read, seconds.
    pub settle_delay: Option<u64>,

    /// Delay between verification attempts, seconds.
    pub retry_delay: Option<u64>,

    /// Verification attempts per command.
    pub verify_attempts: Option<u32>,

    /// Requests allowed per rate-limit window.
    pub max_requests: Option<usize>,

    /// Rate-limit window, seconds.
    pub rate_window: Option<u64>,

    /// Poll reads under rate pressure: "drop" or "queue".
    pub read_policy: Option<String>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("me", "sleep", "sleepme").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("sleepme");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path`, merged over defaults and under `SLEEPME_*`
/// environment variables (`__` separates nested keys, e.g.
/// `SLEEPME_DEFAULTS__OUTPUT=json`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SLEEPME_").split("__").ignore(&["token"]));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file is missing or invalid.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution (without CLI flags) ────────────────────────────

fn keyring_user(profile_name: &str) -> String {
    format!("{profile_name}/api-token")
}

/// Resolve the API token from the credential chain (no CLI flag step):
/// the profile's `api_token_env`, then `SLEEPME_TOKEN`, then the system
/// keyring, then plaintext `api_token`.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    resolve_token_with(profile, profile_name, |name| std::env::var(name).ok(), true)
}

fn resolve_token_with(
    profile: &Profile,
    profile_name: &str,
    env: impl Fn(&str) -> Option<String>,
    use_keyring: bool,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_token_env → env var lookup
    if let Some(ref env_name) = profile.api_token_env {
        if let Some(val) = env(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. Shared env var
    if let Some(val) = env(TOKEN_ENV) {
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if use_keyring {
        if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name)) {
            if let Ok(secret) = entry.get_password() {
                return Ok(SecretString::from(secret));
            }
        }
    }

    // 4. Plaintext in config
    if let Some(ref token) = profile.api_token {
        return Ok(SecretString::from(token.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store a token in the system keyring for `profile_name`.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(profile_name))?;
    entry.set_password(token)?;
    Ok(())
}

// ── Translation to DeviceConfig ─────────────────────────────────────

/// Parse the profile's API URL, falling back to the public endpoint.
pub fn profile_api_url(profile: &Profile) -> Result<url::Url, ConfigError> {
    let raw = profile.api_url.as_deref().unwrap_or(DEFAULT_API_URL);
    raw.parse().map_err(|_| ConfigError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {raw}"),
    })
}

/// Build a `DeviceConfig` from a profile, with no CLI flag overrides.
pub fn profile_to_device_config(
    profile: &Profile,
    profile_name: &str,
) -> Result<DeviceConfig, ConfigError> {
    let token = resolve_token(profile, profile_name)?;
    apply_profile(profile, profile_name, token)
}

/// Build a `DeviceConfig` from a profile and an already-resolved token.
pub fn apply_profile(
    profile: &Profile,
    profile_name: &str,
    token: SecretString,
) -> Result<DeviceConfig, ConfigError> {
    let api_url = profile_api_url(profile)?;
    let device_id = profile
        .device_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ConfigError::NoDevice {
            profile: profile_name.into(),
        })?;

    let mut config = DeviceConfig::new(api_url, token, device_id);

    if let Some(secs) = profile.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.poll_interval {
        config.poll_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.settle_delay {
        config.verify.settle_delay = Duration::from_secs(secs);
    }
    if let Some(secs) = profile.retry_delay {
        config.verify.retry_delay = Duration::from_secs(secs);
    }
    if let Some(n) = profile.verify_attempts {
        if n == 0 {
            return Err(ConfigError::Validation {
                field: "verify_attempts".into(),
                reason: "must be at least 1".into(),
            });
        }
        config.verify.max_attempts = n;
    }
    if let Some(n) = profile.max_requests {
        if n == 0 {
            return Err(ConfigError::Validation {
                field: "max_requests".into(),
                reason: "must be at least 1".into(),
            });
        }
        config.rate_limit.max_requests = n;
    }
    if let Some(secs) = profile.rate_window {
        config.rate_limit.window = Duration::from_secs(secs);
    }
    if let Some(ref policy) = profile.read_policy {
        config.read_policy = policy
            .parse::<ReadPolicy>()
            .map_err(|_| ConfigError::Validation {
                field: "read_policy".into(),
                reason: format!("expected 'drop' or 'queue', got '{policy}'"),
            })?;
    }

    Ok(config)
}
