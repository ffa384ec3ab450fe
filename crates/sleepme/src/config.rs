//! CLI configuration: thin wrapper around `sleepme_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --device, --token, timing flags).

use std::time::Duration;

use secrecy::SecretString;

use sleepme_core::DeviceConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use sleepme_config::{Config, Profile, config_path, load_config_or_default, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| config.default_profile_name().to_owned())
}

/// Build a `DeviceConfig` from the config file, the active profile and
/// CLI flag overrides. Flags win over profile values.
///
/// With `require_device = false` (device listing) a missing device id is
/// tolerated.
pub fn resolve_device_config(
    global: &GlobalOpts,
    config: &Config,
    require_device: bool,
) -> Result<(DeviceConfig, String), CliError> {
    let profile_name = active_profile_name(global, config);

    let profile = match config.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly named profile must exist.
        None if global.profile.is_some() => {
            let mut available: Vec<&str> = config.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: if available.is_empty() {
                    "(none)".into()
                } else {
                    available.join(", ")
                },
            });
        }
        // No profile: run from flags and environment alone.
        None => Profile::default(),
    };

    let merged = Profile {
        api_url: global.api_url.clone().or(profile.api_url.clone()),
        device_id: global
            .device
            .clone()
            .or(profile.device_id.clone())
            .or_else(|| (!require_device).then(String::new)),
        timeout: global.timeout.or(profile.timeout),
        ..profile
    };

    // Token: flag / SLEEPME_TOKEN first, then the shared chain.
    let token = match global.token {
        Some(ref token) => SecretString::from(token.clone()),
        None => sleepme_config::resolve_token(&merged, &profile_name)?,
    };

    let mut device = if require_device {
        sleepme_config::apply_profile(&merged, &profile_name, token)?
    } else {
        let url = sleepme_config::profile_api_url(&merged)?;
        let mut cfg = DeviceConfig::new(url, token, merged.device_id.clone().unwrap_or_default());
        if let Some(secs) = merged.timeout {
            cfg.timeout = Duration::from_secs(secs);
        }
        cfg
    };

    if let Some(delay) = global.settle_delay {
        device.verify.settle_delay = delay;
    }
    if let Some(delay) = global.retry_delay {
        device.verify.retry_delay = delay;
    }

    Ok((device, profile_name))
}
