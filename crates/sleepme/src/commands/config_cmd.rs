//! Config subcommand handlers.

use dialoguer::{Input, Select};
use secrecy::SecretString;

use sleepme_core::{DEFAULT_API_URL, DeviceConfig, DeviceController};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// List the token's devices and let the user pick one.
async fn pick_device(api_url: &str, token: &str) -> Result<Option<String>, CliError> {
    let url = api_url.parse().map_err(|_| CliError::Validation {
        field: "api_url".into(),
        reason: format!("invalid URL: {api_url}"),
    })?;
    let lister = DeviceController::new(DeviceConfig::new(
        url,
        SecretString::from(token.to_owned()),
        String::new(),
    ))?;

    let devices = lister.list_devices().await?;
    if devices.is_empty() {
        eprintln!("   No devices are claimed by this token");
        return Ok(None);
    }

    let labels: Vec<String> = devices
        .iter()
        .map(|d| format!("{} ({})", d.name, d.id))
        .collect();
    let selection = Select::new()
        .with_prompt("Device")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    Ok(devices.into_iter().nth(selection).map(|d| d.id))
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = config::config_path();
            eprintln!("sleepme configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            // 1. Profile name
            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default(global.profile.clone().unwrap_or_else(|| "default".into()))
                .interact_text()
                .map_err(prompt_err)?;

            // 2. API URL
            let api_url: String = Input::new()
                .with_prompt("API URL")
                .default(DEFAULT_API_URL.into())
                .interact_text()
                .map_err(prompt_err)?;

            // 3. Token
            let token = rpassword::prompt_password("API token: ").map_err(prompt_err)?;
            if token.is_empty() {
                return Err(CliError::Validation {
                    field: "api_token".into(),
                    reason: "API token cannot be empty".into(),
                });
            }

            // 4. Device: pick from the account, or type an id if listing fails
            let device_id = match pick_device(&api_url, &token).await {
                Ok(device) => device,
                Err(e) => {
                    eprintln!("   Could not list devices: {e}");
                    let id: String = Input::new()
                        .with_prompt("Device ID")
                        .allow_empty(true)
                        .interact_text()
                        .map_err(prompt_err)?;
                    (!id.is_empty()).then_some(id)
                }
            };

            // 5. Token storage
            let store_choices = &[
                "Store in system keyring (recommended)",
                "Save to config file (plaintext)",
            ];
            let store_selection = Select::new()
                .with_prompt("Where to store the API token?")
                .items(store_choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?;

            let api_token = if store_selection == 0 {
                sleepme_config::store_token(&profile_name, &token)?;
                eprintln!("   ✓ API token stored in system keyring");
                None
            } else {
                Some(token)
            };

            // 6. Merge into the existing config and write
            let mut cfg = config::load_config_or_default();
            let profile = Profile {
                api_url: (api_url != DEFAULT_API_URL).then_some(api_url),
                device_id,
                api_token,
                ..Profile::default()
            };
            cfg.profiles.insert(profile_name.clone(), profile);
            if cfg.profiles.len() == 1 {
                cfg.default_profile = Some(profile_name.clone());
            }

            let path = config::save_config(&cfg)?;

            eprintln!("\n✓ Configuration written to {}", path.display());
            eprintln!("  Profile: {profile_name}");
            eprintln!("\n  Test it: sleepme status -p {profile_name}");

            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let mut cfg = config::load_config_or_default();
            for profile in cfg.profiles.values_mut() {
                if profile.api_token.is_some() {
                    profile.api_token = Some("********".into());
                }
            }
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("<unrenderable: {e}>")),
                |c| {
                    let mut names: Vec<&str> = c.profiles.keys().map(String::as_str).collect();
                    names.sort_unstable();
                    names.join("\n")
                },
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Path ────────────────────────────────────────────────────
        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }
    }
}
