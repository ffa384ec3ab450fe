mod cli;
mod commands;
mod config;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sleepme_core::DeviceController;

use crate::cli::{Cli, Command, WatchArgs};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup tracing based on verbosity
    init_tracing(cli.global.verbose);

    // Dispatch and handle errors with proper exit codes
    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need an API connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global).await,

        // Shell completions generation
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "sleepme", &mut std::io::stdout());
            Ok(())
        }

        // All other commands talk to the API
        cmd => {
            let cfg = config::load_config_or_default();
            let require_device = !matches!(cmd, Command::Devices);
            let (mut device_config, profile_name) =
                config::resolve_device_config(&cli.global, &cfg, require_device)?;
            if let Command::Watch(WatchArgs {
                interval: Some(interval),
            }) = &cmd
            {
                device_config.poll_interval = *interval;
            }
            let controller = DeviceController::new(device_config)?;

            tracing::debug!(command = ?cmd, profile = %profile_name, "dispatching command");
            commands::dispatch(cmd, &controller, &cli.global)
                .await
                .map_err(|e| e.with_profile(&profile_name))
        }
    }
}
