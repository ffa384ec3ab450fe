//! Command dispatch: bridges CLI args -> core controller -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod devices;
pub mod status;
pub mod watch;

use sleepme_core::DeviceController;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch an API-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &DeviceController,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Devices => devices::handle(controller, global).await,
        Command::Status => status::handle(controller, global).await,
        Command::SetTemp(args) => control::set_temp(controller, args, global).await,
        Command::Power(args) => control::power(controller, args, global).await,
        Command::Schedule(args) => control::schedule(controller, args, global).await,
        Command::Brightness(args) => control::brightness(controller, args, global).await,
        Command::Preset(args) => control::preset(controller, args, global).await,
        Command::Watch(args) => watch::handle(controller, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}
