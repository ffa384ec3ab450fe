//! Verified device commands: temperature, power, schedule, brightness, presets.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use sleepme_core::{Command, DeviceController, ExecutionReport, Preset};

use crate::cli::{BrightnessArgs, GlobalOpts, PresetArg, PresetArgs, SetTempArgs, ToggleArgs};
use crate::error::CliError;
use crate::output;

/// Spinner on stderr while a command settles; hidden for scripts.
fn spinner(message: String, quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

async fn run(
    controller: &DeviceController,
    command: Command,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let pb = spinner(format!("{}: waiting for the device", command.description()), global.quiet);
    let result = controller.execute(command).await;
    pb.finish_and_clear();

    let report = result?.into_result()?;
    let out = render_report(&report, global)?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn render_report(report: &ExecutionReport, global: &GlobalOpts) -> Result<String, CliError> {
    let color = output::should_color(&global.color);
    output::render_single(
        &global.output,
        report,
        |r| {
            output::render_details(&[
                ("Command", r.command.clone()),
                (
                    "Result",
                    output::status_word(&r.phase.to_string(), r.is_verified(), color),
                ),
                ("Attempts", r.attempts.to_string()),
            ])
        },
        |r| r.phase.to_string(),
    )
}

pub async fn set_temp(
    controller: &DeviceController,
    args: SetTempArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command = Command::set_temperature(args.celsius).map_err(|e| CliError::Validation {
        field: "celsius".into(),
        reason: e.to_string(),
    })?;
    run(controller, command, global).await
}

pub async fn power(
    controller: &DeviceController,
    args: ToggleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    run(controller, Command::set_power(args.state.is_on()), global).await
}

pub async fn schedule(
    controller: &DeviceController,
    args: ToggleArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    run(
        controller,
        Command::SetScheduleEnabled(args.state.is_on()),
        global,
    )
    .await
}

pub async fn brightness(
    controller: &DeviceController,
    args: BrightnessArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let command = Command::set_brightness(args.percent)?;
    run(controller, command, global).await
}

pub async fn preset(
    controller: &DeviceController,
    args: PresetArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let preset = match args.preset {
        PresetArg::None => Preset::None,
        PresetArg::MaxCool => Preset::MaxCool,
        PresetArg::MaxHeat => Preset::MaxHeat,
    };

    // Presets decide on standby and restore targets from current state.
    controller.refresh_now().await?;

    let pb = spinner(format!("preset {preset}: waiting for the device"), global.quiet);
    let result = controller.set_preset(preset).await;
    pb.finish_and_clear();

    if !result? {
        return Err(CliError::VerificationFailed {
            command: format!("preset {preset}"),
            attempts: controller.config().verify.max_attempts,
        });
    }
    if !global.quiet {
        eprintln!("Preset {preset} applied");
    }
    Ok(())
}
