//! Current device state.

use sleepme_core::snapshot::{MAX_COOL_SENTINEL_C, MAX_HEAT_SENTINEL_C};
use sleepme_core::{DeviceController, DeviceSnapshot};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Key/value rows for a snapshot detail view.
pub fn detail_rows(snap: &DeviceSnapshot, color: bool) -> Vec<(&'static str, String)> {
    let connected = snap.is_connected();
    let water_low = snap.water_low();
    let set_point = match snap.raw_set_temperature_c() {
        Some(t) if t <= MAX_COOL_SENTINEL_C => "max cool".to_owned(),
        Some(t) if t >= MAX_HEAT_SENTINEL_C => "max heat".to_owned(),
        Some(t) => format!("{t:.1} °C"),
        None => "-".to_owned(),
    };

    vec![
        (
            "Connected",
            output::status_word(if connected { "yes" } else { "no" }, connected, color),
        ),
        (
            "Thermal Control",
            output::or_dash(snap.thermal_control_status()),
        ),
        ("Set Point", set_point),
        (
            "Water Temp",
            output::or_dash(snap.water_temperature_c().map(|t| format!("{t:.1} °C"))),
        ),
        (
            "Water Level",
            output::or_dash(snap.water_level_percent().map(|l| format!("{l}%"))),
        ),
        (
            "Water Low",
            output::status_word(if water_low { "yes" } else { "no" }, !water_low, color),
        ),
        (
            "Schedule",
            if snap.has_schedule_enabled() { "enabled" } else { "disabled" }.to_owned(),
        ),
        (
            "Brightness",
            output::or_dash(snap.brightness_level_percent().map(|b| format!("{b}%"))),
        ),
        ("Display Unit", output::or_dash(snap.display_temperature_unit())),
        ("Model", output::or_dash(snap.model())),
        ("Firmware", output::or_dash(snap.firmware_version())),
        ("Serial", output::or_dash(snap.serial_number())),
        ("MAC", output::or_dash(snap.mac_address())),
        ("Fetched", snap.fetched_at.to_rfc3339()),
    ]
}

/// One-line summary used by `--output plain` and `watch`.
pub fn summary_line(snap: &DeviceSnapshot) -> String {
    format!(
        "{} set={} water={} level={}",
        output::or_dash(snap.thermal_control_status()),
        output::or_dash(snap.set_temperature_c()),
        output::or_dash(snap.water_temperature_c()),
        output::or_dash(snap.water_level_percent()),
    )
}

pub async fn handle(controller: &DeviceController, global: &GlobalOpts) -> Result<(), CliError> {
    let snap = controller.refresh_now().await?;
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        snap.as_ref(),
        |s| output::render_details(&detail_rows(s, color)),
        summary_line,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
