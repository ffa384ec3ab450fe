//! Device listing.

use tabled::Tabled;

use sleepme_core::{ClaimedDevice, DeviceController};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Attachments")]
    attachments: String,
}

impl From<&ClaimedDevice> for DeviceRow {
    fn from(d: &ClaimedDevice) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            attachments: if d.attachments.is_empty() {
                "-".into()
            } else {
                d.attachments.join(", ")
            },
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(controller: &DeviceController, global: &GlobalOpts) -> Result<(), CliError> {
    let devices = controller.list_devices().await?;
    let out = output::render_list(&global.output, &devices, |d| DeviceRow::from(d), |d| d.id.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
