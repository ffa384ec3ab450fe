//! Live snapshot stream.

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::debug;

use sleepme_core::{DeviceController, DeviceSnapshot};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::commands::status;
use crate::error::CliError;
use crate::output;

fn render(snap: &DeviceSnapshot, global: &GlobalOpts) -> Result<String, CliError> {
    Ok(match global.output {
        // One JSON document per line, so the stream stays parseable.
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(snap)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(snap)?),
        OutputFormat::Table | OutputFormat::Plain => format!(
            "{}  {}",
            snap.fetched_at
                .with_timezone(&chrono::Local)
                .format("%H:%M:%S"),
            status::summary_line(snap)
        ),
    })
}

/// Print every published snapshot until Ctrl-C.
///
/// The poll interval comes from `--interval` (applied when the controller
/// is built) or the profile.
pub async fn handle(
    controller: &DeviceController,
    args: WatchArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    debug!(interval = ?args.interval, "starting watch");
    controller.connect().await?;

    let mut snapshots = controller.subscribe().into_stream();
    let mut state = controller.connection_state();
    let mut last: Option<Arc<DeviceSnapshot>> = None;

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = state.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
                let current = *state.borrow_and_update();
                if !global.quiet {
                    eprintln!("connection: {current}");
                }
                if current == sleepme_core::ConnectionState::AuthenticationFailed {
                    break Err(CliError::AuthFailed { profile: "current".into() });
                }
            }
            next = snapshots.next() => {
                let Some(snap) = next else { break Ok(()) };
                // Failed polls republish the same snapshot; print changes only.
                if last.as_ref().is_some_and(|prev| **prev == *snap) {
                    continue;
                }
                match render(&snap, global) {
                    Ok(out) => output::print_output(&out, global.quiet),
                    Err(e) => break Err(e),
                }
                last = Some(snap);
            }
        }
    };

    controller.disconnect().await;
    result
}
