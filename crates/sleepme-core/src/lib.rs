//! Device communication core between `sleepme-api` and its consumers.
//!
//! Everything that makes talking to a Dock Pro through the cloud API safe
//! lives here:
//!
//! - **[`DeviceController`]**: facade for one device.
//!   [`connect()`](DeviceController::connect) fetches the first snapshot and
//!   spawns the poll task; the `set_*` methods run verified commands and
//!   answer `true` only once the device reports the new value.
//!
//! - **[`CommandGateway`]**: every request passes through it. Shares one
//!   [`RateLimiter`](sleepme_api::RateLimiter) across reads and writes,
//!   runs the retry loop, and supersedes a stale mutating command before the
//!   next one sends.
//!
//! - **[`VerifyingCommandExecutor`]**: send → settle → refresh → verify,
//!   retried as a whole cycle.
//!
//! - **[`PollCoordinator`]**: owns the published [`DeviceSnapshot`],
//!   refreshed on an interval and on demand; keeps the last good snapshot
//!   when a poll fails.
//!
//! - **[`SnapshotStream`]**: subscription handle with `current()` /
//!   `latest()` / `changed()` and a `Stream` adapter.

pub mod api;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod poller;
pub mod snapshot;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use api::DeviceApi;
pub use command::{Command, Preset};
pub use config::{DeviceConfig, RateLimitConfig, ReadPolicy, VerifyConfig};
pub use controller::{ConnectionState, DeviceController};
pub use error::CoreError;
pub use executor::{CommandPhase, ExecutionReport, VerifyingCommandExecutor};
pub use gateway::{CommandGateway, CommandLease, InFlightCommand};
pub use poller::{PollCoordinator, PollHealth, TickOutcome};
pub use snapshot::DeviceSnapshot;
pub use stream::{SnapshotStream, SnapshotWatchStream};

// Wire types consumers commonly need alongside the core.
pub use sleepme_api::{
    ClaimedDevice, DEFAULT_API_URL, MAX_TEMPERATURE_C, MIN_TEMPERATURE_C, RetryPolicy,
    ThermalControlStatus,
};
