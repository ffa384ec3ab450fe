// ── Device controller ──
//
// Facade wiring the limiter, gateway, poller and executor for one device
// and exposing the read/command surface consumers bind to.

use std::sync::{Arc, PoisonError};

use sleepme_api::{
    ClaimedDevice, MAX_TEMPERATURE_C, MIN_TEMPERATURE_C, RateLimiter, SleepMeClient,
    ThermalControlStatus, TransportConfig,
};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::DeviceApi;
use crate::command::{Command, Preset};
use crate::config::DeviceConfig;
use crate::error::CoreError;
use crate::executor::{ExecutionReport, VerifyingCommandExecutor};
use crate::gateway::CommandGateway;
use crate::poller::{PollCoordinator, PollHealth};
use crate::snapshot::{DeviceSnapshot, is_preset_sentinel};
use crate::stream::SnapshotStream;

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Connected, but recent polls failed. The snapshot may be stale.
    Degraded,
    /// The token was rejected. Needs re-configuration.
    AuthenticationFailed,
}

// ── Controller ───────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. [`connect()`](Self::connect)
/// fetches the first snapshot and starts background polling; the command
/// methods send, settle and verify before reporting success.
pub struct DeviceController<A: DeviceApi = SleepMeClient> {
    inner: Arc<ControllerInner<A>>,
}

impl<A: DeviceApi> Clone for DeviceController<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<A: DeviceApi> {
    config: DeviceConfig,
    gateway: Arc<CommandGateway<A>>,
    poller: Arc<PollCoordinator<A>>,
    executor: VerifyingCommandExecutor<A>,
    connection_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    /// Child token for the current connection. Cancelled on disconnect,
    /// replaced on reconnect.
    cancel_child: Mutex<CancellationToken>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    /// Last real set-point seen before a preset took over.
    saved_set_point: std::sync::Mutex<Option<f64>>,
}

impl DeviceController<SleepMeClient> {
    /// Create a controller talking to the real API. Does NOT connect.
    pub fn new(config: DeviceConfig) -> Result<Self, CoreError> {
        let transport = TransportConfig {
            timeout: config.timeout,
        };
        let client = SleepMeClient::new(config.api_url.clone(), &config.token, &transport)?;
        Ok(Self::with_api(config, client))
    }
}

impl<A: DeviceApi> DeviceController<A> {
    /// Create a controller over any [`DeviceApi`] implementation.
    pub fn with_api(config: DeviceConfig, api: A) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit.max_requests,
            config.rate_limit.window,
        ));
        let gateway = Arc::new(CommandGateway::new(
            Arc::new(api),
            config.device_id.clone(),
            limiter,
            config.retry.clone(),
            config.cancel_grace,
        ));
        let poller = Arc::new(PollCoordinator::new(
            Arc::clone(&gateway),
            config.read_policy,
        ));
        let executor = VerifyingCommandExecutor::new(
            Arc::clone(&gateway),
            Arc::clone(&poller),
            config.verify.clone(),
        );
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();
        let cancel_child = cancel.child_token();

        Self {
            inner: Arc::new(ControllerInner {
                config,
                gateway,
                poller,
                executor,
                connection_state,
                cancel,
                cancel_child: Mutex::new(cancel_child),
                task_handles: Mutex::new(Vec::new()),
                saved_set_point: std::sync::Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn device_id(&self) -> &str {
        &self.inner.config.device_id
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Fetch the first snapshot and start background polling.
    ///
    /// A rejected token fails the connect with [`CoreError::Authentication`].
    pub async fn connect(&self) -> Result<(), CoreError> {
        self.inner
            .connection_state
            .send_replace(ConnectionState::Connecting);

        // A reconnect replaces the previous connection's tasks.
        let child = self.inner.cancel.child_token();
        let previous = std::mem::replace(&mut *self.inner.cancel_child.lock().await, child.clone());
        previous.cancel();
        for handle in self.inner.task_handles.lock().await.drain(..) {
            let _ = handle.await;
        }

        if let Err(e) = self.inner.poller.force_refresh().await {
            let state = if e.is_fatal() {
                ConnectionState::AuthenticationFailed
            } else {
                ConnectionState::Disconnected
            };
            self.inner.connection_state.send_replace(state);
            return Err(e);
        }

        let interval = self.inner.config.poll_interval;
        if !interval.is_zero() {
            let mut handles = self.inner.task_handles.lock().await;
            let poller = Arc::clone(&self.inner.poller);
            handles.push(tokio::spawn(poller.run(interval, child.clone())));
            handles.push(tokio::spawn(health_watch_task(
                self.inner.poller.health_changes(),
                self.inner.connection_state.clone(),
                child,
            )));
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Connected);
        info!(device_id = %self.device_id(), "connected to device");
        Ok(())
    }

    /// Stop background polling, cancel any in-flight command and wait for
    /// the tasks to finish.
    pub async fn disconnect(&self) {
        self.inner.cancel_child.lock().await.cancel();
        self.inner.gateway.cancel_in_flight();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }

        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        debug!(device_id = %self.device_id(), "disconnected");
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    pub fn poll_health(&self) -> PollHealth {
        self.inner.poller.health()
    }

    // ── Reads ────────────────────────────────────────────────────

    /// The last published snapshot. Never blocks and never fails.
    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.inner.poller.snapshot()
    }

    pub fn subscribe(&self) -> SnapshotStream {
        self.inner.poller.subscribe()
    }

    /// Fetch and publish a fresh snapshot now.
    pub async fn refresh_now(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        let result = self.inner.poller.force_refresh().await;
        self.note_auth(&result);
        result
    }

    /// Devices claimed by the configured token.
    pub async fn list_devices(&self) -> Result<Vec<ClaimedDevice>, CoreError> {
        let result = self.inner.gateway.list_devices().await;
        self.note_auth(&result);
        result
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Run one verified command and return the full report.
    pub async fn execute(&self, command: Command) -> Result<ExecutionReport, CoreError> {
        let result = self.inner.executor.execute(&command).await;
        self.note_auth(&result);
        result
    }

    /// Set the target temperature in °C (rounded to 0.5 °C).
    ///
    /// `Ok(false)` means the API never confirmed the change; the snapshot
    /// keeps showing the device's real state.
    pub async fn set_temperature(&self, celsius: f64) -> Result<bool, CoreError> {
        let command = Command::set_temperature(celsius)?;
        let report = self.execute(command).await?;
        if report.is_verified() {
            if let Some(set_point) = report.snapshot.as_ref().and_then(|s| s.set_temperature_c()) {
                self.save_set_point(set_point);
            }
        }
        Ok(report.is_verified())
    }

    /// Turn thermal control on (`active`) or off (`standby`).
    pub async fn set_power_state(&self, on: bool) -> Result<bool, CoreError> {
        let report = self.execute(Command::set_power(on)).await?;
        Ok(report.is_verified())
    }

    pub async fn set_schedule_enabled(&self, enabled: bool) -> Result<bool, CoreError> {
        let report = self.execute(Command::SetScheduleEnabled(enabled)).await?;
        Ok(report.is_verified())
    }

    pub async fn set_brightness(&self, percent: u8) -> Result<bool, CoreError> {
        let command = Command::set_brightness(percent)?;
        let report = self.execute(command).await?;
        Ok(report.is_verified())
    }

    /// Apply a temperature preset.
    ///
    /// A device in standby is switched on before a sentinel preset is sent.
    /// [`Preset::None`] only acts while a preset is active: it restores the
    /// set-point remembered when the preset was applied, falling back to the
    /// current water temperature, and leaves the power state alone.
    pub async fn set_preset(&self, preset: Preset) -> Result<bool, CoreError> {
        let snapshot = self.snapshot();

        let Some(sentinel) = preset.sentinel() else {
            if !snapshot.raw_set_temperature_c().is_some_and(is_preset_sentinel) {
                debug!(device_id = %self.device_id(), "no preset active, nothing to restore");
                return Ok(true);
            }
            let target = self
                .saved_set_point()
                .or_else(|| snapshot.water_temperature_c())
                .ok_or_else(|| CoreError::Validation {
                    message: "no previous set-point or water temperature to restore".into(),
                })?;
            let command =
                Command::set_temperature(target.clamp(MIN_TEMPERATURE_C, MAX_TEMPERATURE_C))?;
            let report = self.execute(command).await?;
            return Ok(report.is_verified());
        };

        if let Some(current) = snapshot.set_temperature_c() {
            self.save_set_point(current);
        }
        let command = Command::set_temperature(sentinel)?;

        if snapshot.thermal_control_status() == Some(ThermalControlStatus::Standby) {
            debug!(device_id = %self.device_id(), %preset, "device in standby, switching on first");
            if !self.set_power_state(true).await? {
                warn!(device_id = %self.device_id(), %preset, "could not switch device on, preset not applied");
                return Ok(false);
            }
        }

        let report = self.execute(command).await?;
        Ok(report.is_verified())
    }

    // ── Internals ────────────────────────────────────────────────

    fn note_auth<T>(&self, result: &Result<T, CoreError>) {
        if matches!(result, Err(e) if e.is_fatal()) {
            self.inner
                .connection_state
                .send_replace(ConnectionState::AuthenticationFailed);
        }
    }

    fn saved_set_point(&self) -> Option<f64> {
        *self
            .inner
            .saved_set_point
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn save_set_point(&self, celsius: f64) {
        *self
            .inner
            .saved_set_point
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(celsius);
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Mirror poll health into the connection state.
async fn health_watch_task(
    mut health: watch::Receiver<PollHealth>,
    state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = health.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = {
                    let h = health.borrow_and_update();
                    if h.auth_failed {
                        ConnectionState::AuthenticationFailed
                    } else if h.is_degraded() {
                        ConnectionState::Degraded
                    } else {
                        ConnectionState::Connected
                    }
                };
                state.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next;
                        true
                    }
                });
            }
        }
    }
}
