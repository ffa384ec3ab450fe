// ── Command gateway ──
//
// Single entry point for every request to one device. Owns the shared
// rate limiter and retry loop, and enforces that at most one mutating
// command is live per device: a new command cancels the previous one and
// waits (bounded) for it to release the command lane before its own first
// PATCH goes out.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use sleepme_api::{
    ClaimedDevice, DevicePatch, DeviceStatus, RateLimiter, RetryAction, RetryPolicy,
};
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::DeviceApi;
use crate::command::Command;
use crate::config::ReadPolicy;
use crate::error::CoreError;

/// The mutating command currently holding the device.
#[derive(Debug, Clone)]
pub struct InFlightCommand {
    id: u64,
    token: CancellationToken,
    field: &'static str,
    expected: Value,
}

impl InFlightCommand {
    /// Control field the command writes.
    pub fn field(&self) -> &'static str {
        self.field
    }

    /// Value the command is driving the field towards.
    pub fn expected(&self) -> &Value {
        &self.expected
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// How a request gets through the rate limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Wait for a slot.
    Wait,
    /// Take a slot only if one is free right now.
    Immediate,
}

pub struct CommandGateway<A: DeviceApi> {
    api: Arc<A>,
    device_id: String,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
    in_flight: Mutex<Option<InFlightCommand>>,
    lane: Arc<tokio::sync::Mutex<()>>,
    cancel_grace: Duration,
    next_id: AtomicU64,
}

impl<A: DeviceApi> CommandGateway<A> {
    pub fn new(
        api: Arc<A>,
        device_id: impl Into<String>,
        limiter: Arc<RateLimiter>,
        policy: RetryPolicy,
        cancel_grace: Duration,
    ) -> Self {
        Self {
            api,
            device_id: device_id.into(),
            limiter,
            policy,
            in_flight: Mutex::new(None),
            lane: Arc::new(tokio::sync::Mutex::new(())),
            cancel_grace,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// The command currently holding the device, if any.
    pub fn in_flight(&self) -> Option<InFlightCommand> {
        self.slot().clone()
    }

    /// Cancel whatever mutating command is live. Used on disconnect.
    pub fn cancel_in_flight(&self) {
        if let Some(current) = self.slot().as_ref() {
            debug!(device_id = %self.device_id, field = current.field, "cancelling in-flight command");
            current.token.cancel();
        }
    }

    // ── Mutating path ────────────────────────────────────────────────

    /// Claim the device for a new mutating command.
    ///
    /// Cancels the previous command, then waits up to the grace period for
    /// it to release the command lane. A command that has not stopped by
    /// then is logged and left to finish its current request.
    pub async fn begin(
        &self,
        field: &'static str,
        expected: Value,
    ) -> Result<CommandLease<'_, A>, CoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();

        let previous = self.slot().replace(InFlightCommand {
            id,
            token: token.clone(),
            field,
            expected,
        });
        if let Some(previous) = previous {
            debug!(
                device_id = %self.device_id,
                superseded = previous.field,
                by = field,
                "superseding in-flight command"
            );
            previous.token.cancel();
        }

        let lane = tokio::select! {
            biased;
            () = token.cancelled() => {
                self.release(id);
                return Err(CoreError::Superseded);
            }
            guard = tokio::time::timeout(self.cancel_grace, Arc::clone(&self.lane).lock_owned()) => {
                if let Ok(guard) = guard {
                    Some(guard)
                } else {
                    warn!(
                        device_id = %self.device_id,
                        grace_secs = self.cancel_grace.as_secs_f64(),
                        "superseded command did not stop in time, proceeding"
                    );
                    None
                }
            }
        };

        Ok(CommandLease {
            gateway: self,
            id,
            token,
            _lane: lane,
        })
    }

    /// Send one command with retries (no verification).
    pub async fn submit(&self, command: &Command) -> Result<Value, CoreError> {
        let lease = self.begin(command.field(), command.expected()).await?;
        lease.send(&command.to_patch()).await
    }

    // ── Read path ────────────────────────────────────────────────────

    /// Fetch the device document.
    ///
    /// With [`ReadPolicy::Drop`] the read is skipped (`Ok(None)`) when the
    /// quota window is full instead of competing with commands for a slot.
    pub async fn fetch_status(&self, policy: ReadPolicy) -> Result<Option<DeviceStatus>, CoreError> {
        let admission = match policy {
            ReadPolicy::Drop => Admission::Immediate,
            ReadPolicy::Queue => Admission::Wait,
        };
        let api = &*self.api;
        let device_id = self.device_id.as_str();
        match self
            .call("GET device", admission, None, move || api.get_device(device_id))
            .await
        {
            Ok(status) if status.is_empty() => Err(CoreError::CommunicationFailure {
                message: "GET device: API returned an empty response".into(),
            }),
            Ok(status) => Ok(Some(status)),
            Err(CoreError::Throttled) => {
                debug!(device_id = %self.device_id, "status read dropped, rate limit window full");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// List devices claimed by the token. Always queued.
    pub async fn list_devices(&self) -> Result<Vec<ClaimedDevice>, CoreError> {
        let api = &*self.api;
        self.call("GET devices", Admission::Wait, None, move || api.list_devices())
            .await
    }

    // ── Internals ────────────────────────────────────────────────────

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<InFlightCommand>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear the in-flight slot if it still belongs to command `id`.
    fn release(&self, id: u64) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|c| c.id == id) {
            *slot = None;
        }
    }

    /// Rate-limited retry loop shared by reads and writes.
    ///
    /// `cancel` is checked before each admission wait and before each
    /// backoff sleep. A request already on the wire is never abandoned.
    /// An immediate read that loses its retry slot fails with the error it
    /// is retrying, so the failure is not mistaken for a skipped read.
    async fn call<T, F, Fut>(
        &self,
        what: &str,
        admission: Admission,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, CoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, sleepme_api::Error>>,
    {
        let mut attempt = 0_u32;
        let mut last_err: Option<sleepme_api::Error> = None;
        loop {
            attempt += 1;
            check_cancelled(cancel)?;

            match admission {
                Admission::Immediate => {
                    if !self.limiter.try_admit() {
                        return Err(match last_err {
                            Some(err) => CoreError::CommunicationFailure {
                                message: format!(
                                    "{what}: {err} (retry skipped after {} attempts, rate limit window full)",
                                    attempt - 1
                                ),
                            },
                            None => CoreError::Throttled,
                        });
                    }
                }
                Admission::Wait => {
                    if let Some(token) = cancel {
                        tokio::select! {
                            biased;
                            () = token.cancelled() => return Err(CoreError::Superseded),
                            () = self.limiter.admit() => {}
                        }
                    } else {
                        self.limiter.admit().await;
                    }
                }
            }

            debug!(device_id = %self.device_id, attempt, "{what}");
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let step = self.policy.classify(&err, attempt);
            match step.action {
                RetryAction::Fatal | RetryAction::Fail => {
                    debug!(device_id = %self.device_id, attempt, kind = %step.kind, "{what} failed: {err}");
                    return Err(CoreError::from(err));
                }
                RetryAction::Retry(_) if self.policy.is_exhausted(attempt) => {
                    return Err(CoreError::CommunicationFailure {
                        message: format!("{what}: {err} (gave up after {attempt} attempts)"),
                    });
                }
                RetryAction::Retry(backoff) => {
                    warn!(
                        device_id = %self.device_id,
                        attempt,
                        kind = %step.kind,
                        backoff_secs = backoff.as_secs(),
                        "{what} failed, retrying"
                    );
                    check_cancelled(cancel)?;
                    sleep_unless_cancelled(backoff, cancel).await?;
                    last_err = Some(err);
                }
            }
        }
    }
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<(), CoreError> {
    if cancel.is_some_and(CancellationToken::is_cancelled) {
        Err(CoreError::Superseded)
    } else {
        Ok(())
    }
}

async fn sleep_unless_cancelled(
    duration: Duration,
    cancel: Option<&CancellationToken>,
) -> Result<(), CoreError> {
    match cancel {
        Some(token) => tokio::select! {
            biased;
            () = token.cancelled() => Err(CoreError::Superseded),
            () = tokio::time::sleep(duration) => Ok(()),
        },
        None => {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }
}

// ── Command lease ────────────────────────────────────────────────────

/// Exclusive right to issue mutating requests for one command.
///
/// Holds the command lane until dropped, so a verifying executor keeps
/// the device for its whole send/settle/verify cycle. Every suspension
/// point returns [`CoreError::Superseded`] once a newer command arrives.
pub struct CommandLease<'g, A: DeviceApi> {
    gateway: &'g CommandGateway<A>,
    id: u64,
    token: CancellationToken,
    _lane: Option<OwnedMutexGuard<()>>,
}

impl<A: DeviceApi> CommandLease<'_, A> {
    pub fn is_superseded(&self) -> bool {
        self.token.is_cancelled()
    }

    /// PATCH through the limiter with retries.
    pub async fn send(&self, patch: &DevicePatch) -> Result<Value, CoreError> {
        let gateway = self.gateway;
        let api = &*gateway.api;
        let device_id = gateway.device_id.as_str();
        gateway
            .call("PATCH device", Admission::Wait, Some(&self.token), move || {
                api.patch_device(device_id, patch)
            })
            .await
    }

    /// Sleep, waking early with `Superseded` if a newer command arrives.
    pub async fn sleep(&self, duration: Duration) -> Result<(), CoreError> {
        sleep_unless_cancelled(duration, Some(&self.token)).await
    }
}

impl<A: DeviceApi> Drop for CommandLease<'_, A> {
    fn drop(&mut self) {
        self.gateway.release(self.id);
    }
}
