// ── Verifying command executor ──
//
// The device may lag the API's acknowledgement, so a command only counts
// once a fresh snapshot shows it. Each attempt is: send, wait the settle
// delay, force a refresh, check. Failed attempts wait the retry delay and
// start over with a new send.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use sleepme_api::DevicePatch;
use tracing::{debug, error, info, warn};

use crate::api::DeviceApi;
use crate::command::Command;
use crate::config::VerifyConfig;
use crate::error::CoreError;
use crate::gateway::{CommandGateway, CommandLease};
use crate::poller::PollCoordinator;
use crate::snapshot::DeviceSnapshot;

/// Where a command is in its send/verify cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandPhase {
    Pending,
    Sent,
    Verifying,
    /// Terminal: the device reports the requested value.
    Verified,
    Unverified,
    SendFailed,
    /// Terminal: every attempt failed to send or verify.
    Exhausted,
    /// Terminal: a newer command replaced this one.
    Superseded,
}

impl CommandPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Exhausted | Self::Superseded)
    }
}

/// Result of one verified command.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub command: String,
    pub phase: CommandPhase,
    pub attempts: u32,
    /// Snapshot that confirmed the command, when verified.
    #[serde(skip)]
    pub snapshot: Option<Arc<DeviceSnapshot>>,
    pub last_error: Option<String>,
}

impl ExecutionReport {
    pub fn is_verified(&self) -> bool {
        self.phase == CommandPhase::Verified
    }

    /// Turn a failed report into an error. Verified reports pass through.
    pub fn into_result(self) -> Result<Self, CoreError> {
        match self.phase {
            CommandPhase::Verified => Ok(self),
            CommandPhase::Superseded => Err(CoreError::Superseded),
            _ => Err(CoreError::VerificationFailed {
                command: self.command,
                attempts: self.attempts,
            }),
        }
    }
}

pub struct VerifyingCommandExecutor<A: DeviceApi> {
    gateway: Arc<CommandGateway<A>>,
    poller: Arc<PollCoordinator<A>>,
    config: VerifyConfig,
}

impl<A: DeviceApi> VerifyingCommandExecutor<A> {
    pub fn new(
        gateway: Arc<CommandGateway<A>>,
        poller: Arc<PollCoordinator<A>>,
        config: VerifyConfig,
    ) -> Self {
        Self {
            gateway,
            poller,
            config,
        }
    }

    pub fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Send `command` and confirm it against the device.
    pub async fn execute(&self, command: &Command) -> Result<ExecutionReport, CoreError> {
        self.execute_with(
            &command.description(),
            command.field(),
            command.expected(),
            &command.to_patch(),
            |snap| command.is_satisfied_by(snap),
        )
        .await
    }

    /// Send `patch` and confirm it with `verify`.
    ///
    /// Only an authentication failure is returned as `Err`; every other
    /// outcome is described by the report.
    pub async fn execute_with<V>(
        &self,
        description: &str,
        field: &'static str,
        expected: Value,
        patch: &DevicePatch,
        verify: V,
    ) -> Result<ExecutionReport, CoreError>
    where
        V: Fn(&DeviceSnapshot) -> bool + Sync,
    {
        let mut run = Run::new(description);

        let lease = match self.gateway.begin(field, expected).await {
            Ok(lease) => lease,
            Err(CoreError::Superseded) => return Ok(run.finish(CommandPhase::Superseded)),
            Err(e) => return Err(e),
        };

        let max_attempts = self.config.max_attempts.max(1);
        while run.attempts < max_attempts {
            run.attempts += 1;
            run.enter(CommandPhase::Pending);

            match self.attempt(&lease, patch, &verify, &mut run).await {
                Step::Verified(snap) => {
                    info!(command = description, attempts = run.attempts, "command verified");
                    run.snapshot = Some(snap);
                    return Ok(run.finish(CommandPhase::Verified));
                }
                Step::Retry => {}
                Step::Superseded => return Ok(run.finish(CommandPhase::Superseded)),
                Step::Fatal(e) => return Err(e),
            }

            if run.attempts < max_attempts {
                warn!(
                    command = description,
                    attempt = run.attempts,
                    phase = %run.phase,
                    backoff_secs = self.config.retry_delay.as_secs(),
                    "command not confirmed, retrying"
                );
                if lease.sleep(self.config.retry_delay).await.is_err() {
                    return Ok(run.finish(CommandPhase::Superseded));
                }
            }
        }

        error!(
            command = description,
            attempts = run.attempts,
            last_error = run.last_error.as_deref().unwrap_or("device did not report the new value"),
            "command could not be confirmed"
        );
        Ok(run.finish(CommandPhase::Exhausted))
    }

    async fn attempt<V>(
        &self,
        lease: &CommandLease<'_, A>,
        patch: &DevicePatch,
        verify: &V,
        run: &mut Run,
    ) -> Step
    where
        V: Fn(&DeviceSnapshot) -> bool + Sync,
    {
        match lease.send(patch).await {
            Ok(_) => run.enter(CommandPhase::Sent),
            Err(CoreError::Superseded) => return Step::Superseded,
            Err(e) if e.is_fatal() => return Step::Fatal(e),
            Err(e) => {
                run.fail(CommandPhase::SendFailed, &e);
                return Step::Retry;
            }
        }

        if lease.sleep(self.config.settle_delay).await.is_err() {
            return Step::Superseded;
        }

        run.enter(CommandPhase::Verifying);
        let refreshed = self.poller.force_refresh().await;
        if lease.is_superseded() {
            return Step::Superseded;
        }
        match refreshed {
            Ok(snap) if verify(&snap) => Step::Verified(snap),
            Ok(_) => {
                run.enter(CommandPhase::Unverified);
                Step::Retry
            }
            Err(e) if e.is_fatal() => Step::Fatal(e),
            Err(e) => {
                run.fail(CommandPhase::Unverified, &e);
                Step::Retry
            }
        }
    }
}

enum Step {
    Verified(Arc<DeviceSnapshot>),
    Retry,
    Superseded,
    Fatal(CoreError),
}

/// Bookkeeping for one `execute_with` call.
struct Run {
    command: String,
    phase: CommandPhase,
    attempts: u32,
    snapshot: Option<Arc<DeviceSnapshot>>,
    last_error: Option<String>,
}

impl Run {
    fn new(command: &str) -> Self {
        Self {
            command: command.to_owned(),
            phase: CommandPhase::Pending,
            attempts: 0,
            snapshot: None,
            last_error: None,
        }
    }

    fn enter(&mut self, phase: CommandPhase) {
        debug!(command = %self.command, attempt = self.attempts, %phase, "command phase");
        self.phase = phase;
    }

    fn fail(&mut self, phase: CommandPhase, err: &CoreError) {
        self.last_error = Some(err.to_string());
        self.enter(phase);
    }

    fn finish(mut self, phase: CommandPhase) -> ExecutionReport {
        self.enter(phase);
        ExecutionReport {
            command: self.command,
            phase: self.phase,
            attempts: self.attempts,
            snapshot: self.snapshot,
            last_error: self.last_error,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sleepme_api::{Error, RateLimiter, RetryPolicy, ThermalControlStatus};
    use tokio::time::Instant;

    use super::*;
    use crate::api::fake::{FakeDevice, is_patch, standby};
    use crate::config::ReadPolicy;

    struct Harness {
        fake: FakeDevice,
        poller: Arc<PollCoordinator<FakeDevice>>,
        executor: Arc<VerifyingCommandExecutor<FakeDevice>>,
    }

    fn harness() -> Harness {
        let fake = FakeDevice::new();
        let gateway = Arc::new(CommandGateway::new(
            Arc::new(fake.clone()),
            "dev-1",
            Arc::new(RateLimiter::new(9, Duration::from_secs(60))),
            RetryPolicy::default(),
            Duration::from_secs(5),
        ));
        let poller = Arc::new(PollCoordinator::new(Arc::clone(&gateway), ReadPolicy::Drop));
        let executor = Arc::new(VerifyingCommandExecutor::new(
            gateway,
            Arc::clone(&poller),
            VerifyConfig::default(),
        ));
        Harness {
            fake,
            poller,
            executor,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn verifies_normalized_temperature_after_settle() {
        let h = harness();
        let start = Instant::now();

        let report = h
            .executor
            .execute(&Command::set_temperature(21.3).unwrap())
            .await
            .unwrap();

        assert!(report.is_verified());
        assert_eq!(report.attempts, 1);
        assert_eq!(start.elapsed().as_secs(), 10);
        assert_eq!(h.fake.patches(), vec![DevicePatch::temperature(21.5)]);
        assert_eq!(h.poller.snapshot().set_temperature_c(), Some(21.5));
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_power_on_exhausts_without_optimistic_state() {
        let h = harness();
        h.fake.set_control("thermal_control_status", standby());
        h.fake.ignore_writes();
        let start = Instant::now();

        let report = h.executor.execute(&Command::set_power(true)).await.unwrap();

        assert_eq!(report.phase, CommandPhase::Exhausted);
        assert_eq!(report.attempts, 3);
        assert!(!report.is_verified());
        assert!(report.snapshot.is_none());
        // Three settle delays and two retry delays.
        assert_eq!(start.elapsed().as_secs(), 3 * 10 + 2 * 127);
        assert_eq!(h.fake.count(is_patch), 3);
        assert_eq!(
            h.poller.snapshot().thermal_control_status(),
            Some(ThermalControlStatus::Standby)
        );
        assert!(matches!(
            report.into_result(),
            Err(CoreError::VerificationFailed { attempts: 3, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn device_lag_inside_settle_window_still_verifies() {
        let h = harness();
        h.fake.ignore_writes();

        let task = tokio::spawn({
            let executor = Arc::clone(&h.executor);
            async move { executor.execute(&Command::SetScheduleEnabled(true)).await }
        });
        tokio::time::sleep(Duration::from_secs(6)).await;
        h.fake.set_control("has_schedule_enabled", json!(true));

        let report = task.await.unwrap().unwrap();
        assert!(report.is_verified());
        assert_eq!(report.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_waits_retry_delay_then_resends() {
        let h = harness();
        h.fake.fail_next_patch(Error::Http {
            status: 400,
            message: "bad request".into(),
        });
        let start = Instant::now();

        let report = h.executor.execute(&Command::SetBrightness(30)).await.unwrap();

        assert!(report.is_verified());
        assert_eq!(report.attempts, 2);
        assert!(report.last_error.is_some());
        assert_eq!(start.elapsed().as_secs(), 127 + 10);
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_error_propagates_immediately() {
        let h = harness();
        h.fake.fail_next_patch(Error::InvalidToken);

        let err = h
            .executor
            .execute(&Command::SetBrightness(30))
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::Authentication { .. }));
        assert_eq!(h.fake.count(is_patch), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_command_supersedes_during_settle() {
        let h = harness();

        let first = tokio::spawn({
            let executor = Arc::clone(&h.executor);
            async move { executor.execute(&Command::set_temperature(18.0).unwrap()).await }
        });
        tokio::time::sleep(Duration::from_secs(3)).await;

        let second = h
            .executor
            .execute(&Command::set_temperature(25.0).unwrap())
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first.phase, CommandPhase::Superseded);
        assert_eq!(first.attempts, 1);
        assert!(second.is_verified());
        assert_eq!(
            h.fake.patches(),
            vec![DevicePatch::temperature(18.0), DevicePatch::temperature(25.0)]
        );
        assert_eq!(h.poller.snapshot().set_temperature_c(), Some(25.0));
    }
}
