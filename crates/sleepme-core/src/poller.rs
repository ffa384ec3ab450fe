// ── Poll coordinator ──
//
// Sole owner of the published snapshot. Periodic ticks and on-demand
// refreshes both replace it atomically; failures keep the last good one
// so readers always have something to show.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sleepme_api::DeviceStatus;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::DeviceApi;
use crate::config::ReadPolicy;
use crate::error::CoreError;
use crate::gateway::CommandGateway;
use crate::snapshot::DeviceSnapshot;
use crate::stream::SnapshotStream;

/// Outcome of one periodic poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TickOutcome {
    /// A fresh snapshot was published.
    Refreshed,
    /// The read was dropped to protect the request quota.
    Throttled,
    /// The fetch failed; the previous snapshot was kept.
    Degraded,
    /// The token was rejected. Polling stops.
    AuthenticationFailed,
}

/// Health of the read path, for presentation layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollHealth {
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub auth_failed: bool,
}

impl PollHealth {
    pub fn is_degraded(&self) -> bool {
        self.consecutive_failures > 0
    }
}

pub struct PollCoordinator<A: DeviceApi> {
    gateway: Arc<CommandGateway<A>>,
    read_policy: ReadPolicy,
    snapshot: watch::Sender<Arc<DeviceSnapshot>>,
    health: watch::Sender<PollHealth>,
}

impl<A: DeviceApi> PollCoordinator<A> {
    pub fn new(gateway: Arc<CommandGateway<A>>, read_policy: ReadPolicy) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(DeviceSnapshot::empty()));
        let (health, _) = watch::channel(PollHealth::default());
        Self {
            gateway,
            read_policy,
            snapshot,
            health,
        }
    }

    /// Current published snapshot. Never blocks.
    pub fn snapshot(&self) -> Arc<DeviceSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotStream {
        SnapshotStream::new(self.snapshot.subscribe())
    }

    pub fn health(&self) -> PollHealth {
        self.health.borrow().clone()
    }

    pub fn health_changes(&self) -> watch::Receiver<PollHealth> {
        self.health.subscribe()
    }

    /// One scheduled poll. Errors are absorbed into [`PollHealth`].
    pub async fn tick(&self) -> TickOutcome {
        match self.gateway.fetch_status(self.read_policy).await {
            Ok(Some(status)) => {
                self.publish(status);
                TickOutcome::Refreshed
            }
            Ok(None) => TickOutcome::Throttled,
            Err(e) => {
                let auth = e.is_fatal();
                self.record_failure(&e);
                // Re-announce the last good snapshot so dependents keep rendering.
                self.snapshot.send_modify(|_| {});
                if auth {
                    error!(device_id = %self.gateway.device_id(), error = %e, "poll rejected, token invalid");
                    TickOutcome::AuthenticationFailed
                } else {
                    warn!(device_id = %self.gateway.device_id(), error = %e, "poll failed, keeping last snapshot");
                    TickOutcome::Degraded
                }
            }
        }
    }

    /// Fetch and publish immediately, waiting for a quota slot if needed.
    pub async fn force_refresh(&self) -> Result<Arc<DeviceSnapshot>, CoreError> {
        match self.gateway.fetch_status(ReadPolicy::Queue).await {
            Ok(Some(status)) => Ok(self.publish(status)),
            Ok(None) => Err(CoreError::Throttled),
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Periodic poll loop. Stops when `cancel` fires or the token is rejected.
    pub async fn run(self: Arc<Self>, period: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval.tick().await; // consume the immediate first tick

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    let outcome = tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        outcome = self.tick() => outcome,
                    };
                    debug!(device_id = %self.gateway.device_id(), %outcome, "poll tick");
                    if outcome == TickOutcome::AuthenticationFailed {
                        break;
                    }
                }
            }
        }
    }

    fn publish(&self, status: DeviceStatus) -> Arc<DeviceSnapshot> {
        let mut published = None;
        self.snapshot.send_modify(|current| {
            // fetched_at never moves backwards, even if the wall clock does.
            let fetched_at = Utc::now().max(current.fetched_at);
            let snap = Arc::new(DeviceSnapshot::from_status(status, fetched_at));
            *current = Arc::clone(&snap);
            published = Some(snap);
        });
        let snap = published.unwrap_or_else(|| self.snapshot());

        self.health.send_modify(|h| {
            h.consecutive_failures = 0;
            h.last_error = None;
            h.last_success = Some(snap.fetched_at);
            h.auth_failed = false;
        });
        snap
    }

    fn record_failure(&self, err: &CoreError) {
        let auth = err.is_fatal();
        self.health.send_modify(|h| {
            h.consecutive_failures = h.consecutive_failures.saturating_add(1);
            h.last_error = Some(err.to_string());
            h.auth_failed |= auth;
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use sleepme_api::{Error, RateLimiter, RetryPolicy};
    use tokio::time::Instant;

    use super::*;
    use crate::api::fake::{FakeDevice, is_get};

    fn poller(fake: &FakeDevice, max_requests: usize, policy: ReadPolicy) -> Arc<PollCoordinator<FakeDevice>> {
        let gateway = Arc::new(CommandGateway::new(
            Arc::new(fake.clone()),
            "dev-1",
            Arc::new(RateLimiter::new(max_requests, Duration::from_secs(60))),
            RetryPolicy::default(),
            Duration::from_secs(5),
        ));
        Arc::new(PollCoordinator::new(gateway, policy))
    }

    #[tokio::test(start_paused = true)]
    async fn tick_publishes_snapshot() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 9, ReadPolicy::Drop);
        assert!(poller.snapshot().is_empty());

        assert_eq!(poller.tick().await, TickOutcome::Refreshed);

        let snap = poller.snapshot();
        assert!(!snap.is_empty());
        assert_eq!(snap.set_temperature_c(), Some(20.0));
        assert!(poller.health().last_success.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tick_keeps_last_good_snapshot() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 9, ReadPolicy::Drop);
        poller.tick().await;
        let before = poller.snapshot();

        fake.set_control("set_temperature_c", json!(30.0));
        fake.fail_next_get(Error::Http {
            status: 404,
            message: "gone".into(),
        });
        let mut sub = poller.subscribe();

        assert_eq!(poller.tick().await, TickOutcome::Degraded);

        // Same snapshot, re-announced to subscribers.
        let seen = sub.changed().await.unwrap();
        assert!(Arc::ptr_eq(&seen, &before));
        assert_eq!(poller.snapshot().set_temperature_c(), Some(20.0));
        let health = poller.health();
        assert_eq!(health.consecutive_failures, 1);
        assert!(health.last_error.is_some());

        assert_eq!(poller.tick().await, TickOutcome::Refreshed);
        assert_eq!(poller.snapshot().set_temperature_c(), Some(30.0));
        assert_eq!(poller.health().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_response_keeps_last_good_snapshot() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 9, ReadPolicy::Drop);
        poller.tick().await;
        let before = poller.snapshot();
        assert!(before.is_connected());

        fake.empty_next_get();
        let mut sub = poller.subscribe();

        assert_eq!(poller.tick().await, TickOutcome::Degraded);

        let seen = sub.changed().await.unwrap();
        assert!(Arc::ptr_eq(&seen, &before));
        assert_eq!(poller.snapshot().set_temperature_c(), Some(20.0));
        assert!(poller.snapshot().is_connected());
        assert_eq!(poller.health().consecutive_failures, 1);

        fake.empty_next_get();
        let err = poller.force_refresh().await.unwrap_err();
        assert!(matches!(err, CoreError::CommunicationFailure { .. }));
        assert!(Arc::ptr_eq(&poller.snapshot(), &before));
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_tick_keeps_last_good_snapshot() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 9, ReadPolicy::Drop);
        poller.tick().await;
        let before = poller.snapshot();

        fake.set_control("set_temperature_c", json!(30.0));
        for _ in 0..3 {
            fake.fail_next_get(Error::Timeout { timeout_secs: 30 });
        }

        let start = Instant::now();
        assert_eq!(poller.tick().await, TickOutcome::Degraded);

        // Retried at 10 and 20 s backoff before giving up.
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert_eq!(fake.count(is_get), 4);
        assert!(Arc::ptr_eq(&poller.snapshot(), &before));
        assert_eq!(poller.snapshot().set_temperature_c(), Some(20.0));
        assert!(poller.health().is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn server_error_without_retry_slot_is_recorded() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 1, ReadPolicy::Drop);
        fake.fail_next_get(Error::Server {
            status: 503,
            message: "unavailable".into(),
        });

        // The retry after the 10 s backoff finds the window full.
        assert_eq!(poller.tick().await, TickOutcome::Degraded);

        assert_eq!(fake.count(is_get), 1);
        let health = poller.health();
        assert_eq!(health.consecutive_failures, 1);
        assert!(health.last_error.unwrap().contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn tick_dropped_under_rate_pressure() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 1, ReadPolicy::Drop);

        assert_eq!(poller.tick().await, TickOutcome::Refreshed);
        assert_eq!(poller.tick().await, TickOutcome::Throttled);
        assert_eq!(fake.count(is_get), 1);
        assert_eq!(poller.health().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn force_refresh_queues_for_a_slot() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 1, ReadPolicy::Drop);
        poller.tick().await;

        let start = Instant::now();
        let snap = poller.force_refresh().await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(59));
        assert!(snap.fetched_at >= poller.health().last_success.unwrap());
        assert_eq!(fake.count(is_get), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_stops_polling() {
        let fake = FakeDevice::new();
        fake.fail_next_get(Error::InvalidToken);
        let poller = poller(&fake, 9, ReadPolicy::Drop);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&poller).run(Duration::from_secs(20), cancel.clone()));
        tokio::time::sleep(Duration::from_secs(100)).await;

        assert!(task.is_finished());
        assert_eq!(fake.count(is_get), 1);
        assert!(poller.health().auth_failed);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_on_interval_until_cancelled() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 9, ReadPolicy::Drop);

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&poller).run(Duration::from_secs(20), cancel.clone()));
        tokio::time::sleep(Duration::from_secs(61)).await;
        cancel.cancel();
        task.await.unwrap();

        // Ticks at 20, 40 and 60 s; the immediate tick is skipped.
        assert_eq!(fake.count(is_get), 3);
        assert!(!poller.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetched_at_is_monotonic() {
        let fake = FakeDevice::new();
        let poller = poller(&fake, 9, ReadPolicy::Drop);

        let mut last = poller.snapshot().fetched_at;
        for _ in 0..3 {
            poller.tick().await;
            let now = poller.snapshot().fetched_at;
            assert!(now >= last);
            last = now;
        }
    }
}
