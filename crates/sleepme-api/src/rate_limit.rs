// ── Sliding-window request limiter ──
//
// The API allows a small fixed number of calls per minute per token.
// Every outgoing request (reads and writes alike) is admitted here first.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Admits at most `max_requests` requests within any trailing `window`.
///
/// One instance per device, shared by reference between the poll task and
/// command callers. The prune/decide/append sequence runs under a single
/// lock, and a caller that has to wait keeps holding it, so waiters are
/// admitted in arrival order.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    history: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter. A quota of zero is treated as one.
    pub fn new(max_requests: usize, window: Duration) -> Self {
        let max_requests = max_requests.max(1);
        Self {
            max_requests,
            window,
            history: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a request may be sent, then record it.
    pub async fn admit(&self) {
        let mut history = self.history.lock().await;
        loop {
            let now = Instant::now();
            self.prune(&mut history, now);

            if history.len() < self.max_requests {
                history.push_back(now);
                trace!(in_window = history.len(), "request admitted");
                return;
            }

            // Full window: sleep until the oldest entry ages out, then re-check.
            let Some(&oldest) = history.front() else {
                continue;
            };
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!(
                wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                quota = self.max_requests,
                "rate limit reached, delaying request"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Record a request only if it can go out right now.
    ///
    /// Returns `false` when the window is full or another caller is already
    /// waiting for a slot. Used by reads that would rather skip a cycle than
    /// queue behind commands.
    pub fn try_admit(&self) -> bool {
        let Ok(mut history) = self.history.try_lock() else {
            trace!("limiter busy, not admitting");
            return false;
        };
        let now = Instant::now();
        self.prune(&mut history, now);
        if history.len() < self.max_requests {
            history.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of requests recorded in the current window.
    pub async fn in_window(&self) -> usize {
        let mut history = self.history.lock().await;
        self.prune(&mut history, Instant::now());
        history.len()
    }

    fn prune(&self, history: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = history.front() {
            if now.duration_since(oldest) >= self.window {
                history.pop_front();
            } else {
                break;
            }
        }
    }
}
