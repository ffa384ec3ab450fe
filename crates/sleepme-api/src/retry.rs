// ── Retry classification ──
//
// Pure policy: maps an error and attempt number to what the caller should
// do next. The loop that sleeps and re-sends lives in sleepme-core.

use std::time::Duration;

use crate::error::{Error, ErrorKind};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Transient failure: wait this long, then try again.
    Retry(Duration),
    /// No response at all: give up on this operation now, no backoff.
    Fail,
    /// Non-retryable (credential rejected or unclassified HTTP error).
    Fatal,
}

/// One classified failure within a retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based ordinal of the attempt that failed.
    pub attempt: u32,
    pub kind: ErrorKind,
    pub action: RetryAction,
}

impl RetryAttempt {
    /// Backoff before the next attempt, if this failure is retryable.
    pub fn backoff(&self) -> Option<Duration> {
        match self.action {
            RetryAction::Retry(delay) => Some(delay),
            RetryAction::Fail | RetryAction::Fatal => None,
        }
    }
}

/// Backoff schedule per error class.
///
/// - 403: fatal
/// - 429: `rate_limited_base * 2^(attempt-1)` (30, 60, 120, ... by default)
/// - 5xx and timeouts: `server_error_base * 2^(attempt-1)` (10, 20, 40, ...)
/// - connection failure: fail immediately
/// - anything else: fatal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first.
    pub max_attempts: u32,
    pub rate_limited_base: Duration,
    pub server_error_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limited_base: Duration::from_secs(30),
            server_error_base: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Classify the failure of attempt number `attempt` (1-based).
    ///
    /// Does not account for exhaustion; the caller compares `attempt`
    /// against [`max_attempts`](Self::max_attempts).
    pub fn classify(&self, error: &Error, attempt: u32) -> RetryAttempt {
        let kind = error.kind();
        let action = match kind {
            ErrorKind::Authentication | ErrorKind::Other => RetryAction::Fatal,
            ErrorKind::RateLimited => {
                RetryAction::Retry(exponential(self.rate_limited_base, attempt))
            }
            ErrorKind::Server | ErrorKind::Timeout => {
                RetryAction::Retry(exponential(self.server_error_base, attempt))
            }
            ErrorKind::Connectivity => RetryAction::Fail,
        };
        RetryAttempt {
            attempt,
            kind,
            action,
        }
    }

    /// `true` once `attempt` has used up the budget.
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts.max(1)
    }
}

fn exponential(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1_u32 << exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(d: Option<Duration>) -> Option<u64> {
        d.map(|d| d.as_secs())
    }

    #[test]
    fn forbidden_is_always_fatal() {
        let policy = RetryPolicy::default();
        for attempt in 1..=10 {
            let decision = policy.classify(&Error::InvalidToken, attempt);
            assert_eq!(decision.action, RetryAction::Fatal);
            assert_eq!(decision.kind, ErrorKind::Authentication);
        }
    }

    #[test]
    fn rate_limited_backs_off_from_thirty_seconds() {
        let policy = RetryPolicy::default();
        let schedule: Vec<_> = (1..=3)
            .map(|n| secs(policy.classify(&Error::RateLimited, n).backoff()))
            .collect();
        assert_eq!(schedule, vec![Some(30), Some(60), Some(120)]);
    }

    #[test]
    fn server_errors_back_off_from_ten_seconds() {
        let policy = RetryPolicy::default();
        for status in [500, 502, 503, 504] {
            let err = Error::from_status(status, "");
            let schedule: Vec<_> = (1..=3)
                .map(|n| secs(policy.classify(&err, n).backoff()))
                .collect();
            assert_eq!(schedule, vec![Some(10), Some(20), Some(40)], "HTTP {status}");
        }
    }

    #[test]
    fn timeouts_share_the_server_schedule() {
        let policy = RetryPolicy::default();
        let err = Error::Timeout { timeout_secs: 30 };
        assert_eq!(secs(policy.classify(&err, 2).backoff()), Some(20));
    }

    #[test]
    fn unclassified_http_is_fatal() {
        let policy = RetryPolicy::default();
        let decision = policy.classify(&Error::from_status(404, "not found"), 1);
        assert_eq!(decision.action, RetryAction::Fatal);
        assert_eq!(decision.backoff(), None);
    }

    #[test]
    fn exhaustion_tracks_max_attempts() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_exhausted(1));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn huge_attempt_numbers_do_not_overflow() {
        let policy = RetryPolicy::default();
        let decision = policy.classify(&Error::RateLimited, u32::MAX);
        assert!(decision.backoff().is_some());
    }
}
