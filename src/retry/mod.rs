//! Retry policy with exponential backoff.
//!
//! The free functions are the pure building blocks; [`RetryPolicy`] bundles
//! them with configured limits and produces a [`RetryDecision`] per failure.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::ClassifiedError;

/// Default floor between two consecutive attempts.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(1000);

/// Per-operation retry bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Retries already scheduled for this operation.
    pub attempt_count: u32,
    /// When the most recent attempt started.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes that an attempt is starting now.
    pub fn mark_attempt(&mut self, now: DateTime<Utc>) {
        self.last_attempt_at = Some(now);
    }

    /// Notes a failed attempt.
    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Notes that a retry has been scheduled.
    pub fn record_retry(&mut self) {
        self.attempt_count = self.attempt_count.saturating_add(1);
    }

    /// Back to a fresh state, e.g. after a success.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// True iff `error` is retryable and fewer than `max_retries` retries were made.
pub fn should_retry(state: &RetryState, error: &ClassifiedError, max_retries: u32) -> bool {
    error.is_retryable() && state.attempt_count < max_retries
}

/// Exponential backoff in milliseconds: `base_delay_ms * 2^attempt_index`.
///
/// Saturates at `u64::MAX` instead of overflowing, so the result is
/// non-decreasing in `attempt_index`.
pub fn next_delay(attempt_index: u32, base_delay_ms: u64) -> u64 {
    match 1u64.checked_shl(attempt_index) {
        Some(multiplier) => base_delay_ms.saturating_mul(multiplier),
        None if base_delay_ms == 0 => 0,
        None => u64::MAX,
    }
}

/// True if at least `floor` has passed since `last_attempt_at` (or there was none).
pub fn minimum_spacing(
    last_attempt_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    floor: Duration,
) -> bool {
    remaining_spacing(last_attempt_at, now, floor).is_zero()
}

/// How much longer to wait before the floor is satisfied.
///
/// A `last_attempt_at` in the future (clock skew) counts as "just now".
pub fn remaining_spacing(
    last_attempt_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    floor: Duration,
) -> Duration {
    let Some(last) = last_attempt_at else {
        return Duration::ZERO;
    };
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    floor.saturating_sub(elapsed)
}

/// What to do after a failed attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`.
    Retry { delay: Duration },
    /// Stop; the error is terminal.
    GiveUp(GiveUpReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GiveUpReason {
    /// The error's code is not auto-retryable.
    NotRetryable,
    /// `max_retries` retries were already made.
    Exhausted,
}

impl std::fmt::Display for GiveUpReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GiveUpReason::NotRetryable => write!(f, "error is not retryable"),
            GiveUpReason::Exhausted => write!(f, "retries exhausted"),
        }
    }
}

/// Configured retry limits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single backoff delay.
    pub max_delay: Duration,
    /// Minimum time between two attempts, whatever the backoff says.
    pub min_spacing: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(30),
            min_spacing: DEFAULT_MIN_SPACING,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_delay` is raised to `base_delay` if lower.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: max_delay.max(base_delay),
            min_spacing: DEFAULT_MIN_SPACING,
        }
    }

    /// Retries allowed after the first attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Delay before the first retry. Later retries double it.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = self.max_delay.max(base_delay);
        self
    }

    /// Cap on any single backoff delay, never below the base delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay.max(self.base_delay);
        self
    }

    /// Floor between the starts of two consecutive attempts.
    pub fn with_min_spacing(mut self, min_spacing: Duration) -> Self {
        self.min_spacing = min_spacing;
        self
    }

    /// See [`should_retry`].
    pub fn should_retry(&self, state: &RetryState, error: &ClassifiedError) -> bool {
        should_retry(state, error, self.max_retries)
    }

    /// Backoff for `attempt_index` (0-based), capped at `max_delay`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let cap_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(next_delay(attempt_index, base_ms).min(cap_ms))
    }

    /// Decides whether to retry after `error`, and how long to wait.
    ///
    /// The wait is the larger of the backoff for the current retry index and
    /// whatever remains of the minimum spacing since the last attempt.
    pub fn decide(
        &self,
        state: &RetryState,
        error: &ClassifiedError,
        now: DateTime<Utc>,
    ) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp(GiveUpReason::NotRetryable);
        }
        if !self.should_retry(state, error) {
            return RetryDecision::GiveUp(GiveUpReason::Exhausted);
        }
        let backoff = self.delay_for(state.attempt_count);
        let spacing = remaining_spacing(state.last_attempt_at, now, self.min_spacing);
        RetryDecision::Retry {
            delay: backoff.max(spacing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn timeout() -> ClassifiedError {
        ClassifiedError::new(ErrorCode::NetworkTimeout, "timed out")
    }

    #[test]
    fn test_next_delay_doubles() {
        assert_eq!(next_delay(0, 1000), 1000);
        assert_eq!(next_delay(1, 1000), 2000);
        assert_eq!(next_delay(2, 1000), 4000);
        assert_eq!(next_delay(3, 250), 2000);
    }

    #[test]
    fn test_next_delay_is_non_decreasing_and_saturates() {
        let mut previous = 0;
        for attempt in 0..80 {
            let delay = next_delay(attempt, 1000);
            assert!(delay >= previous, "attempt {attempt}");
            previous = delay;
        }
        assert_eq!(next_delay(200, 1000), u64::MAX);
        assert_eq!(next_delay(200, 0), 0);
    }

    #[test]
    fn test_should_retry_respects_max_retries() {
        let mut state = RetryState::new();
        let error = timeout();
        for _ in 0..3 {
            assert!(should_retry(&state, &error, 3));
            state.record_retry();
        }
        assert_eq!(state.attempt_count, 3);
        assert!(!should_retry(&state, &error, 3));
    }

    #[test]
    fn test_should_retry_never_for_validation() {
        let state = RetryState::new();
        let error = ClassifiedError::new(ErrorCode::ValidationMissingFields, "email");
        assert!(!should_retry(&state, &error, 3));
    }

    #[test]
    fn test_should_retry_zero_max_retries() {
        assert!(!should_retry(&RetryState::new(), &timeout(), 0));
    }

    #[test]
    fn test_minimum_spacing() {
        let now = Utc::now();
        let floor = Duration::from_millis(1000);
        assert!(minimum_spacing(None, now, floor));
        assert!(!minimum_spacing(
            Some(now - chrono::Duration::milliseconds(400)),
            now,
            floor
        ));
        assert!(minimum_spacing(
            Some(now - chrono::Duration::milliseconds(1000)),
            now,
            floor
        ));
    }

    #[test]
    fn test_remaining_spacing_with_future_timestamp() {
        let now = Utc::now();
        let floor = Duration::from_millis(1000);
        let remaining = remaining_spacing(Some(now + chrono::Duration::seconds(5)), now, floor);
        assert_eq!(remaining, floor);
    }

    #[test]
    fn test_delay_for_is_capped() {
        let policy = RetryPolicy::default().with_max_delay(Duration::from_secs(5));
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for(30), Duration::from_secs(5));
    }

    #[test]
    fn test_max_delay_never_below_base() {
        let policy = RetryPolicy::new(3, Duration::from_secs(2), Duration::from_secs(1));
        assert_eq!(policy.max_delay, Duration::from_secs(2));

        let raised = RetryPolicy::default().with_base_delay(Duration::from_secs(60));
        assert_eq!(raised.max_delay, Duration::from_secs(60));
        let capped = raised.with_max_delay(Duration::from_secs(1));
        assert_eq!(capped.max_delay, Duration::from_secs(60));
    }

    #[test]
    fn test_decide_uses_spacing_floor_when_larger() {
        let policy = RetryPolicy::default()
            .with_base_delay(Duration::from_millis(10))
            .with_min_spacing(Duration::from_millis(1000));
        let now = Utc::now();
        let mut state = RetryState::new();
        state.mark_attempt(now);

        let decision = policy.decide(&state, &timeout(), now);
        assert_eq!(
            decision,
            RetryDecision::Retry {
                delay: Duration::from_millis(1000)
            }
        );
    }

    #[test]
    fn test_decide_gives_up() {
        let policy = RetryPolicy::default().with_max_retries(1);
        let now = Utc::now();
        let mut state = RetryState::new();

        let locked = ClassifiedError::new(ErrorCode::AuthAccountLocked, "locked");
        assert_eq!(
            policy.decide(&state, &locked, now),
            RetryDecision::GiveUp(GiveUpReason::NotRetryable)
        );

        state.record_retry();
        assert_eq!(
            policy.decide(&state, &timeout(), now),
            RetryDecision::GiveUp(GiveUpReason::Exhausted)
        );
    }

    #[test]
    fn test_retry_state_reset() {
        let mut state = RetryState::new();
        state.mark_attempt(Utc::now());
        state.record_failure();
        state.record_retry();
        state.reset();
        assert_eq!(state, RetryState::default());
    }
}
