//! Token refresh health metrics.
//!
//! One [`MetricsRecorder`] lives for the whole process and accumulates every
//! refresh attempt. Updates are applied under a lock in the order attempts
//! settle, so `total_attempts == successful_refreshes + failed_refreshes` holds
//! after every call.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClassifiedError, ErrorCode};

/// Consecutive failures at which a warning is logged.
const CONSECUTIVE_FAILURE_WARNING: u64 = 3;

/// Process-wide refresh counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshMetrics {
    pub total_attempts: u64,
    pub successful_refreshes: u64,
    pub failed_refreshes: u64,
    /// Running mean over successful attempts only.
    pub average_refresh_time_ms: f64,
    /// Failures since the last success.
    pub consecutive_failures: u64,
    pub last_refresh_timestamp: Option<DateTime<Utc>>,
    pub last_success_timestamp: Option<DateTime<Utc>>,
    pub last_failure_timestamp: Option<DateTime<Utc>>,
    /// Failure count per error code.
    pub error_breakdown: BTreeMap<ErrorCode, u64>,
}

impl RefreshMetrics {
    /// Applies one settled attempt.
    ///
    /// A failure without a classified error is counted as `UNKNOWN_ERROR`.
    pub fn record(
        &mut self,
        success: bool,
        duration_ms: u64,
        error: Option<&ClassifiedError>,
        now: DateTime<Utc>,
    ) {
        self.total_attempts += 1;
        self.last_refresh_timestamp = Some(now);

        if success {
            self.successful_refreshes += 1;
            self.consecutive_failures = 0;
            self.last_success_timestamp = Some(now);
            let n = self.successful_refreshes as f64;
            self.average_refresh_time_ms =
                (self.average_refresh_time_ms * (n - 1.0) + duration_ms as f64) / n;
        } else {
            self.failed_refreshes += 1;
            self.consecutive_failures += 1;
            self.last_failure_timestamp = Some(now);
            let code = error.map_or(ErrorCode::UnknownError, ClassifiedError::code);
            *self.error_breakdown.entry(code).or_insert(0) += 1;
        }
    }

    /// Fraction of attempts that succeeded, 0.0 when nothing was recorded.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.successful_refreshes as f64 / self.total_attempts as f64
    }

    pub fn health(&self) -> HealthSummary {
        HealthSummary::from_counts(self.successful_refreshes, self.total_attempts)
    }

    /// The code seen most often; ties resolve to the lowest code.
    pub fn most_common_error(&self) -> Option<ErrorCode> {
        self.error_breakdown
            .iter()
            .max_by(|(code_a, a), (code_b, b)| a.cmp(b).then(code_b.cmp(code_a)))
            .map(|(code, _)| *code)
    }
}

/// Health label derived from the success rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthSummary {
    /// 95% or better.
    Excellent,
    /// 85% or better.
    Good,
    /// 70% or better.
    Fair,
    Poor,
    #[serde(rename = "Not evaluated")]
    NotEvaluated,
}

impl HealthSummary {
    /// Labels `successes` out of `total`. Thresholds are inclusive and
    /// compared in integer arithmetic, so 19/20 is exactly 95%.
    pub fn from_counts(successes: u64, total: u64) -> Self {
        if total == 0 {
            return HealthSummary::NotEvaluated;
        }
        let scaled = u128::from(successes) * 100;
        let total = u128::from(total);
        if scaled >= 95 * total {
            HealthSummary::Excellent
        } else if scaled >= 85 * total {
            HealthSummary::Good
        } else if scaled >= 70 * total {
            HealthSummary::Fair
        } else {
            HealthSummary::Poor
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthSummary::Excellent => "Excellent",
            HealthSummary::Good => "Good",
            HealthSummary::Fair => "Fair",
            HealthSummary::Poor => "Poor",
            HealthSummary::NotEvaluated => "Not evaluated",
        }
    }
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the metrics plus derived health.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    #[serde(flatten)]
    pub metrics: RefreshMetrics,
    pub success_rate: f64,
    pub summary: HealthSummary,
}

impl From<RefreshMetrics> for MetricsReport {
    fn from(metrics: RefreshMetrics) -> Self {
        Self {
            success_rate: metrics.success_rate(),
            summary: metrics.health(),
            metrics,
        }
    }
}

/// Shared, thread-safe recorder. Clones record into the same metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    inner: Arc<RwLock<RefreshMetrics>>,
}

impl MetricsRecorder {
    /// An empty recorder. Clones share the same counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one settled refresh attempt.
    pub fn record_attempt(&self, success: bool, duration_ms: u64, error: Option<&ClassifiedError>) {
        let mut metrics = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        metrics.record(success, duration_ms, error, Utc::now());

        tracing::debug!(
            success,
            duration_ms,
            code = error.map(|e| e.code().as_str()).unwrap_or(""),
            total = metrics.total_attempts,
            consecutive_failures = metrics.consecutive_failures,
            "recorded refresh attempt"
        );
        if !success && metrics.consecutive_failures == CONSECUTIVE_FAILURE_WARNING {
            tracing::warn!(
                consecutive_failures = metrics.consecutive_failures,
                "token refresh keeps failing"
            );
        }
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> RefreshMetrics {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot plus success rate and health label.
    pub fn report(&self) -> MetricsReport {
        MetricsReport::from(self.snapshot())
    }

    /// Clears every counter.
    pub fn reset(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = RefreshMetrics::default();
    }
}

/// Renders a report for terminals and logs.
pub fn format_report(report: &MetricsReport) -> String {
    let metrics = &report.metrics;
    let mut output = String::from("## Token Refresh Health\n\n");

    output.push_str(&format!("- **Health**: {}\n", report.summary));
    output.push_str(&format!(
        "- **Attempts**: {} ({} successful, {} failed)\n",
        metrics.total_attempts, metrics.successful_refreshes, metrics.failed_refreshes
    ));
    output.push_str(&format!(
        "- **Success Rate**: {:.1}%\n",
        report.success_rate * 100.0
    ));
    output.push_str(&format!(
        "- **Average Refresh Time**: {:.1}ms\n",
        metrics.average_refresh_time_ms
    ));
    output.push_str(&format!(
        "- **Consecutive Failures**: {}\n",
        metrics.consecutive_failures
    ));
    if let Some(last) = metrics.last_success_timestamp {
        output.push_str(&format!("- **Last Success**: {}\n", last.to_rfc3339()));
    }
    if let Some(last) = metrics.last_failure_timestamp {
        output.push_str(&format!("- **Last Failure**: {}\n", last.to_rfc3339()));
    }

    if !metrics.error_breakdown.is_empty() {
        output.push_str("\n### Errors\n");
        let mut errors: Vec<_> = metrics.error_breakdown.iter().collect();
        errors.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (code, count) in errors {
            output.push_str(&format!("- **{}**: {} occurrences\n", code, count));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(code: ErrorCode) -> ClassifiedError {
        ClassifiedError::new(code, "failed")
    }

    #[test]
    fn test_empty_report_is_not_evaluated() {
        let report = MetricsRecorder::new().report();
        assert_eq!(report.summary, HealthSummary::NotEvaluated);
        assert_eq!(report.metrics.total_attempts, 0);
        assert_eq!(report.success_rate, 0.0);
    }

    #[test]
    fn test_totals_always_add_up() {
        let recorder = MetricsRecorder::new();
        let timeout = failure(ErrorCode::NetworkTimeout);
        for i in 0..25u64 {
            if i % 3 == 0 {
                recorder.record_attempt(false, 10, Some(&timeout));
            } else {
                recorder.record_attempt(true, 10, None);
            }
            let m = recorder.snapshot();
            assert_eq!(m.total_attempts, m.successful_refreshes + m.failed_refreshes);
        }
    }

    #[test]
    fn test_failures_then_success_resets_consecutive_failures() {
        let recorder = MetricsRecorder::new();
        let timeout = failure(ErrorCode::NetworkTimeout);
        for _ in 0..3 {
            recorder.record_attempt(false, 5000, Some(&timeout));
        }
        assert_eq!(recorder.snapshot().consecutive_failures, 3);

        recorder.record_attempt(true, 120, None);
        let m = recorder.snapshot();
        assert_eq!(m.consecutive_failures, 0);
        assert_eq!(m.error_breakdown.get(&ErrorCode::NetworkTimeout), Some(&3));
        assert_eq!(m.successful_refreshes, 1);
        assert_eq!(m.failed_refreshes, 3);
        assert!(m.last_failure_timestamp.is_some());
        assert!(m.last_success_timestamp.is_some());
    }

    #[test]
    fn test_average_counts_successes_only() {
        let recorder = MetricsRecorder::new();
        recorder.record_attempt(true, 100, None);
        recorder.record_attempt(false, 9000, Some(&failure(ErrorCode::ServerUnavailable)));
        recorder.record_attempt(true, 300, None);
        recorder.record_attempt(true, 200, None);
        assert_eq!(recorder.snapshot().average_refresh_time_ms, 200.0);
    }

    #[test]
    fn test_failure_without_error_counts_as_unknown() {
        let recorder = MetricsRecorder::new();
        recorder.record_attempt(false, 1, None);
        assert_eq!(
            recorder.snapshot().error_breakdown.get(&ErrorCode::UnknownError),
            Some(&1)
        );
    }

    #[test]
    fn test_health_thresholds() {
        assert_eq!(HealthSummary::from_counts(19, 20), HealthSummary::Excellent);
        assert_eq!(HealthSummary::from_counts(18, 20), HealthSummary::Good);
        assert_eq!(HealthSummary::from_counts(17, 20), HealthSummary::Good);
        assert_eq!(HealthSummary::from_counts(14, 20), HealthSummary::Fair);
        assert_eq!(HealthSummary::from_counts(13, 20), HealthSummary::Poor);
        assert_eq!(HealthSummary::from_counts(0, 0), HealthSummary::NotEvaluated);
        assert_eq!(HealthSummary::from_counts(1, 1), HealthSummary::Excellent);
    }

    #[test]
    fn test_report_boundary_through_recorder() {
        let recorder = MetricsRecorder::new();
        let err = failure(ErrorCode::NetworkTimeout);
        for _ in 0..19 {
            recorder.record_attempt(true, 10, None);
        }
        recorder.record_attempt(false, 10, Some(&err));
        assert_eq!(recorder.report().summary, HealthSummary::Excellent);

        recorder.record_attempt(false, 10, Some(&err));
        // 19 / 21 is about 90.5%
        assert_eq!(recorder.report().summary, HealthSummary::Good);
    }

    #[test]
    fn test_most_common_error() {
        let mut metrics = RefreshMetrics::default();
        metrics.error_breakdown.insert(ErrorCode::NetworkTimeout, 5);
        metrics.error_breakdown.insert(ErrorCode::ServerUnavailable, 2);
        assert_eq!(metrics.most_common_error(), Some(ErrorCode::NetworkTimeout));
        assert_eq!(RefreshMetrics::default().most_common_error(), None);
    }

    #[test]
    fn test_clones_share_state_and_reset() {
        let recorder = MetricsRecorder::new();
        let clone = recorder.clone();
        clone.record_attempt(true, 10, None);
        assert_eq!(recorder.snapshot().total_attempts, 1);

        recorder.reset();
        assert_eq!(clone.snapshot(), RefreshMetrics::default());
    }

    #[test]
    fn test_report_serializes_summary_label() {
        let report = MetricsRecorder::new().report();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["summary"], "Not evaluated");
        assert_eq!(value["totalAttempts"], 0);
        assert!(value.get("errorBreakdown").is_some());
    }

    #[test]
    fn test_format_report() {
        let recorder = MetricsRecorder::new();
        recorder.record_attempt(true, 100, None);
        recorder.record_attempt(false, 10, Some(&failure(ErrorCode::NetworkTimeout)));

        let output = format_report(&recorder.report());
        assert!(output.contains("Token Refresh Health"));
        assert!(output.contains("50.0%"));
        assert!(output.contains("Poor"));
        assert!(output.contains("NETWORK_TIMEOUT"));
        assert!(output.contains("100.0ms"));
    }
}
