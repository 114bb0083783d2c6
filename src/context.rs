//! The resilience context: one instance per process, passed to every call site.

use std::future::Future;
use std::sync::Arc;

use crate::config::ResilienceConfig;
use crate::error::{ClassifiedError, ErrorClassifier, RawFailure};
use crate::feedback::{ExecuteOptions, FeedbackOrchestrator};
use crate::guard::ConcurrencyGuard;
use crate::metrics::{MetricsRecorder, MetricsReport};
use crate::token::{RefreshTransport, TokenRefresher, TokenStore};

/// Owns the classifier, guard, metrics and retry policy shared by all
/// authentication operations.
///
/// Cloning is cheap; clones share the same guard and metrics.
#[derive(Debug, Clone)]
pub struct AuthResilience {
    config: ResilienceConfig,
    orchestrator: FeedbackOrchestrator,
}

impl Default for AuthResilience {
    fn default() -> Self {
        Self::from_config(ResilienceConfig::default())
    }
}

impl AuthResilience {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a context whose retry policy comes from `config`.
    pub fn from_config(config: ResilienceConfig) -> Self {
        let orchestrator = FeedbackOrchestrator::with_parts(
            Arc::new(ErrorClassifier::new()),
            ConcurrencyGuard::new(),
            MetricsRecorder::new(),
            config.retry_policy(),
        );
        Self {
            config,
            orchestrator,
        }
    }

    /// Settings this context was built from.
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &FeedbackOrchestrator {
        &self.orchestrator
    }

    /// Shared recorder fed by every executed attempt.
    pub fn metrics(&self) -> &MetricsRecorder {
        self.orchestrator.metrics()
    }

    /// Normalizes any raw failure into a [`ClassifiedError`]. Never fails.
    pub fn classify_error(
        &self,
        raw: impl Into<RawFailure>,
        context: Option<&str>,
    ) -> ClassifiedError {
        self.orchestrator.classifier().classify(raw, context)
    }

    /// Runs `task` with single-flight, retry and lifecycle feedback.
    ///
    /// # Errors
    /// The terminal [`ClassifiedError`] after retries are exhausted or on a
    /// non-retryable failure.
    pub async fn execute_with_feedback<T, E, F, Fut>(
        &self,
        operation: &str,
        task: F,
        options: ExecuteOptions,
    ) -> Result<T, ClassifiedError>
    where
        T: Clone + Send + Sync + 'static,
        E: Into<RawFailure> + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        self.orchestrator.execute(operation, task, options).await
    }

    /// Records a refresh attempt made outside `execute_with_feedback`.
    pub fn record_refresh_attempt(
        &self,
        success: bool,
        duration_ms: u64,
        error: Option<&ClassifiedError>,
    ) {
        self.metrics().record_attempt(success, duration_ms, error);
    }

    /// Snapshot of the refresh counters with a health summary.
    pub fn get_metrics_report(&self) -> MetricsReport {
        self.metrics().report()
    }

    /// A token refresher wired to this context's orchestrator and settings.
    pub fn token_refresher(
        &self,
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn RefreshTransport>,
    ) -> TokenRefresher {
        TokenRefresher::new(self.orchestrator.clone(), store, transport)
            .with_operation(self.config.refresh_operation.clone())
            .with_skew(self.config.refresh_skew())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::metrics::HealthSummary;

    #[test]
    fn test_context_uses_configured_policy() {
        let config = ResilienceConfig {
            max_retries: 7,
            ..ResilienceConfig::default()
        };
        let context = AuthResilience::from_config(config);
        assert_eq!(context.orchestrator().policy().max_retries, 7);
    }

    #[test]
    fn test_classify_error_with_context() {
        let context = AuthResilience::new();
        let error = context.classify_error("Failed to fetch", Some("login"));
        assert_eq!(error.code(), ErrorCode::NetworkConnectionFailed);
        assert_eq!(error.context(), Some("login"));
    }

    #[test]
    fn test_manual_attempts_feed_report() {
        let context = AuthResilience::new();
        assert_eq!(context.get_metrics_report().summary, HealthSummary::NotEvaluated);

        let error = context.classify_error(RawFailure::Offline, None);
        context.record_refresh_attempt(false, 12, Some(&error));
        context.record_refresh_attempt(true, 40, None);

        let report = context.get_metrics_report();
        assert_eq!(report.metrics.total_attempts, 2);
        assert_eq!(report.metrics.error_breakdown.get(&ErrorCode::NetworkOffline), Some(&1));
        assert_eq!(report.summary, HealthSummary::Poor);
    }

    #[test]
    fn test_clones_share_metrics() {
        let context = AuthResilience::new();
        let clone = context.clone();
        clone.record_refresh_attempt(true, 5, None);
        assert_eq!(context.get_metrics_report().metrics.successful_refreshes, 1);
    }
}
