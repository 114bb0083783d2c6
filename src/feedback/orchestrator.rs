//! Executes authentication operations with classification, retry and feedback.
//!
//! Each `execute` call drives its own state machine:
//!
//! ```text
//! Idle -> Running -> Succeeded
//!            |  ^
//!            v  |
//!         Retrying
//!            |
//!            v
//!          Failed
//! ```
//!
//! Every attempt goes through the [`ConcurrencyGuard`] under the operation name,
//! so concurrent callers of the same operation share one underlying attempt.
//! Classification and metrics happen inside that shared attempt, once per
//! underlying invocation, regardless of how many callers joined it.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use super::{FeedbackEvent, FeedbackHandlers};
use crate::error::{ClassifiedError, ErrorClassifier, ErrorCode, RawFailure};
use crate::guard::ConcurrencyGuard;
use crate::metrics::MetricsRecorder;
use crate::retry::{RetryDecision, RetryPolicy, RetryState};

/// Lifecycle state of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OperationState {
    #[default]
    Idle,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl OperationState {
    /// True if `self -> next` is an edge of the state machine.
    pub fn can_transition_to(&self, next: OperationState) -> bool {
        use OperationState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Succeeded)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Running)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationState::Succeeded | OperationState::Failed)
    }
}

/// Per-call options for [`FeedbackOrchestrator::execute`].
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Lifecycle callbacks.
    pub handlers: FeedbackHandlers,
    /// Overrides the policy's `max_retries` for this call.
    pub max_retries: Option<u32>,
    /// Record attempts into the refresh metrics. Only the caller that starts
    /// an attempt decides this; joiners share its outcome.
    pub track_metrics: bool,
    /// Context attached to classified errors. Defaults to the operation name.
    pub context: Option<String>,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            handlers: FeedbackHandlers::default(),
            max_retries: None,
            track_metrics: true,
            context: None,
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Callbacks invoked on each state transition.
    pub fn with_handlers(mut self, handlers: FeedbackHandlers) -> Self {
        self.handlers = handlers;
        self
    }

    /// Overrides the policy's retry budget for this call.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Whether settled attempts are recorded. On by default.
    pub fn with_metrics(mut self, track: bool) -> Self {
        self.track_metrics = track;
        self
    }

    /// Context attached to errors from this call instead of the operation name.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// State machine for a single `execute` call.
struct OperationRun<'a> {
    operation: &'a str,
    handlers: &'a FeedbackHandlers,
    state: OperationState,
    retry: RetryState,
    attempts: u32,
    started: Instant,
}

impl<'a> OperationRun<'a> {
    fn new(operation: &'a str, handlers: &'a FeedbackHandlers) -> Self {
        Self {
            operation,
            handlers,
            state: OperationState::Idle,
            retry: RetryState::new(),
            attempts: 0,
            started: Instant::now(),
        }
    }

    fn transition(&mut self, next: OperationState, event: FeedbackEvent) {
        if !self.state.can_transition_to(next) {
            tracing::warn!(
                operation = self.operation,
                from = ?self.state,
                to = ?next,
                "unexpected operation state transition"
            );
        }
        tracing::trace!(operation = self.operation, from = ?self.state, to = ?next, "transition");
        self.state = next;
        self.handlers.emit(&event);
    }

    fn begin_attempt(&mut self) {
        self.attempts += 1;
        self.retry.mark_attempt(Utc::now());
    }

    fn start(&mut self) {
        let event = FeedbackEvent::Started {
            operation: self.operation.to_string(),
        };
        self.transition(OperationState::Running, event);
    }

    fn schedule_retry(&mut self, delay: Duration, max_retries: u32, error: ClassifiedError) {
        self.retry.record_retry();
        let event = FeedbackEvent::RetryScheduled {
            operation: self.operation.to_string(),
            retry: self.retry.attempt_count,
            max_retries,
            delay,
            error,
        };
        self.transition(OperationState::Retrying, event);
    }

    fn resume(&mut self, max_retries: u32) {
        let event = FeedbackEvent::RetryStarted {
            operation: self.operation.to_string(),
            retry: self.retry.attempt_count,
            max_retries,
        };
        self.transition(OperationState::Running, event);
    }

    fn succeed(&mut self) {
        let event = FeedbackEvent::Succeeded {
            operation: self.operation.to_string(),
            attempts: self.attempts,
            elapsed: self.started.elapsed(),
        };
        self.transition(OperationState::Succeeded, event);
        self.retry.reset();
    }

    fn fail(&mut self, error: ClassifiedError) {
        let event = FeedbackEvent::Failed {
            operation: self.operation.to_string(),
            attempts: self.attempts,
            error,
        };
        self.transition(OperationState::Failed, event);
    }
}

/// Façade that runs auth operations through guard, classifier, retry policy and metrics.
#[derive(Debug, Clone)]
pub struct FeedbackOrchestrator {
    classifier: Arc<ErrorClassifier>,
    guard: ConcurrencyGuard,
    metrics: MetricsRecorder,
    policy: RetryPolicy,
}

impl Default for FeedbackOrchestrator {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl FeedbackOrchestrator {
    /// Creates an orchestrator with fresh collaborators.
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_parts(
            Arc::new(ErrorClassifier::new()),
            ConcurrencyGuard::new(),
            MetricsRecorder::new(),
            policy,
        )
    }

    /// Creates an orchestrator over existing collaborators.
    pub fn with_parts(
        classifier: Arc<ErrorClassifier>,
        guard: ConcurrencyGuard,
        metrics: MetricsRecorder,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            classifier,
            guard,
            metrics,
            policy,
        }
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Single-flight registry shared by all attempts.
    pub fn guard(&self) -> &ConcurrencyGuard {
        &self.guard
    }

    pub fn metrics(&self) -> &MetricsRecorder {
        &self.metrics
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `task` as `operation`, retrying retryable failures with backoff.
    ///
    /// `task` is invoked once per attempt. Concurrent calls with the same
    /// operation name join the attempt already in flight instead of invoking
    /// their own `task`.
    ///
    /// # Errors
    /// Returns the terminal [`ClassifiedError`] once the error is not retryable
    /// or the retry budget is spent.
    pub async fn execute<T, E, F, Fut>(
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
        let task = Arc::new(task);
        let policy = match options.max_retries {
            Some(max_retries) => self.policy.clone().with_max_retries(max_retries),
            None => self.policy.clone(),
        };
        let context = options
            .context
            .clone()
            .unwrap_or_else(|| operation.to_string());

        let mut run = OperationRun::new(operation, &options.handlers);
        run.start();

        loop {
            run.begin_attempt();
            let outcome = self
                .attempt(operation, &context, Arc::clone(&task), options.track_metrics)
                .await;

            let error = match outcome {
                Ok(value) => {
                    run.succeed();
                    return Ok(value);
                }
                Err(error) => error,
            };

            run.retry.record_failure();
            match policy.decide(&run.retry, &error, Utc::now()) {
                RetryDecision::Retry { delay } => {
                    run.schedule_retry(delay, policy.max_retries, error);
                    tokio::time::sleep(delay).await;
                    run.resume(policy.max_retries);
                }
                RetryDecision::GiveUp(reason) => {
                    tracing::debug!(operation, %reason, code = %error.code(), "giving up");
                    run.fail(error.clone());
                    return Err(error);
                }
            }
        }
    }

    /// One attempt, shared with any concurrent caller of the same operation.
    async fn attempt<T, E, F, Fut>(
        &self,
        operation: &str,
        context: &str,
        task: Arc<F>,
        track_metrics: bool,
    ) -> Result<T, ClassifiedError>
    where
        T: Clone + Send + Sync + 'static,
        E: Into<RawFailure> + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let classifier = Arc::clone(&self.classifier);
        let metrics = self.metrics.clone();
        let attempt_context = context.to_string();

        let handle = self.guard.acquire_or_join(operation, move || {
            let pending = (*task)();
            async move {
                let started = Instant::now();
                let result = pending.await;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                match result {
                    Ok(value) => {
                        if track_metrics {
                            metrics.record_attempt(true, duration_ms, None);
                        }
                        Ok(value)
                    }
                    Err(raw) => {
                        let error = classifier.classify(raw, Some(&attempt_context));
                        if track_metrics {
                            metrics.record_attempt(false, duration_ms, Some(&error));
                        }
                        Err(error)
                    }
                }
            }
        });

        match handle.await {
            Ok(result) => result,
            Err(guard_error) => Err(ClassifiedError::new(
                ErrorCode::InternalError,
                guard_error.to_string(),
            )
            .with_context(context)),
        }
    }
}
