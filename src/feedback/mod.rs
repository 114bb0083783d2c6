//! Lifecycle feedback for authentication operations.
//!
//! The orchestrator reports every state transition as a [`FeedbackEvent`].
//! Callers subscribe with [`FeedbackHandlers`]; UI toasts, progress bars and
//! loggers are all just handlers. Every event is also logged through `tracing`.

pub mod orchestrator;

pub use orchestrator::{ExecuteOptions, FeedbackOrchestrator, OperationState};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ClassifiedError;

/// Well-known operation names, used as single-flight keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AuthOperation {
    Login,
    Logout,
    TokenRefresh,
    Custom(String),
}

impl AuthOperation {
    pub fn as_str(&self) -> &str {
        match self {
            AuthOperation::Login => "login",
            AuthOperation::Logout => "logout",
            AuthOperation::TokenRefresh => "tokenRefresh",
            AuthOperation::Custom(name) => name,
        }
    }
}

impl fmt::Display for AuthOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for AuthOperation {
    fn from(name: &str) -> Self {
        match name {
            "login" => AuthOperation::Login,
            "logout" => AuthOperation::Logout,
            "tokenRefresh" => AuthOperation::TokenRefresh,
            other => AuthOperation::Custom(other.to_string()),
        }
    }
}

/// An observable state transition of one `execute` call.
#[derive(Clone, Debug, PartialEq)]
pub enum FeedbackEvent {
    /// Idle to Running: the first attempt is starting.
    Started { operation: String },

    /// Running to Retrying: an attempt failed and another is scheduled.
    RetryScheduled {
        operation: String,
        /// The retry about to happen (1-based).
        retry: u32,
        max_retries: u32,
        delay: Duration,
        error: ClassifiedError,
    },

    /// Retrying to Running: the scheduled retry is starting.
    RetryStarted {
        operation: String,
        retry: u32,
        max_retries: u32,
    },

    /// Running to Succeeded.
    Succeeded {
        operation: String,
        /// Attempts made, including the successful one.
        attempts: u32,
        elapsed: Duration,
    },

    /// Running to Failed: the error is terminal.
    Failed {
        operation: String,
        attempts: u32,
        error: ClassifiedError,
    },
}

impl FeedbackEvent {
    pub fn operation(&self) -> &str {
        match self {
            Self::Started { operation }
            | Self::RetryScheduled { operation, .. }
            | Self::RetryStarted { operation, .. }
            | Self::Succeeded { operation, .. }
            | Self::Failed { operation, .. } => operation,
        }
    }

    /// True for the two retry events, which are routed to `on_progress`.
    pub fn is_progress(&self) -> bool {
        matches!(self, Self::RetryScheduled { .. } | Self::RetryStarted { .. })
    }

    /// The error carried by the event, if any.
    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            Self::RetryScheduled { error, .. } | Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { operation } => write!(f, "{}: started", operation),
            Self::RetryScheduled {
                operation,
                retry,
                max_retries,
                delay,
                error,
            } => write!(
                f,
                "{}: retrying ({}/{}) in {}ms after {}",
                operation,
                retry,
                max_retries,
                delay.as_millis(),
                error.code()
            ),
            Self::RetryStarted {
                operation,
                retry,
                max_retries,
            } => write!(f, "{}: retry {}/{} started", operation, retry, max_retries),
            Self::Succeeded {
                operation,
                attempts,
                elapsed,
            } => write!(
                f,
                "{}: succeeded after {} attempt(s) in {}ms",
                operation,
                attempts,
                elapsed.as_millis()
            ),
            Self::Failed {
                operation,
                attempts,
                error,
            } => write!(
                f,
                "{}: failed after {} attempt(s): {}",
                operation,
                attempts,
                error.user_message()
            ),
        }
    }
}

/// A lifecycle callback.
pub type FeedbackHandler = Arc<dyn Fn(&FeedbackEvent) + Send + Sync>;

/// Caller-supplied lifecycle callbacks. All are optional.
///
/// Handlers run synchronously inside the orchestrator's transitions, so they
/// should be quick.
#[derive(Clone, Default)]
pub struct FeedbackHandlers {
    on_start: Option<FeedbackHandler>,
    on_progress: Option<FeedbackHandler>,
    on_success: Option<FeedbackHandler>,
    on_error: Option<FeedbackHandler>,
}

impl fmt::Debug for FeedbackHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackHandlers")
            .field("on_start", &self.on_start.is_some())
            .field("on_progress", &self.on_progress.is_some())
            .field("on_success", &self.on_success.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

impl FeedbackHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once when the operation starts.
    pub fn on_start(mut self, handler: impl Fn(&FeedbackEvent) + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(handler));
        self
    }

    /// Called when a retry is scheduled and when it starts.
    pub fn on_progress(mut self, handler: impl Fn(&FeedbackEvent) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(handler));
        self
    }

    /// Called once when the operation succeeds.
    pub fn on_success(mut self, handler: impl Fn(&FeedbackEvent) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(handler));
        self
    }

    /// Called once with the terminal error.
    pub fn on_error(mut self, handler: impl Fn(&FeedbackEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(handler));
        self
    }

    /// Routes one handler to all four hooks.
    pub fn all(handler: impl Fn(&FeedbackEvent) + Send + Sync + 'static) -> Self {
        let handler: FeedbackHandler = Arc::new(handler);
        Self {
            on_start: Some(Arc::clone(&handler)),
            on_progress: Some(Arc::clone(&handler)),
            on_success: Some(Arc::clone(&handler)),
            on_error: Some(handler),
        }
    }

    /// Delivers an event to the matching hook and logs it.
    pub fn emit(&self, event: &FeedbackEvent) {
        let hook = match event {
            FeedbackEvent::Started { .. } => &self.on_start,
            FeedbackEvent::RetryScheduled { .. } | FeedbackEvent::RetryStarted { .. } => {
                &self.on_progress
            }
            FeedbackEvent::Succeeded { .. } => &self.on_success,
            FeedbackEvent::Failed { .. } => &self.on_error,
        };

        match event {
            FeedbackEvent::Failed { error, .. } => tracing::error!(
                operation = event.operation(),
                code = %error.code(),
                category = %error.category(),
                recoverable = error.is_recoverable(),
                "{}",
                event
            ),
            FeedbackEvent::RetryScheduled { error, .. } => tracing::warn!(
                operation = event.operation(),
                code = %error.code(),
                "{}",
                event
            ),
            FeedbackEvent::Succeeded { .. } => {
                tracing::info!(operation = event.operation(), "{}", event)
            }
            _ => tracing::debug!(operation = event.operation(), "{}", event),
        }

        if let Some(hook) = hook {
            hook(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::Mutex;

    fn hook(
        label: &'static str,
        seen: &Arc<Mutex<Vec<String>>>,
    ) -> impl Fn(&FeedbackEvent) + Send + Sync + 'static {
        let seen = Arc::clone(seen);
        move |_| seen.lock().unwrap().push(label.to_string())
    }

    fn recorder() -> (FeedbackHandlers, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handlers = FeedbackHandlers::new()
            .on_start(hook("start", &seen))
            .on_progress(hook("progress", &seen))
            .on_success(hook("success", &seen))
            .on_error(hook("error", &seen));
        (handlers, seen)
    }

    #[test]
    fn test_events_route_to_matching_hook() {
        let (handlers, seen) = recorder();
        let error = ClassifiedError::new(ErrorCode::NetworkTimeout, "slow");
        let op = "tokenRefresh".to_string();

        handlers.emit(&FeedbackEvent::Started { operation: op.clone() });
        handlers.emit(&FeedbackEvent::RetryScheduled {
            operation: op.clone(),
            retry: 1,
            max_retries: 3,
            delay: Duration::from_secs(1),
            error: error.clone(),
        });
        handlers.emit(&FeedbackEvent::RetryStarted {
            operation: op.clone(),
            retry: 1,
            max_retries: 3,
        });
        handlers.emit(&FeedbackEvent::Succeeded {
            operation: op.clone(),
            attempts: 2,
            elapsed: Duration::from_millis(1500),
        });
        handlers.emit(&FeedbackEvent::Failed {
            operation: op,
            attempts: 1,
            error,
        });

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["start", "progress", "progress", "success", "error"]
        );
    }

    #[test]
    fn test_missing_hooks_are_skipped() {
        let handlers = FeedbackHandlers::new();
        handlers.emit(&FeedbackEvent::Started {
            operation: "login".to_string(),
        });
    }

    #[test]
    fn test_all_routes_every_event() {
        let count = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&count);
        let handlers = FeedbackHandlers::all(move |_| *counter.lock().unwrap() += 1);
        handlers.emit(&FeedbackEvent::Started {
            operation: "login".to_string(),
        });
        handlers.emit(&FeedbackEvent::Succeeded {
            operation: "login".to_string(),
            attempts: 1,
            elapsed: Duration::ZERO,
        });
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_event_display() {
        let error = ClassifiedError::new(ErrorCode::ServerUnavailable, "503");
        let event = FeedbackEvent::RetryScheduled {
            operation: "tokenRefresh".to_string(),
            retry: 2,
            max_retries: 3,
            delay: Duration::from_millis(2000),
            error: error.clone(),
        };
        assert_eq!(
            event.to_string(),
            "tokenRefresh: retrying (2/3) in 2000ms after SERVER_UNAVAILABLE"
        );
        assert!(event.is_progress());
        assert_eq!(event.error(), Some(&error));

        let failed = FeedbackEvent::Failed {
            operation: "login".to_string(),
            attempts: 1,
            error,
        };
        assert!(failed.to_string().contains("temporarily unavailable"));
    }

    #[test]
    fn test_auth_operation_names() {
        assert_eq!(AuthOperation::TokenRefresh.as_str(), "tokenRefresh");
        assert_eq!(AuthOperation::from("login"), AuthOperation::Login);
        assert_eq!(
            AuthOperation::from("exportWorkspace"),
            AuthOperation::Custom("exportWorkspace".to_string())
        );
    }
}
