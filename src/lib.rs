//! Authentication resilience: error classification, bounded retry with
//! backoff, single-flight token refresh and refresh health metrics.
//!
//! Most callers only need [`context::AuthResilience`], constructed once at
//! startup and shared with every call site.

pub mod config;
pub mod context;
pub mod error;
pub mod feedback;
pub mod guard;
pub mod logging;
pub mod metrics;
pub mod retry;
pub mod token;

pub use context::AuthResilience;
pub use error::{ClassifiedError, ErrorCategory, ErrorCode, RawFailure};
pub use feedback::{ExecuteOptions, FeedbackEvent, FeedbackHandlers};
