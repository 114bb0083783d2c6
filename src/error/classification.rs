//! The structured error produced for every authentication failure.
//!
//! A [`ClassifiedError`] is immutable once built. Its category is always derived
//! from its code, so the pair can never disagree.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::taxonomy::{ErrorCategory, ErrorCode, Severity};

/// A raw failure normalized into category, code and policy metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    category: ErrorCategory,
    code: ErrorCode,
    message: String,
    user_message: String,
    suggested_actions: Vec<String>,
    severity: Severity,
    recoverable: bool,
    retryable: bool,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    debug_info: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_error: Option<String>,
}

impl ClassifiedError {
    /// Creates a classified error for `code`, filling policy fields from the taxonomy.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::at(code, message, Utc::now())
    }

    /// Same as [`ClassifiedError::new`] with an explicit timestamp.
    pub fn at(code: ErrorCode, message: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let meta = code.metadata();
        Self {
            category: code.category(),
            code,
            message: message.into(),
            user_message: meta.user_message.to_string(),
            suggested_actions: meta
                .suggested_actions
                .iter()
                .map(|action| action.to_string())
                .collect(),
            severity: meta.severity,
            recoverable: meta.recoverable,
            retryable: meta.auto_retryable,
            timestamp,
            context: None,
            debug_info: BTreeMap::new(),
            original_error: None,
        }
    }

    /// Returns a copy carrying the operation context (e.g. `"tokenRefresh"`).
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Returns a copy with one more debug key-value pair.
    pub fn with_debug_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.debug_info.insert(key.into(), value.into());
        self
    }

    /// Returns a copy remembering the text of the raw failure.
    pub fn with_original_error(mut self, original: impl Into<String>) -> Self {
        self.original_error = Some(original.into());
        self
    }

    /// Category derived from the code.
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Specific taxonomy code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Developer-facing description of what happened.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text shown to the user verbatim.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Steps the user can take, in display order.
    pub fn suggested_actions(&self) -> &[String] {
        &self.suggested_actions
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// True if the session can continue without the user signing in again.
    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    /// True if the failed operation may be retried automatically.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// When the error was classified.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Operation the error was raised in, if known.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Diagnostic details such as the HTTP status or matched pattern.
    pub fn debug_info(&self) -> &BTreeMap<String, String> {
        &self.debug_info
    }

    /// Text of the raw failure before classification.
    pub fn original_error(&self) -> Option<&str> {
        self.original_error.as_deref()
    }

    /// True when the user has to sign in again to continue.
    pub fn requires_reauthentication(&self) -> bool {
        !self.recoverable
            && matches!(
                self.category,
                ErrorCategory::Token | ErrorCategory::Authentication
            )
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ClassifiedError {}
