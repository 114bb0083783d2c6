//! Raw failure signals fed into the classifier.
//!
//! Transports and token stores report problems in many shapes. [`RawFailure`]
//! is the closed set of signals the classifier understands; the `From` impls
//! let callers use `?` on the errors they already have.

use std::fmt;
use std::io;

use super::ClassifiedError;

/// An unclassified failure.
#[derive(Debug)]
pub enum RawFailure {
    /// No network connectivity at all.
    Offline,
    /// The transport failed before a response arrived.
    Transport(String),
    /// The request exceeded its deadline.
    Timeout(String),
    /// The request was aborted by its own signal.
    Aborted,
    /// An HTTP response with a non-success status.
    Http { status: u16, body: String },
    /// The token payload could not be decoded.
    MalformedToken(String),
    /// No token was available.
    MissingToken,
    /// The token is past its expiry.
    ExpiredToken,
    /// The server rejected the supplied credentials.
    InvalidCredentials(String),
    AccountLocked,
    AccountDisabled,
    /// Required request fields were missing.
    MissingFields(Vec<String>),
    /// Free-form text with no structured signal.
    Message(String),
    /// Already classified; passed through unchanged.
    Classified(ClassifiedError),
}

impl RawFailure {
    /// Creates an HTTP failure.
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            body: body.into(),
        }
    }

    /// Creates a transport failure.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a timeout failure.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }
}

impl fmt::Display for RawFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "network offline"),
            Self::Transport(message) => write!(f, "transport error: {}", message),
            Self::Timeout(message) => write!(f, "timed out: {}", message),
            Self::Aborted => write!(f, "request aborted"),
            Self::Http { status, body } if body.is_empty() => write!(f, "HTTP {}", status),
            Self::Http { status, body } => write!(f, "HTTP {}: {}", status, body),
            Self::MalformedToken(message) => write!(f, "malformed token: {}", message),
            Self::MissingToken => write!(f, "no token available"),
            Self::ExpiredToken => write!(f, "token expired"),
            Self::InvalidCredentials(message) => write!(f, "invalid credentials: {}", message),
            Self::AccountLocked => write!(f, "account locked"),
            Self::AccountDisabled => write!(f, "account disabled"),
            Self::MissingFields(fields) => write!(f, "missing fields: {}", fields.join(", ")),
            Self::Message(message) => f.write_str(message),
            Self::Classified(error) => write!(f, "{}", error),
        }
    }
}

impl std::error::Error for RawFailure {}

impl From<ClassifiedError> for RawFailure {
    fn from(error: ClassifiedError) -> Self {
        Self::Classified(error)
    }
}

impl From<String> for RawFailure {
    fn from(message: String) -> Self {
        Self::Message(message)
    }
}

impl From<&str> for RawFailure {
    fn from(message: &str) -> Self {
        Self::Message(message.to_string())
    }
}

impl From<io::Error> for RawFailure {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut => Self::Timeout(error.to_string()),
            io::ErrorKind::NotConnected => Self::Offline,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::AddrNotAvailable => Self::Transport(error.to_string()),
            io::ErrorKind::Interrupted => Self::Aborted,
            _ => Self::Message(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for RawFailure {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedToken(error.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RawFailure {
    fn from(error: tokio::time::error::Elapsed) -> Self {
        Self::Timeout(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_kinds_map_to_signals() {
        let timeout = RawFailure::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(matches!(timeout, RawFailure::Timeout(_)));

        let refused = RawFailure::from(io::Error::new(io::ErrorKind::ConnectionRefused, "nope"));
        assert!(matches!(refused, RawFailure::Transport(_)));

        let offline = RawFailure::from(io::Error::new(io::ErrorKind::NotConnected, "down"));
        assert!(matches!(offline, RawFailure::Offline));

        let other = RawFailure::from(io::Error::new(io::ErrorKind::Other, "weird"));
        assert!(matches!(other, RawFailure::Message(ref m) if m == "weird"));
    }

    #[test]
    fn test_json_error_is_a_malformed_token() {
        let error = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        assert!(matches!(RawFailure::from(error), RawFailure::MalformedToken(_)));
    }

    #[test]
    fn test_display_http_with_and_without_body() {
        assert_eq!(RawFailure::http(503, "").to_string(), "HTTP 503");
        assert_eq!(
            RawFailure::http(429, "slow down").to_string(),
            "HTTP 429: slow down"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_is_a_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(5),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        assert!(matches!(RawFailure::from(elapsed), RawFailure::Timeout(_)));
    }
}
