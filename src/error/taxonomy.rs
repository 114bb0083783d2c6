//! Static error taxonomy for authentication failures.
//!
//! Every [`ErrorCode`] belongs to exactly one [`ErrorCategory`] and maps to an
//! immutable [`ErrorMetadata`] record. The category of a code is resolved by an
//! exhaustive match, so a code can never be paired with the wrong category.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Broad family of a failure, used for routing and policy decisions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// Connectivity, transport and timeout failures.
    Network,
    /// Caller-supplied input was rejected.
    Validation,
    /// The auth server failed or refused service.
    Server,
    /// Access/refresh token problems.
    Token,
    /// The user could not be authenticated.
    Authentication,
    /// The user is authenticated but not allowed.
    Authorization,
    /// Bugs or misconfiguration inside the client.
    Internal,
    /// Nothing recognizable.
    Unknown,
}

impl ErrorCategory {
    /// All categories, in declaration order.
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::Network,
        ErrorCategory::Validation,
        ErrorCategory::Server,
        ErrorCategory::Token,
        ErrorCategory::Authentication,
        ErrorCategory::Authorization,
        ErrorCategory::Internal,
        ErrorCategory::Unknown,
    ];

    /// Returns the upper-case wire name of the category.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Server => "SERVER",
            ErrorCategory::Token => "TOKEN",
            ErrorCategory::Authentication => "AUTHENTICATION",
            ErrorCategory::Authorization => "AUTHORIZATION",
            ErrorCategory::Internal => "INTERNAL",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }

    /// Returns the codes owned by this category.
    pub fn codes(&self) -> impl Iterator<Item = ErrorCode> + '_ {
        ErrorCode::ALL
            .iter()
            .copied()
            .filter(move |code| code.category() == *self)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCategory {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Fine-grained failure tag. Each code is owned by one category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // NETWORK
    NetworkOffline,
    NetworkTimeout,
    NetworkConnectionFailed,
    // VALIDATION
    ValidationMissingFields,
    ValidationInvalidFormat,
    ValidationPasswordPolicy,
    // SERVER
    ServerInternalError,
    ServerUnavailable,
    ServerRateLimited,
    ServerMaintenance,
    // TOKEN
    TokenExpired,
    TokenMalformed,
    TokenMissing,
    TokenRevoked,
    TokenRefreshFailed,
    // AUTHENTICATION
    AuthInvalidCredentials,
    AuthAccountLocked,
    AuthAccountDisabled,
    AuthSessionExpired,
    // AUTHORIZATION
    AuthzForbidden,
    AuthzInsufficientScope,
    // INTERNAL
    InternalError,
    InternalConfiguration,
    // UNKNOWN
    UnknownError,
}

impl ErrorCode {
    /// Every code in the taxonomy.
    pub const ALL: [ErrorCode; 24] = [
        ErrorCode::NetworkOffline,
        ErrorCode::NetworkTimeout,
        ErrorCode::NetworkConnectionFailed,
        ErrorCode::ValidationMissingFields,
        ErrorCode::ValidationInvalidFormat,
        ErrorCode::ValidationPasswordPolicy,
        ErrorCode::ServerInternalError,
        ErrorCode::ServerUnavailable,
        ErrorCode::ServerRateLimited,
        ErrorCode::ServerMaintenance,
        ErrorCode::TokenExpired,
        ErrorCode::TokenMalformed,
        ErrorCode::TokenMissing,
        ErrorCode::TokenRevoked,
        ErrorCode::TokenRefreshFailed,
        ErrorCode::AuthInvalidCredentials,
        ErrorCode::AuthAccountLocked,
        ErrorCode::AuthAccountDisabled,
        ErrorCode::AuthSessionExpired,
        ErrorCode::AuthzForbidden,
        ErrorCode::AuthzInsufficientScope,
        ErrorCode::InternalError,
        ErrorCode::InternalConfiguration,
        ErrorCode::UnknownError,
    ];

    /// The category that owns this code.
    pub fn category(&self) -> ErrorCategory {
        match self {
            ErrorCode::NetworkOffline
            | ErrorCode::NetworkTimeout
            | ErrorCode::NetworkConnectionFailed => ErrorCategory::Network,
            ErrorCode::ValidationMissingFields
            | ErrorCode::ValidationInvalidFormat
            | ErrorCode::ValidationPasswordPolicy => ErrorCategory::Validation,
            ErrorCode::ServerInternalError
            | ErrorCode::ServerUnavailable
            | ErrorCode::ServerRateLimited
            | ErrorCode::ServerMaintenance => ErrorCategory::Server,
            ErrorCode::TokenExpired
            | ErrorCode::TokenMalformed
            | ErrorCode::TokenMissing
            | ErrorCode::TokenRevoked
            | ErrorCode::TokenRefreshFailed => ErrorCategory::Token,
            ErrorCode::AuthInvalidCredentials
            | ErrorCode::AuthAccountLocked
            | ErrorCode::AuthAccountDisabled
            | ErrorCode::AuthSessionExpired => ErrorCategory::Authentication,
            ErrorCode::AuthzForbidden | ErrorCode::AuthzInsufficientScope => {
                ErrorCategory::Authorization
            }
            ErrorCode::InternalError | ErrorCode::InternalConfiguration => ErrorCategory::Internal,
            ErrorCode::UnknownError => ErrorCategory::Unknown,
        }
    }

    /// Returns the SCREAMING_SNAKE_CASE wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NetworkOffline => "NETWORK_OFFLINE",
            ErrorCode::NetworkTimeout => "NETWORK_TIMEOUT",
            ErrorCode::NetworkConnectionFailed => "NETWORK_CONNECTION_FAILED",
            ErrorCode::ValidationMissingFields => "VALIDATION_MISSING_FIELDS",
            ErrorCode::ValidationInvalidFormat => "VALIDATION_INVALID_FORMAT",
            ErrorCode::ValidationPasswordPolicy => "VALIDATION_PASSWORD_POLICY",
            ErrorCode::ServerInternalError => "SERVER_INTERNAL_ERROR",
            ErrorCode::ServerUnavailable => "SERVER_UNAVAILABLE",
            ErrorCode::ServerRateLimited => "SERVER_RATE_LIMITED",
            ErrorCode::ServerMaintenance => "SERVER_MAINTENANCE",
            ErrorCode::TokenExpired => "TOKEN_EXPIRED",
            ErrorCode::TokenMalformed => "TOKEN_MALFORMED",
            ErrorCode::TokenMissing => "TOKEN_MISSING",
            ErrorCode::TokenRevoked => "TOKEN_REVOKED",
            ErrorCode::TokenRefreshFailed => "TOKEN_REFRESH_FAILED",
            ErrorCode::AuthInvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            ErrorCode::AuthAccountLocked => "AUTH_ACCOUNT_LOCKED",
            ErrorCode::AuthAccountDisabled => "AUTH_ACCOUNT_DISABLED",
            ErrorCode::AuthSessionExpired => "AUTH_SESSION_EXPIRED",
            ErrorCode::AuthzForbidden => "AUTHZ_FORBIDDEN",
            ErrorCode::AuthzInsufficientScope => "AUTHZ_INSUFFICIENT_SCOPE",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::InternalConfiguration => "INTERNAL_CONFIGURATION",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Returns the taxonomy metadata for this code.
    pub fn metadata(&self) -> &'static ErrorMetadata {
        metadata(*self)
    }

    /// Parses a wire name, resolving anything unrecognized to `UNKNOWN_ERROR`.
    pub fn parse_or_unknown(name: &str) -> ErrorCode {
        name.parse().unwrap_or(ErrorCode::UnknownError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == wanted)
            .ok_or_else(|| UnknownName(s.to_string()))
    }
}

/// Returned when a category or code name is not part of the taxonomy.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown taxonomy name: {0}")]
pub struct UnknownName(pub String);

/// How loudly a failure should be surfaced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        })
    }
}

/// Immutable policy record attached to an [`ErrorCode`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMetadata {
    /// Short title suitable for a toast heading.
    pub title: &'static str,
    /// Message shown to the user verbatim.
    pub user_message: &'static str,
    /// Actions the user can take, in order of preference.
    pub suggested_actions: &'static [&'static str],
    pub severity: Severity,
    /// Safe to retry automatically.
    pub auto_retryable: bool,
    /// The session can continue without the user re-authenticating.
    pub recoverable: bool,
}

const fn meta(
    title: &'static str,
    user_message: &'static str,
    suggested_actions: &'static [&'static str],
    severity: Severity,
    auto_retryable: bool,
    recoverable: bool,
) -> ErrorMetadata {
    ErrorMetadata {
        title,
        user_message,
        suggested_actions,
        severity,
        auto_retryable,
        recoverable,
    }
}

static NETWORK_OFFLINE: ErrorMetadata = meta(
    "You're offline",
    "No network connection was detected.",
    &["Check your internet connection", "Try again once you are back online"],
    Severity::Medium,
    true,
    true,
);
static NETWORK_TIMEOUT: ErrorMetadata = meta(
    "Request timed out",
    "The server took too long to respond.",
    &["Try again in a moment", "Check your connection speed"],
    Severity::Medium,
    true,
    true,
);
static NETWORK_CONNECTION_FAILED: ErrorMetadata = meta(
    "Connection failed",
    "We couldn't reach the server.",
    &["Check your internet connection", "Try again in a moment"],
    Severity::Medium,
    true,
    true,
);
static VALIDATION_MISSING_FIELDS: ErrorMetadata = meta(
    "Missing information",
    "Some required fields are empty.",
    &["Fill in all required fields"],
    Severity::Low,
    false,
    true,
);
static VALIDATION_INVALID_FORMAT: ErrorMetadata = meta(
    "Invalid input",
    "Some of the information entered is not in the expected format.",
    &["Review the highlighted fields"],
    Severity::Low,
    false,
    true,
);
static VALIDATION_PASSWORD_POLICY: ErrorMetadata = meta(
    "Password too weak",
    "The password does not meet the security requirements.",
    &["Use a longer password", "Mix letters, numbers and symbols"],
    Severity::Low,
    false,
    true,
);
static SERVER_INTERNAL_ERROR: ErrorMetadata = meta(
    "Server error",
    "Something went wrong on our side.",
    &["Try again in a moment", "Contact support if the problem persists"],
    Severity::High,
    true,
    true,
);
static SERVER_UNAVAILABLE: ErrorMetadata = meta(
    "Service unavailable",
    "The service is temporarily unavailable.",
    &["Try again in a few minutes"],
    Severity::High,
    true,
    true,
);
static SERVER_RATE_LIMITED: ErrorMetadata = meta(
    "Too many requests",
    "You're doing that too often.",
    &["Wait a moment before trying again"],
    Severity::Medium,
    true,
    true,
);
static SERVER_MAINTENANCE: ErrorMetadata = meta(
    "Scheduled maintenance",
    "The service is down for maintenance.",
    &["Try again later", "Check the status page for updates"],
    Severity::Medium,
    false,
    true,
);
static TOKEN_EXPIRED: ErrorMetadata = meta(
    "Session expired",
    "Your session has expired.",
    &["Refresh the session", "Sign in again if the problem persists"],
    Severity::Medium,
    false,
    true,
);
static TOKEN_MALFORMED: ErrorMetadata = meta(
    "Invalid session",
    "Your session data is corrupted.",
    &["Sign in again"],
    Severity::High,
    false,
    false,
);
static TOKEN_MISSING: ErrorMetadata = meta(
    "Not signed in",
    "No active session was found.",
    &["Sign in to continue"],
    Severity::Medium,
    false,
    false,
);
static TOKEN_REVOKED: ErrorMetadata = meta(
    "Session revoked",
    "Your session was ended by the server.",
    &["Sign in again"],
    Severity::High,
    false,
    false,
);
static TOKEN_REFRESH_FAILED: ErrorMetadata = meta(
    "Session refresh failed",
    "We couldn't renew your session.",
    &["Try again in a moment", "Sign in again if the problem persists"],
    Severity::Medium,
    true,
    true,
);
static AUTH_INVALID_CREDENTIALS: ErrorMetadata = meta(
    "Sign-in failed",
    "The email or password is incorrect.",
    &["Check your email and password", "Reset your password"],
    Severity::Medium,
    false,
    true,
);
static AUTH_ACCOUNT_LOCKED: ErrorMetadata = meta(
    "Account locked",
    "Your account has been locked after too many failed attempts.",
    &["Reset your password", "Contact support"],
    Severity::High,
    false,
    false,
);
static AUTH_ACCOUNT_DISABLED: ErrorMetadata = meta(
    "Account disabled",
    "Your account has been disabled.",
    &["Contact support"],
    Severity::High,
    false,
    false,
);
static AUTH_SESSION_EXPIRED: ErrorMetadata = meta(
    "Signed out",
    "You have been signed out.",
    &["Sign in again"],
    Severity::Medium,
    false,
    false,
);
static AUTHZ_FORBIDDEN: ErrorMetadata = meta(
    "Access denied",
    "You don't have permission to do that.",
    &["Ask a workspace admin for access"],
    Severity::Medium,
    false,
    true,
);
static AUTHZ_INSUFFICIENT_SCOPE: ErrorMetadata = meta(
    "Insufficient permissions",
    "Your plan or role does not include this feature.",
    &["Upgrade your plan", "Ask a workspace admin for access"],
    Severity::Medium,
    false,
    true,
);
static INTERNAL_ERROR: ErrorMetadata = meta(
    "Unexpected error",
    "An unexpected error occurred.",
    &["Reload the page", "Contact support if the problem persists"],
    Severity::High,
    false,
    true,
);
static INTERNAL_CONFIGURATION: ErrorMetadata = meta(
    "Configuration error",
    "The application is misconfigured.",
    &["Contact support"],
    Severity::High,
    false,
    false,
);
static UNKNOWN_ERROR: ErrorMetadata = meta(
    "Something went wrong",
    "An unknown error occurred.",
    &["Try again", "Contact support if the problem persists"],
    Severity::Medium,
    false,
    true,
);

/// Looks up the metadata record for a code.
pub fn metadata(code: ErrorCode) -> &'static ErrorMetadata {
    match code {
        ErrorCode::NetworkOffline => &NETWORK_OFFLINE,
        ErrorCode::NetworkTimeout => &NETWORK_TIMEOUT,
        ErrorCode::NetworkConnectionFailed => &NETWORK_CONNECTION_FAILED,
        ErrorCode::ValidationMissingFields => &VALIDATION_MISSING_FIELDS,
        ErrorCode::ValidationInvalidFormat => &VALIDATION_INVALID_FORMAT,
        ErrorCode::ValidationPasswordPolicy => &VALIDATION_PASSWORD_POLICY,
        ErrorCode::ServerInternalError => &SERVER_INTERNAL_ERROR,
        ErrorCode::ServerUnavailable => &SERVER_UNAVAILABLE,
        ErrorCode::ServerRateLimited => &SERVER_RATE_LIMITED,
        ErrorCode::ServerMaintenance => &SERVER_MAINTENANCE,
        ErrorCode::TokenExpired => &TOKEN_EXPIRED,
        ErrorCode::TokenMalformed => &TOKEN_MALFORMED,
        ErrorCode::TokenMissing => &TOKEN_MISSING,
        ErrorCode::TokenRevoked => &TOKEN_REVOKED,
        ErrorCode::TokenRefreshFailed => &TOKEN_REFRESH_FAILED,
        ErrorCode::AuthInvalidCredentials => &AUTH_INVALID_CREDENTIALS,
        ErrorCode::AuthAccountLocked => &AUTH_ACCOUNT_LOCKED,
        ErrorCode::AuthAccountDisabled => &AUTH_ACCOUNT_DISABLED,
        ErrorCode::AuthSessionExpired => &AUTH_SESSION_EXPIRED,
        ErrorCode::AuthzForbidden => &AUTHZ_FORBIDDEN,
        ErrorCode::AuthzInsufficientScope => &AUTHZ_INSUFFICIENT_SCOPE,
        ErrorCode::InternalError => &INTERNAL_ERROR,
        ErrorCode::InternalConfiguration => &INTERNAL_CONFIGURATION,
        ErrorCode::UnknownError => &UNKNOWN_ERROR,
    }
}

/// Looks up a code by wire name. Unknown names resolve to `UNKNOWN_ERROR`.
pub fn lookup(name: &str) -> (ErrorCode, &'static ErrorMetadata) {
    let code = ErrorCode::parse_or_unknown(name);
    (code, metadata(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_code_has_a_distinct_wire_name() {
        let mut names: Vec<_> = ErrorCode::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ErrorCode::ALL.len());
    }

    #[test]
    fn test_wire_name_round_trips_through_from_str() {
        for code in ErrorCode::ALL {
            assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(code));
        }
    }

    #[test]
    fn test_wire_name_matches_serde_name() {
        for code in ErrorCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn test_code_prefix_matches_category() {
        assert_eq!(ErrorCode::TokenExpired.category(), ErrorCategory::Token);
        assert_eq!(ErrorCode::NetworkTimeout.category(), ErrorCategory::Network);
        assert_eq!(
            ErrorCode::AuthAccountLocked.category(),
            ErrorCategory::Authentication
        );
        assert_eq!(
            ErrorCode::AuthzForbidden.category(),
            ErrorCategory::Authorization
        );
        assert_eq!(ErrorCode::UnknownError.category(), ErrorCategory::Unknown);
    }

    #[test]
    fn test_every_category_owns_at_least_one_code() {
        for category in ErrorCategory::ALL {
            assert!(category.codes().count() > 0, "{category} owns no codes");
        }
        let total: usize = ErrorCategory::ALL.iter().map(|c| c.codes().count()).sum();
        assert_eq!(total, ErrorCode::ALL.len());
    }

    #[test]
    fn test_lookup_unknown_name_resolves_to_unknown_error() {
        let (code, meta) = lookup("NOT_A_REAL_CODE");
        assert_eq!(code, ErrorCode::UnknownError);
        assert_eq!(meta, ErrorCode::UnknownError.metadata());
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let (code, _) = lookup("token_expired");
        assert_eq!(code, ErrorCode::TokenExpired);
    }

    #[test]
    fn test_network_codes_are_auto_retryable() {
        for code in ErrorCategory::Network.codes() {
            assert!(code.metadata().auto_retryable, "{code} should retry");
        }
    }

    #[test]
    fn test_non_retryable_categories() {
        for category in [
            ErrorCategory::Validation,
            ErrorCategory::Authentication,
            ErrorCategory::Authorization,
        ] {
            for code in category.codes() {
                assert!(!code.metadata().auto_retryable, "{code} must not retry");
            }
        }
    }

    #[test]
    fn test_locked_and_disabled_accounts_are_not_recoverable() {
        assert!(!ErrorCode::AuthAccountLocked.metadata().recoverable);
        assert!(!ErrorCode::AuthAccountDisabled.metadata().recoverable);
    }

    #[test]
    fn test_every_code_suggests_an_action() {
        for code in ErrorCode::ALL {
            let meta = code.metadata();
            assert!(!meta.suggested_actions.is_empty(), "{code}");
            assert!(!meta.user_message.is_empty(), "{code}");
            assert!(!meta.title.is_empty(), "{code}");
        }
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("token".parse::<ErrorCategory>(), Ok(ErrorCategory::Token));
        assert!("bogus".parse::<ErrorCategory>().is_err());
    }
}
