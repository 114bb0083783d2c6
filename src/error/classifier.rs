//! Error classifier for authentication failures.
//!
//! Structured signals (HTTP status, io error kind, token problems) map directly
//! to an [`ErrorCode`]. Free-form text is matched against an ordered table of
//! regex patterns, and anything left over becomes `UNKNOWN_ERROR`.
//! Classification never fails.

use regex::Regex;

use super::{ClassifiedError, ErrorCategory, ErrorCode, RawFailure};

/// A text pattern that tags matching messages with an error code.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    regex: Regex,
    code: ErrorCode,
    description: String,
}

impl ErrorPattern {
    /// Compiles a new pattern.
    ///
    /// # Errors
    /// Returns the regex error if `pattern` does not compile.
    pub fn new(
        pattern: &str,
        code: ErrorCode,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self::with_regex(Regex::new(pattern)?, code, description))
    }

    /// Creates a pattern from a pre-compiled regex.
    pub fn with_regex(regex: Regex, code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            regex,
            code,
            description: description.into(),
        }
    }

    /// Code assigned to messages this pattern matches.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// Short human-readable name of the rule, reported as `matched_rule`.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the first matched substring, if any.
    pub fn find<'a>(&self, text: &'a str) -> Option<&'a str> {
        self.regex.find(text).map(|m| m.as_str())
    }
}

/// Pattern source, code and description for the built-in table, in priority order.
const DEFAULT_PATTERNS: &[(&str, ErrorCode, &str)] = &[
    // Connectivity
    (
        r"(?i)\boffline\b|no\s+internet|network\s+(is\s+)?unreachable|ERR_INTERNET_DISCONNECTED",
        ErrorCode::NetworkOffline,
        "No network connectivity",
    ),
    (
        r"(?i)time(d)?[\s\-]?out|deadline\s+exceeded|\baborted?\b|AbortError",
        ErrorCode::NetworkTimeout,
        "Request timed out or was aborted",
    ),
    (
        r"(?i)failed\s+to\s+fetch|network\s*(error|request\s+failed)|connection\s*(refused|reset|closed)|ECONNREFUSED|ECONNRESET|\bdns\b",
        ErrorCode::NetworkConnectionFailed,
        "Transport-level failure",
    ),
    // Server
    (
        r"(?i)\b429\b|rate[\s\-]?limit|too\s+many\s+requests",
        ErrorCode::ServerRateLimited,
        "Rate limited",
    ),
    (
        r"(?i)maintenance",
        ErrorCode::ServerMaintenance,
        "Scheduled maintenance",
    ),
    (
        r"(?i)\b50[234]\b|service\s+unavailable|bad\s+gateway|gateway\s+timeout",
        ErrorCode::ServerUnavailable,
        "Server unavailable",
    ),
    (
        r"(?i)\b5\d{2}\b|internal\s+server\s+error",
        ErrorCode::ServerInternalError,
        "Server-side failure",
    ),
    // Token
    (
        r"(?i)(token|jwt|session)\s*(has\s+)?expired|\bexp(ired)?\s+claim",
        ErrorCode::TokenExpired,
        "Token past expiry",
    ),
    (
        r"(?i)(malformed|invalid|corrupt(ed)?)\s+(jwt|token|payload)|jwt\s+malformed|unexpected\s+token",
        ErrorCode::TokenMalformed,
        "Token payload could not be decoded",
    ),
    (
        r"(?i)(no|missing)\s+(refresh\s+|access\s+)?token|token\s+(not\s+found|missing)",
        ErrorCode::TokenMissing,
        "Token absent",
    ),
    (
        r"(?i)token\s+(was\s+|has\s+been\s+)?revoked",
        ErrorCode::TokenRevoked,
        "Token revoked by server",
    ),
    (
        r"(?i)refresh\s+(token\s+)?failed",
        ErrorCode::TokenRefreshFailed,
        "Refresh call failed",
    ),
    // Authentication
    (
        r"(?i)account\s+(is\s+)?locked",
        ErrorCode::AuthAccountLocked,
        "Account locked",
    ),
    (
        r"(?i)account\s+(is\s+)?(disabled|deactivated|suspended)",
        ErrorCode::AuthAccountDisabled,
        "Account disabled",
    ),
    (
        r"(?i)invalid\s+(credentials|password|username|email\s+or\s+password)|incorrect\s+password|\b401\b|unauthori[sz]ed",
        ErrorCode::AuthInvalidCredentials,
        "Credentials rejected",
    ),
    // Authorization
    (
        r"(?i)insufficient\s+scope|scope\s+required",
        ErrorCode::AuthzInsufficientScope,
        "Missing scope",
    ),
    (
        r"(?i)\b403\b|forbidden|permission\s+denied|access\s+denied",
        ErrorCode::AuthzForbidden,
        "Forbidden",
    ),
    // Validation
    (
        r"(?i)(missing|required)\s+(required\s+)?fields?|is\s+required",
        ErrorCode::ValidationMissingFields,
        "Required fields missing",
    ),
    (
        r"(?i)password\s+(is\s+)?too\s+(short|weak)|password\s+policy",
        ErrorCode::ValidationPasswordPolicy,
        "Password policy violation",
    ),
    (
        r"(?i)invalid\s+(format|email|input)|\b(400|422)\b",
        ErrorCode::ValidationInvalidFormat,
        "Malformed input",
    ),
];

/// Turns raw failures into [`ClassifiedError`]s.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    patterns: Vec<ErrorPattern>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Creates a classifier with the built-in pattern table.
    pub fn new() -> Self {
        Self {
            patterns: Self::default_patterns(),
        }
    }

    /// Creates a classifier with only the given patterns.
    pub fn with_patterns(patterns: Vec<ErrorPattern>) -> Self {
        Self { patterns }
    }

    fn default_patterns() -> Vec<ErrorPattern> {
        DEFAULT_PATTERNS
            .iter()
            .filter_map(|(source, code, description)| {
                match ErrorPattern::new(source, *code, *description) {
                    Ok(pattern) => Some(pattern),
                    Err(error) => {
                        tracing::warn!(pattern = *source, %error, "skipping invalid error pattern");
                        None
                    }
                }
            })
            .collect()
    }

    /// Appends a pattern. It is consulted after the existing ones.
    pub fn add_pattern(&mut self, pattern: ErrorPattern) {
        self.patterns.push(pattern);
    }

    /// Number of patterns consulted for free-form text.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Classifies a raw failure.
    ///
    /// Already-classified errors are returned unchanged. Everything else gets
    /// its code from the structured signal or the pattern table, the taxonomy
    /// metadata for that code, and `context` if supplied.
    pub fn classify(&self, raw: impl Into<RawFailure>, context: Option<&str>) -> ClassifiedError {
        let raw = match raw.into() {
            RawFailure::Classified(error) => return error,
            other => other,
        };

        let original = raw.to_string();
        let (code, matched) = self.code_for(&raw);
        let mut error =
            ClassifiedError::new(code, describe(code, &raw)).with_original_error(original);

        match &raw {
            RawFailure::Http { status, .. } => {
                error = error.with_debug_info("status", status.to_string());
            }
            RawFailure::MissingFields(fields) if !fields.is_empty() => {
                error = error.with_debug_info("fields", fields.join(","));
            }
            _ => {}
        }
        if let Some(hit) = matched {
            error = error
                .with_debug_info("matched_pattern", hit.matched)
                .with_debug_info("matched_rule", hit.pattern.description());
        }
        if let Some(context) = context {
            error = error.with_context(context);
        }

        tracing::debug!(
            code = %error.code(),
            category = %error.category(),
            retryable = error.is_retryable(),
            context = context.unwrap_or(""),
            "classified failure"
        );
        error
    }

    /// Classifies free-form text. Returns `None` if no pattern matches.
    pub fn classify_text(&self, text: &str) -> Option<(ErrorCode, String)> {
        self.find_pattern(text)
            .map(|hit| (hit.pattern.code(), hit.matched.to_string()))
    }

    fn find_pattern<'a>(&'a self, text: &'a str) -> Option<PatternHit<'a>> {
        self.patterns.iter().find_map(|pattern| {
            pattern
                .find(text)
                .map(|matched| PatternHit { pattern, matched })
        })
    }

    fn code_for<'a>(&'a self, raw: &'a RawFailure) -> (ErrorCode, Option<PatternHit<'a>>) {
        match raw {
            RawFailure::Offline => (ErrorCode::NetworkOffline, None),
            RawFailure::Timeout(_) | RawFailure::Aborted => (ErrorCode::NetworkTimeout, None),
            RawFailure::Transport(text) => match self.find_pattern(text) {
                Some(hit) if hit.code().category() == ErrorCategory::Network => {
                    (hit.code(), Some(hit))
                }
                _ => (ErrorCode::NetworkConnectionFailed, None),
            },
            RawFailure::Http { status, body } => self.code_for_status(*status, body),
            RawFailure::MalformedToken(_) => (ErrorCode::TokenMalformed, None),
            RawFailure::MissingToken => (ErrorCode::TokenMissing, None),
            RawFailure::ExpiredToken => (ErrorCode::TokenExpired, None),
            RawFailure::InvalidCredentials(_) => (ErrorCode::AuthInvalidCredentials, None),
            RawFailure::AccountLocked => (ErrorCode::AuthAccountLocked, None),
            RawFailure::AccountDisabled => (ErrorCode::AuthAccountDisabled, None),
            RawFailure::MissingFields(_) => (ErrorCode::ValidationMissingFields, None),
            RawFailure::Message(text) => match self.find_pattern(text) {
                Some(hit) => (hit.code(), Some(hit)),
                None => (ErrorCode::UnknownError, None),
            },
            RawFailure::Classified(error) => (error.code(), None),
        }
    }

    fn code_for_status<'a>(
        &'a self,
        status: u16,
        body: &'a str,
    ) -> (ErrorCode, Option<PatternHit<'a>>) {
        let from_body = || self.find_pattern(body);
        match status {
            400 | 422 => match from_body() {
                Some(hit) if hit.code().category() == ErrorCategory::Validation => {
                    (hit.code(), Some(hit))
                }
                _ if status == 422 => (ErrorCode::ValidationMissingFields, None),
                _ => (ErrorCode::ValidationInvalidFormat, None),
            },
            // 401 bodies distinguish an expired/invalid token from bad credentials.
            401 => match from_body() {
                Some(hit)
                    if matches!(
                        hit.code().category(),
                        ErrorCategory::Token | ErrorCategory::Authentication
                    ) =>
                {
                    (hit.code(), Some(hit))
                }
                _ => (ErrorCode::AuthInvalidCredentials, None),
            },
            403 => match from_body() {
                Some(hit)
                    if matches!(
                        hit.code(),
                        ErrorCode::AuthAccountLocked
                            | ErrorCode::AuthAccountDisabled
                            | ErrorCode::AuthzInsufficientScope
                    ) =>
                {
                    (hit.code(), Some(hit))
                }
                _ => (ErrorCode::AuthzForbidden, None),
            },
            408 => (ErrorCode::NetworkTimeout, None),
            423 => (ErrorCode::AuthAccountLocked, None),
            429 => (ErrorCode::ServerRateLimited, None),
            502..=504 => match from_body() {
                Some(hit) if hit.code() == ErrorCode::ServerMaintenance => {
                    (ErrorCode::ServerMaintenance, Some(hit))
                }
                _ => (ErrorCode::ServerUnavailable, None),
            },
            500..=599 => (ErrorCode::ServerInternalError, None),
            _ => match from_body() {
                Some(hit) => (hit.code(), Some(hit)),
                None => (ErrorCode::UnknownError, None),
            },
        }
    }
}

/// A pattern together with the text it matched.
struct PatternHit<'a> {
    pattern: &'a ErrorPattern,
    matched: &'a str,
}

impl PatternHit<'_> {
    fn code(&self) -> ErrorCode {
        self.pattern.code()
    }
}

fn describe(code: ErrorCode, raw: &RawFailure) -> String {
    match raw {
        RawFailure::Message(text) | RawFailure::Transport(text) if !text.is_empty() => {
            text.clone()
        }
        RawFailure::Http { status, .. } => {
            format!("{} (HTTP {})", code.metadata().title, status)
        }
        _ => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    #[test]
    fn test_default_patterns_all_compile() {
        let classifier = ErrorClassifier::new();
        assert_eq!(classifier.pattern_count(), DEFAULT_PATTERNS.len());
    }

    #[test]
    fn test_already_classified_passes_through_unchanged() {
        let classifier = ErrorClassifier::new();
        let first = classifier.classify("request timed out", Some("tokenRefresh"));
        let second = classifier.classify(first.clone(), Some("login"));
        assert_eq!(first, second);
        assert_eq!(second.context(), Some("tokenRefresh"));
    }

    #[test]
    fn test_structured_signals() {
        let classifier = ErrorClassifier::new();
        let cases = vec![
            (RawFailure::Offline, ErrorCode::NetworkOffline),
            (RawFailure::transport("socket hang up"), ErrorCode::NetworkConnectionFailed),
            (RawFailure::timeout("5s elapsed"), ErrorCode::NetworkTimeout),
            (RawFailure::Aborted, ErrorCode::NetworkTimeout),
            (RawFailure::MalformedToken("bad base64".into()), ErrorCode::TokenMalformed),
            (RawFailure::MissingToken, ErrorCode::TokenMissing),
            (RawFailure::ExpiredToken, ErrorCode::TokenExpired),
            (RawFailure::InvalidCredentials("nope".into()), ErrorCode::AuthInvalidCredentials),
            (RawFailure::AccountLocked, ErrorCode::AuthAccountLocked),
            (RawFailure::AccountDisabled, ErrorCode::AuthAccountDisabled),
            (
                RawFailure::MissingFields(vec!["email".into()]),
                ErrorCode::ValidationMissingFields,
            ),
        ];

        for (raw, expected) in cases {
            let label = raw.to_string();
            let error = classifier.classify(raw, None);
            assert_eq!(error.code(), expected, "wrong code for {label}");
            assert_eq!(error.category(), expected.category());
        }
    }

    #[test]
    fn test_http_statuses() {
        let classifier = ErrorClassifier::new();
        let cases = [
            (400, "", ErrorCode::ValidationInvalidFormat),
            (422, "", ErrorCode::ValidationMissingFields),
            (401, "", ErrorCode::AuthInvalidCredentials),
            (401, "jwt expired", ErrorCode::TokenExpired),
            (401, "jwt malformed", ErrorCode::TokenMalformed),
            (403, "", ErrorCode::AuthzForbidden),
            (403, "account is locked", ErrorCode::AuthAccountLocked),
            (408, "", ErrorCode::NetworkTimeout),
            (423, "", ErrorCode::AuthAccountLocked),
            (429, "", ErrorCode::ServerRateLimited),
            (500, "", ErrorCode::ServerInternalError),
            (503, "", ErrorCode::ServerUnavailable),
            (503, "down for maintenance", ErrorCode::ServerMaintenance),
            (507, "", ErrorCode::ServerInternalError),
            (418, "", ErrorCode::UnknownError),
        ];

        for (status, body, expected) in cases {
            let error = classifier.classify(RawFailure::http(status, body), None);
            assert_eq!(error.code(), expected, "status {status} body {body:?}");
            assert_eq!(
                error.debug_info().get("status"),
                Some(&status.to_string())
            );
        }
    }

    #[test]
    fn test_text_patterns() {
        let classifier = ErrorClassifier::new();
        let cases = [
            ("You appear to be offline", ErrorCode::NetworkOffline),
            ("TypeError: Failed to fetch", ErrorCode::NetworkConnectionFailed),
            ("The operation was aborted", ErrorCode::NetworkTimeout),
            ("Too many requests, slow down", ErrorCode::ServerRateLimited),
            ("Token has expired", ErrorCode::TokenExpired),
            ("No refresh token", ErrorCode::TokenMissing),
            ("Invalid credentials", ErrorCode::AuthInvalidCredentials),
            ("Account is disabled", ErrorCode::AuthAccountDisabled),
            ("Permission denied", ErrorCode::AuthzForbidden),
            ("email is required", ErrorCode::ValidationMissingFields),
        ];

        for (text, expected) in cases {
            assert_eq!(classifier.classify(text, None).code(), expected, "{text}");
        }
    }

    #[test]
    fn test_unrecognized_text_is_unknown() {
        let classifier = ErrorClassifier::new();
        let error = classifier.classify("the flux capacitor overheated", Some("login"));
        assert_eq!(error.code(), ErrorCode::UnknownError);
        assert_eq!(error.category(), ErrorCategory::Unknown);
        assert_eq!(error.context(), Some("login"));
        assert_eq!(error.message(), "the flux capacitor overheated");
    }

    #[test]
    fn test_empty_input_never_panics() {
        let classifier = ErrorClassifier::new();
        let error = classifier.classify("", None);
        assert_eq!(error.code(), ErrorCode::UnknownError);
    }

    #[test]
    fn test_transport_text_only_refines_within_network() {
        let classifier = ErrorClassifier::new();
        let offline = classifier.classify(RawFailure::transport("network is unreachable"), None);
        assert_eq!(offline.code(), ErrorCode::NetworkOffline);

        // A server-looking message on a transport failure stays a network failure.
        let transport = classifier.classify(RawFailure::transport("internal server error"), None);
        assert_eq!(transport.code(), ErrorCode::NetworkConnectionFailed);
    }

    #[test]
    fn test_custom_pattern_is_consulted_last() {
        let mut classifier = ErrorClassifier::with_patterns(Vec::new());
        classifier.add_pattern(
            ErrorPattern::new(r"(?i)kaboom", ErrorCode::InternalError, "custom").unwrap(),
        );
        let error = classifier.classify("KABOOM in reducer", None);
        assert_eq!(error.code(), ErrorCode::InternalError);
        assert_eq!(
            error.debug_info().get("matched_pattern").map(String::as_str),
            Some("KABOOM")
        );
        assert_eq!(
            error.debug_info().get("matched_rule").map(String::as_str),
            Some("custom")
        );
    }

    #[test]
    fn test_http_body_match_reports_rule() {
        let error = ErrorClassifier::new().classify(RawFailure::http(401, "jwt expired"), None);
        assert_eq!(error.code(), ErrorCode::TokenExpired);
        assert_eq!(
            error.debug_info().get("matched_rule").map(String::as_str),
            Some("Token past expiry")
        );

        let plain = ErrorClassifier::new().classify(RawFailure::Offline, None);
        assert!(plain.debug_info().get("matched_rule").is_none());
    }

    #[test]
    fn test_invalid_custom_pattern_is_an_error() {
        assert!(ErrorPattern::new("(unclosed", ErrorCode::InternalError, "bad").is_err());
    }

    #[test]
    fn test_original_error_is_kept() {
        let classifier = ErrorClassifier::new();
        let error = classifier.classify(RawFailure::http(503, "upstream down"), None);
        assert_eq!(error.original_error(), Some("HTTP 503: upstream down"));
    }
}
