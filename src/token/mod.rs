//! Access-token refresh on top of the feedback orchestrator.
//!
//! The store and the transport are collaborators supplied by the embedding
//! application. This module never inspects token contents beyond expiry.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClassifiedError, RawFailure};
use crate::feedback::{AuthOperation, ExecuteOptions, FeedbackOrchestrator};

/// Default window before expiry in which a token is refreshed proactively.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(60);

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

// Tokens are secrets; keep them out of logs.
impl std::fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Absolute expiry of the access token.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Tokens without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }

    /// True if the token expires within `skew` of `now`. A skew reaching past
    /// the representable date range always asks for a refresh.
    pub fn needs_refresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        chrono::Duration::from_std(skew)
            .ok()
            .and_then(|skew| now.checked_add_signed(skew))
            .map_or(true, |deadline| deadline >= expires_at)
    }
}

/// Where the current tokens live.
pub trait TokenStore: Send + Sync {
    /// Current tokens, if signed in.
    fn get(&self) -> Option<AuthTokens>;
    /// Replaces the stored tokens.
    fn set(&self, tokens: AuthTokens);
    /// Forgets all tokens, forcing a new sign-in.
    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<Option<AuthTokens>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: AuthTokens) -> Self {
        Self {
            tokens: RwLock::new(Some(tokens)),
        }
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self) -> Option<AuthTokens> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, tokens: AuthTokens) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Some(tokens);
    }

    fn clear(&self) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// The network call that exchanges a refresh token for new tokens.
#[async_trait]
pub trait RefreshTransport: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, RawFailure>;
}

/// Refreshes tokens through the orchestrator under a single-flight key.
#[derive(Clone)]
pub struct TokenRefresher {
    orchestrator: FeedbackOrchestrator,
    store: Arc<dyn TokenStore>,
    transport: Arc<dyn RefreshTransport>,
    operation: String,
    skew: Duration,
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("operation", &self.operation)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

impl TokenRefresher {
    pub fn new(
        orchestrator: FeedbackOrchestrator,
        store: Arc<dyn TokenStore>,
        transport: Arc<dyn RefreshTransport>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            transport,
            operation: AuthOperation::TokenRefresh.to_string(),
            skew: DEFAULT_REFRESH_SKEW,
        }
    }

    /// Single-flight key and feedback name for refreshes.
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Refresh tokens this long before they expire.
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Exchanges the stored refresh token for new tokens and stores them.
    ///
    /// Concurrent calls share one network exchange. If the response carries
    /// no refresh token, the previous one is kept. A terminal error that
    /// requires the user to sign in again clears the store.
    pub async fn refresh(&self, options: ExecuteOptions) -> Result<AuthTokens, ClassifiedError> {
        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);

        let task = move || {
            let store = Arc::clone(&store);
            let transport = Arc::clone(&transport);
            async move {
                let Some(refresh_token) = store.get().and_then(|tokens| tokens.refresh_token)
                else {
                    return Err(RawFailure::MissingToken);
                };
                let mut tokens = transport.refresh(&refresh_token).await?;
                if tokens.refresh_token.is_none() {
                    tokens.refresh_token = Some(refresh_token);
                }
                store.set(tokens.clone());
                Ok::<_, RawFailure>(tokens)
            }
        };

        let result = self.orchestrator.execute(&self.operation, task, options).await;
        if let Err(error) = &result {
            if error.requires_reauthentication() {
                tracing::warn!(
                    operation = %self.operation,
                    code = %error.code(),
                    "clearing stored tokens, sign-in required"
                );
                self.store.clear();
            }
        }
        result
    }

    /// Returns the stored tokens, refreshing first if they are missing or
    /// expire within the configured skew.
    pub async fn refresh_if_needed(
        &self,
        now: DateTime<Utc>,
        options: ExecuteOptions,
    ) -> Result<AuthTokens, ClassifiedError> {
        match self.store.get() {
            Some(tokens) if !tokens.needs_refresh(now, self.skew) => Ok(tokens),
            _ => self.refresh(options).await,
        }
    }
}
