//! Authenticator adapters.
//!
//! Identity is owned by an external service; locally the stream endpoint
//! only has to map a presented bearer token to a login.

use async_trait::async_trait;

use crate::application::ports::{AuthError, Authenticator, Identity};
use crate::infrastructure::config::ApiTokens;

/// Authenticator backed by a fixed token table.
#[derive(Debug, Clone)]
pub struct StaticTokenAuthenticator {
    tokens: ApiTokens,
}

impl StaticTokenAuthenticator {
    /// Create an authenticator accepting `tokens`.
    #[must_use]
    pub const fn new(tokens: ApiTokens) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        self.tokens
            .login_for(token)
            .map(Identity::new)
            .ok_or(AuthError::InvalidCredentials)
    }
}
