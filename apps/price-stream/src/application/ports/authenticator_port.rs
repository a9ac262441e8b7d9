//! Authenticator Port (Driver Port)
//!
//! Identity verification happens outside the price core; the stream
//! endpoint only needs to know who the caller is.

use async_trait::async_trait;

/// Verified caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Login name, used to key per-user rate limits.
    pub login: String,
}

impl Identity {
    /// Create an identity for `login`.
    #[must_use]
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
        }
    }
}

/// Authentication error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No credentials were presented.
    #[error("missing credentials")]
    MissingCredentials,

    /// Credentials were malformed.
    #[error("malformed credentials: {reason}")]
    Malformed {
        /// What was wrong.
        reason: String,
    },

    /// Credentials did not match any known identity.
    #[error("invalid credentials")]
    InvalidCredentials,
}

/// Port for resolving a bearer token to an identity.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `token` and return the caller it belongs to.
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError>;
}
