//! Credential abstractions consumed by the authentication policies.
//!
//! Token acquisition internals (interactive flows, refresh, caching) live
//! behind [`TokenCredential`] in external credential crates; this module
//! only defines the seam and a static implementation for tests and
//! pre-acquired tokens.

use crate::error::Error;
use async_trait::async_trait;

/// An access token obtained from a credential.
#[derive(Clone, Debug)]
pub struct AccessToken {
    /// The bearer token string.
    pub token: String,
    /// Seconds until expiry from when the token was issued, when known.
    pub expires_in_secs: Option<u64>,
}

/// A source of bearer tokens for a set of scopes.
///
/// The bearer policy calls [`get_token`](TokenCredential::get_token) before
/// every attempt and again on a 401; implementations are expected to cache
/// and refresh internally as appropriate.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[&str]) -> Result<AccessToken, Error>;
}

/// A credential wrapping a pre-acquired token that never refreshes.
pub struct StaticTokenCredential {
    token: String,
}

impl StaticTokenCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scopes: &[&str]) -> Result<AccessToken, Error> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_in_secs: None,
        })
    }
}
