//! Bearer-token identity verification
//!
//! Identity issuance is an external collaborator; the server only
//! validates a presented token and maps it to a user id. The shipped
//! verifier is a static token map for development and tests; a real
//! deployment plugs its provider behind the same trait.

use std::collections::HashMap;

use axum::http::HeaderMap;
use thiserror::Error;

use leseance::UserId;

/// Why a request's identity could not be established.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No bearer token was presented.
    #[error("missing bearer token")]
    MissingToken,

    /// The presented token did not verify.
    #[error("invalid identity token")]
    InvalidToken,
}

/// Maps a presented identity token to the owning user.
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token` and return the user it identifies.
    fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

/// Token-map verifier for development and tests.
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    /// Build from a `token -> user id` map.
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }

    /// Whether no token is configured (every request will be rejected).
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl IdentityVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        self.tokens
            .get(token)
            .map(|user| UserId::from_string(user.clone()))
            .ok_or(AuthError::InvalidToken)
    }
}

/// Extract the bearer token from standard auth headers.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authenticate a request from its headers.
pub fn authenticate(
    verifier: &dyn IdentityVerifier,
    headers: &HeaderMap,
) -> Result<UserId, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
    verifier.verify(token)
}
