//! Port for signing and verifying bearer tokens.
use chrono::{DateTime, Utc};

use crate::domain::{Principal, TokenKind};

use super::define_port_error;

define_port_error! {
    /// Token failures. Everything except `Signing` means "reject the caller".
    pub enum TokenError {
        /// Signature, shape or claim check failed.
        Invalid { message: String } => "token is invalid: {message}",
        /// `exp` is in the past.
        Expired => "token has expired",
        /// An access token was presented where a refresh token was expected, or vice versa.
        WrongKind { expected: String } => "expected a {expected} token",
        /// Token could not be produced.
        Signing { message: String } => "token signing failed: {message}",
    }
}

/// Signed token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    /// Compact JWS.
    pub token: String,
    /// `exp` claim.
    pub expires_at: DateTime<Utc>,
    /// Lifetime in seconds.
    pub ttl_secs: u64,
}

#[cfg_attr(test, mockall::automock)]
pub trait TokenIssuer: Send + Sync {
    /// Sign a token of `kind` for `principal`.
    fn issue(
        &self,
        principal: &Principal,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError>;

    /// Verify a token and require it to be of `kind`.
    fn verify(&self, token: &str, kind: TokenKind) -> Result<Principal, TokenError>;
}
