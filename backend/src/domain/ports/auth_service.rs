//! Driving port for registration, login and token use-cases.
//!
//! Inbound adapters call it to authenticate without importing the hashing,
//! signing or storage adapters, so handler tests can swap in a mock.

use async_trait::async_trait;

use crate::domain::{
    Error, LoginCredentials, NewPassword, Principal, Registration, TokenPair, User, UserId,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Create a `user` account.
    async fn register(&self, registration: Registration) -> Result<User, Error>;

    /// Verify credentials and issue a token pair.
    async fn login(&self, credentials: &LoginCredentials) -> Result<TokenPair, Error>;

    /// Exchange the active refresh token for a new pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error>;

    /// Revoke the stored refresh token.
    async fn logout(&self, user_id: &UserId) -> Result<(), Error>;

    /// Profile of the authenticated user.
    async fn me(&self, user_id: &UserId) -> Result<User, Error>;

    /// Replace the password after checking the current one.
    async fn change_password(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: NewPassword,
    ) -> Result<(), Error>;

    /// Verify a bearer access token.
    fn authenticate(&self, access_token: &str) -> Result<Principal, Error>;
}
