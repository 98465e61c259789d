//! Authentication service implementing the [`AuthService`] driving port.
//!
//! Refresh tokens are single-use: each successful login or refresh stores the
//! SHA-256 fingerprint of the new refresh token, replacing the previous one,
//! so an older refresh token is rejected even while its signature is valid.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mockable::Clock;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::domain::ports::{
    AuthService, PasswordHashError, PasswordHasher, RefreshTokenStore, RefreshTokenStoreError,
    TokenError, TokenIssuer, UserPersistenceError, UserRepository,
};
use crate::domain::{
    EmailAddress, Error, LoginCredentials, NewPassword, Principal, Registration, Role, TokenKind,
    TokenPair, User, UserAccount, UserId, Username,
};

const INVALID_CREDENTIALS: &str = "invalid credentials";

/// Hex SHA-256 digest of a refresh token as stored in Redis.
///
/// # Examples
/// ```
/// use vk_monitor::domain::refresh_fingerprint;
///
/// let fingerprint = refresh_fingerprint("token");
/// assert_eq!(fingerprint.len(), 64);
/// assert_eq!(fingerprint, refresh_fingerprint("token"));
/// ```
pub fn refresh_fingerprint(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn map_user_error(error: UserPersistenceError) -> Error {
    match error {
        UserPersistenceError::Connection { message } => {
            Error::service_unavailable(format!("user repository unavailable: {message}"))
        }
        UserPersistenceError::Query { message } => {
            Error::internal(format!("user repository error: {message}"))
        }
        UserPersistenceError::Conflict { .. } => {
            Error::conflict("username or email is already registered")
        }
    }
}

fn map_hash_error(error: PasswordHashError) -> Error {
    Error::internal(error.to_string())
}

fn map_store_error(error: RefreshTokenStoreError) -> Error {
    match error {
        RefreshTokenStoreError::Connection { message } => {
            Error::service_unavailable(format!("refresh token store unavailable: {message}"))
        }
        RefreshTokenStoreError::Query { message } => {
            Error::internal(format!("refresh token store error: {message}"))
        }
    }
}

fn map_token_error(error: TokenError) -> Error {
    match error {
        TokenError::Signing { message } => Error::internal(format!("token signing failed: {message}")),
        other => Error::unauthorized(other.to_string()),
    }
}

/// Account and token use-cases backed by driven ports.
#[derive(Clone)]
pub struct AuthenticationService<U, H, T, S> {
    users: Arc<U>,
    hasher: Arc<H>,
    tokens: Arc<T>,
    refresh_store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<U, H, T, S> AuthenticationService<U, H, T, S> {
    /// Wire the service to its ports.
    pub fn new(
        users: Arc<U>,
        hasher: Arc<H>,
        tokens: Arc<T>,
        refresh_store: Arc<S>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            refresh_store,
            clock,
        }
    }
}

impl<U, H, T, S> AuthenticationService<U, H, T, S>
where
    U: UserRepository,
    H: PasswordHasher,
    T: TokenIssuer,
    S: RefreshTokenStore,
{
    async fn load_account(&self, user_id: &UserId) -> Result<Option<UserAccount>, Error> {
        self.users.find_by_id(user_id).await.map_err(map_user_error)
    }

    async fn issue_pair(&self, principal: &Principal) -> Result<TokenPair, Error> {
        let now = self.clock.utc();
        let access = self
            .tokens
            .issue(principal, TokenKind::Access, now)
            .map_err(map_token_error)?;
        let refresh = self
            .tokens
            .issue(principal, TokenKind::Refresh, now)
            .map_err(map_token_error)?;

        self.refresh_store
            .store(
                &principal.user_id,
                &refresh_fingerprint(&refresh.token),
                Duration::from_secs(refresh.ttl_secs),
            )
            .await
            .map_err(map_store_error)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer".to_owned(),
            expires_in: access.ttl_secs,
            expires_at: access.expires_at,
        })
    }

    async fn create_account(
        &self,
        username: Username,
        email: EmailAddress,
        password: &NewPassword,
        role: Role,
    ) -> Result<User, Error> {
        let password_hash = self
            .hasher
            .hash(password.expose())
            .await
            .map_err(map_hash_error)?;
        let user = User::new(UserId::random(), username, email, role, self.clock.utc());
        let account = UserAccount {
            user: user.clone(),
            password_hash,
        };
        self.users.create(&account).await.map_err(map_user_error)?;
        Ok(user)
    }

    /// Create the configured admin account unless the username is taken.
    ///
    /// Returns `true` when an account was created.
    pub async fn ensure_admin(
        &self,
        username: Username,
        email: EmailAddress,
        password: NewPassword,
    ) -> Result<bool, Error> {
        if let Some(existing) = self
            .users
            .find_by_login(username.as_str())
            .await
            .map_err(map_user_error)?
        {
            if existing.user.role() != Role::Admin {
                warn!(
                    username = %username,
                    "admin bootstrap skipped: username belongs to a non-admin account"
                );
            }
            return Ok(false);
        }
        let user = self
            .create_account(username, email, &password, Role::Admin)
            .await?;
        info!(user_id = %user.id(), "bootstrapped admin account");
        Ok(true)
    }
}

#[async_trait]
impl<U, H, T, S> AuthService for AuthenticationService<U, H, T, S>
where
    U: UserRepository,
    H: PasswordHasher,
    T: TokenIssuer,
    S: RefreshTokenStore,
{
    async fn register(&self, registration: Registration) -> Result<User, Error> {
        let Registration {
            username,
            email,
            password,
        } = registration;
        let user = self
            .create_account(username, email, &password, Role::User)
            .await?;
        info!(user_id = %user.id(), username = %user.username(), "registered user");
        Ok(user)
    }

    async fn login(&self, credentials: &LoginCredentials) -> Result<TokenPair, Error> {
        let Some(account) = self
            .users
            .find_by_login(credentials.login())
            .await
            .map_err(map_user_error)?
        else {
            return Err(Error::unauthorized(INVALID_CREDENTIALS));
        };

        let verified = self
            .hasher
            .verify(credentials.password(), &account.password_hash)
            .await
            .map_err(map_hash_error)?;
        if !verified {
            warn!(user_id = %account.user.id(), "login rejected: password mismatch");
            return Err(Error::unauthorized(INVALID_CREDENTIALS));
        }

        let principal = Principal {
            user_id: account.user.id(),
            role: account.user.role(),
        };
        let pair = self.issue_pair(&principal).await?;
        info!(user_id = %principal.user_id, "user logged in");
        Ok(pair)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let claimed = self
            .tokens
            .verify(refresh_token, TokenKind::Refresh)
            .map_err(map_token_error)?;

        let stored = self
            .refresh_store
            .fetch(&claimed.user_id)
            .await
            .map_err(map_store_error)?;
        if stored.as_deref() != Some(refresh_fingerprint(refresh_token).as_str()) {
            warn!(user_id = %claimed.user_id, "refresh rejected: token is not the active one");
            return Err(Error::unauthorized("refresh token has been revoked"));
        }

        let account = self
            .load_account(&claimed.user_id)
            .await?
            .ok_or_else(|| Error::unauthorized("account no longer exists"))?;
        let principal = Principal {
            user_id: account.user.id(),
            role: account.user.role(),
        };
        self.issue_pair(&principal).await
    }

    async fn logout(&self, user_id: &UserId) -> Result<(), Error> {
        self.refresh_store
            .revoke(user_id)
            .await
            .map_err(map_store_error)?;
        info!(user_id = %user_id, "user logged out");
        Ok(())
    }

    async fn me(&self, user_id: &UserId) -> Result<User, Error> {
        self.load_account(user_id)
            .await?
            .map(|account| account.user)
            .ok_or_else(|| Error::not_found("user not found"))
    }

    async fn change_password(
        &self,
        user_id: &UserId,
        current_password: &str,
        new_password: NewPassword,
    ) -> Result<(), Error> {
        let account = self
            .load_account(user_id)
            .await?
            .ok_or_else(|| Error::not_found("user not found"))?;
        let verified = self
            .hasher
            .verify(current_password, &account.password_hash)
            .await
            .map_err(map_hash_error)?;
        if !verified {
            return Err(Error::unauthorized("current password is incorrect"));
        }

        let password_hash = self
            .hasher
            .hash(new_password.expose())
            .await
            .map_err(map_hash_error)?;
        self.users
            .update_password(user_id, &password_hash, self.clock.utc())
            .await
            .map_err(map_user_error)?;
        self.refresh_store
            .revoke(user_id)
            .await
            .map_err(map_store_error)?;
        info!(user_id = %user_id, "password changed");
        Ok(())
    }

    fn authenticate(&self, access_token: &str) -> Result<Principal, Error> {
        self.tokens
            .verify(access_token, TokenKind::Access)
            .map_err(map_token_error)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::{
        IssuedToken, MockPasswordHasher, MockRefreshTokenStore, MockTokenIssuer,
        MockUserRepository,
    };
    use crate::domain::test_fixtures::{account, fixture_clock, fixture_timestamp};
    use mockall::predicate::{always, eq};

    type Service = AuthenticationService<
        MockUserRepository,
        MockPasswordHasher,
        MockTokenIssuer,
        MockRefreshTokenStore,
    >;

    struct Mocks {
        users: MockUserRepository,
        hasher: MockPasswordHasher,
        tokens: MockTokenIssuer,
        store: MockRefreshTokenStore,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                users: MockUserRepository::new(),
                hasher: MockPasswordHasher::new(),
                tokens: MockTokenIssuer::new(),
                store: MockRefreshTokenStore::new(),
            }
        }

        fn into_service(self) -> Service {
            AuthenticationService::new(
                Arc::new(self.users),
                Arc::new(self.hasher),
                Arc::new(self.tokens),
                Arc::new(self.store),
                fixture_clock(),
            )
        }
    }

    fn issue_by_kind(tokens: &mut MockTokenIssuer) {
        tokens.expect_issue().returning(|_, kind, now| {
            Ok(IssuedToken {
                token: format!("{}-token", kind.as_str()),
                expires_at: now,
                ttl_secs: 60,
            })
        });
    }

    fn credentials() -> LoginCredentials {
        LoginCredentials::try_from_parts("alice", "correct horse").expect("credentials")
    }

    #[tokio::test]
    async fn login_with_wrong_password_issues_no_tokens() {
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_login()
            .returning(|_| Ok(Some(account(UserId::random(), "alice", Role::User))));
        mocks.hasher.expect_verify().returning(|_, _| Ok(false));
        mocks.tokens.expect_issue().times(0);
        mocks.store.expect_store().times(0);

        let err = mocks
            .into_service()
            .login(&credentials())
            .await
            .expect_err("wrong password");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn login_with_unknown_user_is_unauthorized() {
        let mut mocks = Mocks::new();
        mocks.users.expect_find_by_login().returning(|_| Ok(None));
        mocks.hasher.expect_verify().times(0);

        let err = mocks
            .into_service()
            .login(&credentials())
            .await
            .expect_err("unknown user");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
        assert_eq!(err.message(), INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn login_stores_refresh_fingerprint() {
        let user_id = UserId::random();
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_login()
            .returning(move |_| Ok(Some(account(user_id, "alice", Role::Admin))));
        mocks.hasher.expect_verify().returning(|_, _| Ok(true));
        issue_by_kind(&mut mocks.tokens);
        mocks
            .store
            .expect_store()
            .withf(move |id, fingerprint, ttl| {
                *id == user_id
                    && fingerprint == refresh_fingerprint("refresh-token")
                    && *ttl == Duration::from_secs(60)
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pair = mocks
            .into_service()
            .login(&credentials())
            .await
            .expect("login succeeds");
        assert_eq!(pair.access_token, "access-token");
        assert_eq!(pair.refresh_token, "refresh-token");
        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_at, fixture_timestamp());
    }

    #[tokio::test]
    async fn refresh_rejects_mismatched_fingerprint() {
        let user_id = UserId::random();
        let mut mocks = Mocks::new();
        mocks.tokens.expect_verify().returning(move |_, _| {
            Ok(Principal {
                user_id,
                role: Role::User,
            })
        });
        mocks
            .store
            .expect_fetch()
            .returning(|_| Ok(Some(refresh_fingerprint("a-newer-token"))));
        mocks.tokens.expect_issue().times(0);

        let err = mocks
            .into_service()
            .refresh("stale-token")
            .await
            .expect_err("stale token");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn refresh_rejects_missing_fingerprint() {
        let mut mocks = Mocks::new();
        mocks.tokens.expect_verify().returning(|_, _| {
            Ok(Principal {
                user_id: UserId::random(),
                role: Role::User,
            })
        });
        mocks.store.expect_fetch().returning(|_| Ok(None));

        let err = mocks
            .into_service()
            .refresh("token")
            .await
            .expect_err("revoked");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn refresh_rotates_matching_token() {
        let user_id = UserId::random();
        let mut mocks = Mocks::new();
        mocks.tokens.expect_verify().returning(move |_, _| {
            Ok(Principal {
                user_id,
                role: Role::User,
            })
        });
        mocks
            .store
            .expect_fetch()
            .returning(|_| Ok(Some(refresh_fingerprint("current"))));
        mocks
            .users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(account(user_id, "alice", Role::User))));
        issue_by_kind(&mut mocks.tokens);
        mocks
            .store
            .expect_store()
            .with(eq(user_id), always(), always())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let pair = mocks
            .into_service()
            .refresh("current")
            .await
            .expect("rotation");
        assert_eq!(pair.refresh_token, "refresh-token");
    }

    #[tokio::test]
    async fn expired_access_token_is_unauthorized() {
        let mut mocks = Mocks::new();
        mocks
            .tokens
            .expect_verify()
            .returning(|_, _| Err(TokenError::expired()));
        let err = mocks
            .into_service()
            .authenticate("token")
            .expect_err("expired");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn register_maps_duplicate_to_conflict() {
        let mut mocks = Mocks::new();
        mocks
            .hasher
            .expect_hash()
            .returning(|_| Ok("$argon2id$hash".to_owned()));
        mocks
            .users
            .expect_create()
            .returning(|_| Err(UserPersistenceError::conflict("users_username_key")));

        let registration =
            Registration::try_from_parts("alice", "alice@example.com", "long enough")
                .expect("registration");
        let err = mocks
            .into_service()
            .register(registration)
            .await
            .expect_err("duplicate");
        assert_eq!(err.code(), ErrorCode::Conflict);
    }

    #[tokio::test]
    async fn change_password_revokes_refresh_token() {
        let user_id = UserId::random();
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_id()
            .returning(move |_| Ok(Some(account(user_id, "alice", Role::User))));
        mocks.hasher.expect_verify().returning(|_, _| Ok(true));
        mocks
            .hasher
            .expect_hash()
            .returning(|_| Ok("$argon2id$new".to_owned()));
        mocks
            .users
            .expect_update_password()
            .withf(|_, hash, _| hash == "$argon2id$new")
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks
            .store
            .expect_revoke()
            .with(eq(user_id))
            .times(1)
            .returning(|_| Ok(()));

        let new_password = NewPassword::new("another secret").expect("policy");
        mocks
            .into_service()
            .change_password(&user_id, "old secret", new_password)
            .await
            .expect("password changed");
    }

    #[tokio::test]
    async fn ensure_admin_skips_existing_account() {
        let mut mocks = Mocks::new();
        mocks
            .users
            .expect_find_by_login()
            .returning(|_| Ok(Some(account(UserId::random(), "root", Role::Admin))));
        mocks.users.expect_create().times(0);

        let created = mocks
            .into_service()
            .ensure_admin(
                Username::new("root").expect("username"),
                EmailAddress::new("root@example.com").expect("email"),
                NewPassword::new("admin-password").expect("password"),
            )
            .await
            .expect("bootstrap");
        assert!(!created);
    }
}
