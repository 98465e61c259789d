//! HS256 JSON Web Token adapter for the `TokenIssuer` port.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::ports::{IssuedToken, TokenError, TokenIssuer};
use crate::domain::{Principal, Role, TokenKind, UserId, UserValidationError};

/// Claims carried by every token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: String,
    typ: String,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Signing settings.
pub struct JwtConfig {
    /// Shared HMAC secret.
    pub secret: Zeroizing<String>,
    /// Access token lifetime.
    pub access_ttl: Duration,
    /// Refresh token lifetime.
    pub refresh_ttl: Duration,
}

/// Signs and verifies HS256 tokens with a shared secret.
pub struct JwtTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtTokenIssuer {
    /// Build an issuer from `config`.
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
        }
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| TokenError::signing(format!("timestamp {seconds} out of range")))
}

impl TokenIssuer for JwtTokenIssuer {
    fn issue(
        &self,
        principal: &Principal,
        kind: TokenKind,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let ttl_secs = self.ttl(kind).as_secs().max(1);
        let ttl = i64::try_from(ttl_secs).map_err(|err| TokenError::signing(err.to_string()))?;
        let iat = now.timestamp();
        let exp = iat.saturating_add(ttl);
        let claims = Claims {
            sub: principal.user_id.to_string(),
            role: principal.role.as_str().to_owned(),
            typ: kind.as_str().to_owned(),
            iat,
            exp,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::signing(err.to_string()))?;
        Ok(IssuedToken {
            token,
            expires_at: timestamp(exp)?,
            ttl_secs,
        })
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Principal, TokenError> {
        let data = decode::<Claims>(token, &self.decoding, &Self::validation()).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::expired(),
                _ => TokenError::invalid(err.to_string()),
            }
        })?;
        let claims = data.claims;
        if claims.typ != kind.as_str() {
            return Err(TokenError::wrong_kind(kind.as_str()));
        }
        let user_id = UserId::new(&claims.sub).map_err(|err| TokenError::invalid(err.to_string()))?;
        let role: Role = claims
            .role
            .parse()
            .map_err(|err: UserValidationError| TokenError::invalid(err.to_string()))?;
        Ok(Principal { user_id, role })
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rstest::{fixture, rstest};

    #[fixture]
    fn issuer() -> JwtTokenIssuer {
        JwtTokenIssuer::new(&JwtConfig {
            secret: Zeroizing::new("test-secret-with-enough-entropy".to_owned()),
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
        })
    }

    fn principal() -> Principal {
        Principal {
            user_id: UserId::random(),
            role: Role::Admin,
        }
    }

    #[rstest]
    #[case(TokenKind::Access, 900)]
    #[case(TokenKind::Refresh, 604_800)]
    fn issued_tokens_verify_as_their_kind(
        issuer: JwtTokenIssuer,
        #[case] kind: TokenKind,
        #[case] ttl: u64,
    ) {
        let principal = principal();
        let now = Utc::now();
        let issued = issuer.issue(&principal, kind, now).expect("issue");

        assert_eq!(issued.ttl_secs, ttl);
        assert_eq!(issued.expires_at.timestamp(), now.timestamp() + ttl as i64);
        assert_eq!(issuer.verify(&issued.token, kind).expect("verify"), principal);
    }

    #[rstest]
    fn kinds_are_not_interchangeable(issuer: JwtTokenIssuer) {
        let issued = issuer
            .issue(&principal(), TokenKind::Refresh, Utc::now())
            .expect("issue");
        let err = issuer
            .verify(&issued.token, TokenKind::Access)
            .expect_err("wrong kind");
        assert_eq!(err, TokenError::wrong_kind("access"));
    }

    #[rstest]
    fn expired_tokens_are_rejected(issuer: JwtTokenIssuer) {
        let long_ago = Utc::now() - ChronoDuration::days(30);
        let issued = issuer
            .issue(&principal(), TokenKind::Access, long_ago)
            .expect("issue");
        let err = issuer
            .verify(&issued.token, TokenKind::Access)
            .expect_err("expired");
        assert_eq!(err, TokenError::expired());
    }

    #[rstest]
    fn foreign_signatures_are_invalid(issuer: JwtTokenIssuer) {
        let other = JwtTokenIssuer::new(&JwtConfig {
            secret: Zeroizing::new("another-secret".to_owned()),
            access_ttl: Duration::from_secs(60),
            refresh_ttl: Duration::from_secs(60),
        });
        let issued = other
            .issue(&principal(), TokenKind::Access, Utc::now())
            .expect("issue");
        let err = issuer
            .verify(&issued.token, TokenKind::Access)
            .expect_err("bad signature");
        assert!(matches!(err, TokenError::Invalid { .. }));
    }

    #[rstest]
    fn consecutive_tokens_differ(issuer: JwtTokenIssuer) {
        let principal = principal();
        let now = Utc::now();
        let first = issuer.issue(&principal, TokenKind::Refresh, now).expect("issue");
        let second = issuer.issue(&principal, TokenKind::Refresh, now).expect("issue");
        assert_ne!(first.token, second.token);
    }
}
