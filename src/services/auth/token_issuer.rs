use chrono::Utc;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::services::auth::claims::{JwtClaims, TokenClaims, TokenGrant, TokenKind};
use crate::services::auth::error::AuthError;
use crate::services::auth::jwt::JwtCodec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenLifetimes {
    pub access: Duration,
    pub refresh: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            access: Duration::from_secs(60 * 60),
            refresh: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl TokenLifetimes {
    pub fn longest(&self) -> Duration {
        self.access.max(self.refresh)
    }
}

/// A freshly signed token together with the claims it carries.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    pub token: String,
    pub claims: TokenClaims,
}

#[derive(Clone, Debug)]
pub struct IssuedPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Mints and verifies access/refresh JWTs. Holds no per-token state.
#[derive(Clone, Debug)]
pub struct TokenIssuer {
    jwt: JwtCodec,
    lifetimes: TokenLifetimes,
}

impl TokenIssuer {
    pub fn new(jwt: JwtCodec, lifetimes: TokenLifetimes) -> Self {
        Self { jwt, lifetimes }
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    pub fn issue_access(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        permissions: BTreeSet<String>,
    ) -> Result<IssuedToken, AuthError> {
        self.mint(
            principal_id,
            application_id,
            TokenGrant::Access { permissions },
            ttl_secs(self.lifetimes.access),
        )
    }

    pub fn issue_refresh(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
    ) -> Result<IssuedToken, AuthError> {
        self.mint(
            principal_id,
            application_id,
            TokenGrant::Refresh,
            ttl_secs(self.lifetimes.refresh),
        )
    }

    pub fn issue_pair(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        permissions: BTreeSet<String>,
    ) -> Result<IssuedPair, AuthError> {
        Ok(IssuedPair {
            access: self.issue_access(principal_id, application_id, permissions)?,
            refresh: self.issue_refresh(principal_id, application_id)?,
        })
    }

    /// Signature, issuer, `exp`/`nbf` and claim-structure checks.
    pub fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let raw: JwtClaims = self.jwt.verify(token)?;
        TokenClaims::try_from(raw)
    }

    pub fn validate_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        expect_kind(self.validate(token)?, TokenKind::Access)
    }

    pub fn validate_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        expect_kind(self.validate(token)?, TokenKind::Refresh)
    }

    fn mint(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        grant: TokenGrant,
        ttl_seconds: i64,
    ) -> Result<IssuedToken, AuthError> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            principal_id,
            application_id,
            issuer: self.jwt.issuer().to_string(),
            jti: Uuid::new_v4(),
            issued_at: now,
            not_before: now,
            expires_at: now.saturating_add(ttl_seconds),
            grant,
        };

        debug!(
            principal_id = %principal_id,
            application_id = %application_id,
            kind = %claims.kind(),
            expires_at = claims.expires_at,
            "issuing token"
        );

        let token = self.jwt.sign(&JwtClaims::from(&claims))?;
        Ok(IssuedToken { token, claims })
    }
}

pub(crate) fn expect_kind(claims: TokenClaims, expected: TokenKind) -> Result<TokenClaims, AuthError> {
    if claims.kind() == expected {
        Ok(claims)
    } else {
        Err(AuthError::WrongTokenKind { expected })
    }
}

fn ttl_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}
