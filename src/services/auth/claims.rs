use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::services::auth::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// What a token grants. Only access tokens carry permissions; a refresh
/// token has to go back through the resolver to get any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TokenGrant {
    Access { permissions: BTreeSet<String> },
    Refresh,
}

impl TokenGrant {
    pub fn kind(&self) -> TokenKind {
        match self {
            TokenGrant::Access { .. } => TokenKind::Access,
            TokenGrant::Refresh => TokenKind::Refresh,
        }
    }
}

/// Verified claims in the shape the rest of the crate works with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub principal_id: Uuid,
    pub application_id: Uuid,
    pub issuer: String,
    pub jti: Uuid,
    // Unix seconds
    pub issued_at: i64,
    pub not_before: i64,
    pub expires_at: i64,
    pub grant: TokenGrant,
}

impl TokenClaims {
    pub fn kind(&self) -> TokenKind {
        self.grant.kind()
    }

    pub fn permissions(&self) -> Option<&BTreeSet<String>> {
        match &self.grant {
            TokenGrant::Access { permissions } => Some(permissions),
            TokenGrant::Refresh => None,
        }
    }

    /// Seconds left before `exp`, or `None` once the token is past it.
    pub fn remaining_seconds(&self, now: i64) -> Option<u64> {
        let left = self.expires_at - now;
        (left > 0).then_some(left as u64)
    }
}

/// JWT payload as it appears on the wire.
///
/// `aud` is always emitted as an array holding the application id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JwtClaims {
    pub sub: String,
    pub iss: String,
    pub aud: Vec<String>,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
    pub principal_id: String,
    pub application_id: String,
    pub kind: TokenKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl From<&TokenClaims> for JwtClaims {
    fn from(c: &TokenClaims) -> Self {
        JwtClaims {
            sub: c.principal_id.to_string(),
            iss: c.issuer.clone(),
            aud: vec![c.application_id.to_string()],
            iat: c.issued_at,
            nbf: c.not_before,
            exp: c.expires_at,
            jti: c.jti.to_string(),
            principal_id: c.principal_id.to_string(),
            application_id: c.application_id.to_string(),
            kind: c.kind(),
            permissions: c.permissions().map(|p| p.iter().cloned().collect()),
        }
    }
}

impl TryFrom<JwtClaims> for TokenClaims {
    type Error = AuthError;

    /// Strict structural checks on top of signature/exp validation.
    fn try_from(raw: JwtClaims) -> Result<Self, Self::Error> {
        let principal_id = Uuid::parse_str(&raw.principal_id).map_err(|_| AuthError::Malformed)?;
        let application_id =
            Uuid::parse_str(&raw.application_id).map_err(|_| AuthError::Malformed)?;
        let jti = Uuid::parse_str(&raw.jti).map_err(|_| AuthError::Malformed)?;

        if raw.sub != raw.principal_id {
            return Err(AuthError::Malformed);
        }
        if !raw.aud.iter().any(|a| a == &raw.application_id) {
            return Err(AuthError::Malformed);
        }

        let grant = match (raw.kind, raw.permissions) {
            (TokenKind::Access, Some(perms)) => TokenGrant::Access {
                permissions: perms.into_iter().collect(),
            },
            (TokenKind::Refresh, None) => TokenGrant::Refresh,
            // Access without a permission list, or refresh carrying one.
            _ => return Err(AuthError::Malformed),
        };

        Ok(TokenClaims {
            principal_id,
            application_id,
            issuer: raw.iss,
            jti,
            issued_at: raw.iat,
            not_before: raw.nbf,
            expires_at: raw.exp,
            grant,
        })
    }
}
