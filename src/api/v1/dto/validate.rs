use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::auth::claims::{TokenClaims, TokenKind};

#[derive(Clone, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
}

/// Deliberately says nothing about why a token is invalid.
#[derive(Debug, Clone, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClaimsView {
    pub principal_id: Uuid,
    pub application_id: Uuid,
    pub kind: TokenKind,
    pub jti: Uuid,
    pub issued_at: i64,
    pub expires_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
}

impl From<Option<TokenClaims>> for ValidateResponse {
    fn from(claims: Option<TokenClaims>) -> Self {
        Self {
            valid: claims.is_some(),
            claims: claims.map(ClaimsView::from),
        }
    }
}

impl From<TokenClaims> for ClaimsView {
    fn from(c: TokenClaims) -> Self {
        Self {
            principal_id: c.principal_id,
            application_id: c.application_id,
            kind: c.kind(),
            jti: c.jti,
            issued_at: c.issued_at,
            expires_at: c.expires_at,
            permissions: c.permissions().map(|p| p.iter().cloned().collect()),
        }
    }
}
