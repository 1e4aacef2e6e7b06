use chrono::Utc;
use serde::Serialize;

use crate::services::auth::token_issuer::IssuedPair;

#[derive(Debug, Clone, Serialize)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Always "Bearer"
    pub token_type: &'static str,
    /// Seconds until the access token expires.
    pub expires_in: u64,
    pub refresh_expires_in: u64,
    /// Permissions carried by the access token, `resource:action`.
    pub permissions: Vec<String>,
}

impl From<IssuedPair> for TokenPairResponse {
    fn from(pair: IssuedPair) -> Self {
        let now = Utc::now().timestamp();
        let permissions = pair
            .access
            .claims
            .permissions()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default();

        Self {
            expires_in: pair.access.claims.remaining_seconds(now).unwrap_or(0),
            refresh_expires_in: pair.refresh.claims.remaining_seconds(now).unwrap_or(0),
            access_token: pair.access.token,
            refresh_token: pair.refresh.token,
            token_type: "Bearer",
            permissions,
        }
    }
}
