use thiserror::Error;

use crate::repos::error::RepoError;
use crate::services::auth::claims::TokenKind;

/// Failures of the token lifecycle and permission resolution core.
///
/// Token failures (`Malformed` .. `Blacklisted`) are surfaced verbatim to
/// callers inside the process; the HTTP layer collapses them so clients never
/// learn which check failed.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token")]
    Malformed,

    #[error("token signature rejected")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("wrong token kind (expected {expected})")]
    WrongTokenKind { expected: TokenKind },

    #[error("token blacklisted")]
    Blacklisted,

    #[error("session cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("permission lookup failed: {0}")]
    PermissionLookupFailure(String),

    #[error("duplicate role assignment")]
    DuplicateRoleAssignment,

    #[error("unknown principal or application")]
    UnknownPrincipalOrApplication,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("principal directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("failed to sign token")]
    Signing,
}

impl AuthError {
    /// Short machine-readable reason, used for audit records and log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Malformed => "malformed",
            AuthError::BadSignature => "bad_signature",
            AuthError::Expired => "expired",
            AuthError::WrongTokenKind { .. } => "wrong_token_kind",
            AuthError::Blacklisted => "blacklisted",
            AuthError::CacheUnavailable(_) => "cache_unavailable",
            AuthError::PermissionLookupFailure(_) => "permission_lookup_failure",
            AuthError::DuplicateRoleAssignment => "duplicate_role_assignment",
            AuthError::UnknownPrincipalOrApplication => "unknown_principal_or_application",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::DirectoryUnavailable(_) => "directory_unavailable",
            AuthError::Signing => "signing",
        }
    }

    /// True for failures that describe the presented token itself.
    pub fn is_token_rejection(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed
                | AuthError::BadSignature
                | AuthError::Expired
                | AuthError::WrongTokenKind { .. }
                | AuthError::Blacklisted
        )
    }
}

/// Catalog write failures in auth terms.
impl From<RepoError> for AuthError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Conflict => AuthError::DuplicateRoleAssignment,
            RepoError::ApplicationMismatch | RepoError::NotFound => {
                AuthError::UnknownPrincipalOrApplication
            }
            RepoError::Db(e) => AuthError::PermissionLookupFailure(e.to_string()),
        }
    }
}
