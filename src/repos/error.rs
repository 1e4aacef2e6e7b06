/*
 * Responsibility
 * - meaning that the repo layer passes upward
 */
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("db error")]
    Db(#[from] sqlx::Error),

    #[error("conflict")]
    Conflict,

    // A role can only be assigned inside the application that owns it.
    #[error("role does not belong to the application")]
    ApplicationMismatch,

    #[error("not found")]
    NotFound,
}

pub type RepoResult<T> = Result<T, RepoError>;

impl RepoError {
    /// Map Postgres constraint violations onto repo meanings.
    ///
    /// 23505 unique_violation, 23503 foreign_key_violation.
    pub fn from_sqlx(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(dbe) = &e {
            match dbe.code().as_deref() {
                Some("23505") => return RepoError::Conflict,
                Some("23503") if dbe.constraint() == Some("role_assignments_role_application_fkey") => {
                    return RepoError::ApplicationMismatch;
                }
                Some("23503") => return RepoError::NotFound,
                _ => {}
            }
        }
        RepoError::Db(e)
    }
}
