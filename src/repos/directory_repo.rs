/*
 * Responsibility
 * - principals / applications lookups needed at login and refresh
 * - no writes; user management lives elsewhere
 */
use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};

#[derive(Clone, Debug)]
pub struct DirectoryRepo {
    pool: PgPool,
}

#[derive(Clone, sqlx::FromRow)]
pub struct PrincipalRow {
    pub id: Uuid,
    pub login: String,
    pub password_hash: String,
    pub active: bool,
}

impl std::fmt::Debug for PrincipalRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalRow")
            .field("id", &self.id)
            .field("login", &self.login)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct ApplicationRow {
    pub id: Uuid,
    pub name: String,
    pub system: bool,
}

impl DirectoryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_principal_by_login(&self, login: &str) -> RepoResult<Option<PrincipalRow>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, login, password_hash, active
            FROM principals
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)?;

        Ok(row)
    }

    pub async fn find_principal_by_id(&self, id: Uuid) -> RepoResult<Option<PrincipalRow>> {
        let row = sqlx::query_as::<_, PrincipalRow>(
            r#"
            SELECT id, login, password_hash, active
            FROM principals
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)?;

        Ok(row)
    }

    pub async fn find_application(&self, id: Uuid) -> RepoResult<Option<ApplicationRow>> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"
            SELECT id, name, system
            FROM applications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepoError::Db)?;

        Ok(row)
    }
}
