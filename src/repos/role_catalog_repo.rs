/*
 * Responsibility
 * - RBAC catalog reads for PermissionResolver
 * - role assignment writes; uniqueness and role/application ownership are
 *   enforced by constraints and surfaced as RepoError meanings
 */
use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::error::{RepoError, RepoResult};
use crate::services::rbac::catalog::{BoxFuture, CatalogResult, RoleCatalog};
use crate::services::rbac::permission::Permission;

#[derive(Clone, Debug)]
pub struct RoleCatalogRepo {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct PermissionRow {
    resource: String,
    action: String,
}

impl From<PermissionRow> for Permission {
    fn from(row: PermissionRow) -> Self {
        Permission::new(row.resource, row.action)
    }
}

impl RoleCatalogRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn role_ids_for(&self, principal_id: Uuid, application_id: Uuid) -> RepoResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT role_id
            FROM role_assignments
            WHERE principal_id = $1 AND application_id = $2
            "#,
        )
        .bind(principal_id)
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::Db)?;

        Ok(ids)
    }

    pub async fn permissions_of(&self, role_id: Uuid) -> RepoResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT p.resource, p.action
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepoError::Db)?;

        Ok(rows.into_iter().map(Permission::from).collect())
    }

    pub async fn has_grant(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        permission: &Permission,
    ) -> RepoResult<bool> {
        let granted = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM role_assignments ra
                JOIN role_permissions rp ON rp.role_id = ra.role_id
                JOIN permissions p ON p.id = rp.permission_id
                WHERE ra.principal_id = $1
                  AND ra.application_id = $2
                  AND p.resource = $3
                  AND p.action = $4
            )
            "#,
        )
        .bind(principal_id)
        .bind(application_id)
        .bind(&permission.resource)
        .bind(&permission.action)
        .fetch_one(&self.pool)
        .await
        .map_err(RepoError::Db)?;

        Ok(granted)
    }

    // Duplicate triple -> Conflict; role owned by another application -> ApplicationMismatch.
    pub async fn assign(&self, principal_id: Uuid, role_id: Uuid, application_id: Uuid) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO role_assignments (principal_id, role_id, application_id)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(principal_id)
        .bind(role_id)
        .bind(application_id)
        .execute(&self.pool)
        .await
        .map_err(RepoError::from_sqlx)?;

        Ok(())
    }

    pub async fn unassign(&self, principal_id: Uuid, role_id: Uuid, application_id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query(
            r#"
            DELETE FROM role_assignments
            WHERE principal_id = $1 AND role_id = $2 AND application_id = $3
            "#,
        )
        .bind(principal_id)
        .bind(role_id)
        .bind(application_id)
        .execute(&self.pool)
        .await
        .map_err(RepoError::Db)?;

        Ok(res.rows_affected() > 0)
    }
}

impl RoleCatalog for RoleCatalogRepo {
    fn assigned_role_ids(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
    ) -> BoxFuture<'_, CatalogResult<Vec<Uuid>>> {
        Box::pin(self.role_ids_for(principal_id, application_id))
    }

    fn role_permissions(&self, role_id: Uuid) -> BoxFuture<'_, CatalogResult<Vec<Permission>>> {
        Box::pin(self.permissions_of(role_id))
    }

    fn permission_granted<'a>(
        &'a self,
        principal_id: Uuid,
        application_id: Uuid,
        permission: &'a Permission,
    ) -> BoxFuture<'a, CatalogResult<bool>> {
        Box::pin(self.has_grant(principal_id, application_id, permission))
    }
}
