use std::{future::Future, pin::Pin};
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::services::rbac::permission::Permission;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type CatalogResult<T> = Result<T, RepoError>;

/// Read-only query surface over roles and their permissions.
pub trait RoleCatalog: Send + Sync {
    /// Roles assigned to the principal inside `application_id`.
    fn assigned_role_ids(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
    ) -> BoxFuture<'_, CatalogResult<Vec<Uuid>>>;

    fn role_permissions(&self, role_id: Uuid) -> BoxFuture<'_, CatalogResult<Vec<Permission>>>;

    /// Whether any assigned role grants `permission`.
    ///
    /// Must agree with membership in the union of `role_permissions` over
    /// `assigned_role_ids`; implementations may answer it more directly.
    fn permission_granted<'a>(
        &'a self,
        principal_id: Uuid,
        application_id: Uuid,
        permission: &'a Permission,
    ) -> BoxFuture<'a, CatalogResult<bool>> {
        Box::pin(async move {
            for role_id in self.assigned_role_ids(principal_id, application_id).await? {
                if self.role_permissions(role_id).await?.contains(permission) {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }
}
