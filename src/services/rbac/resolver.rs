use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::services::auth::error::AuthError;
use crate::services::rbac::catalog::RoleCatalog;
use crate::services::rbac::permission::Permission;

/// Effective permissions of a principal inside one application.
///
/// Stateless; every call reads the catalog.
#[derive(Clone)]
pub struct PermissionResolver {
    catalog: Arc<dyn RoleCatalog>,
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver").finish_non_exhaustive()
    }
}

impl PermissionResolver {
    pub fn new(catalog: Arc<dyn RoleCatalog>) -> Self {
        Self { catalog }
    }

    /// Union of the permissions of every role assigned in `application_id`,
    /// rendered as `"resource:action"`.
    pub async fn resolve(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
    ) -> Result<BTreeSet<String>, AuthError> {
        let role_ids = self
            .catalog
            .assigned_role_ids(principal_id, application_id)
            .await
            .map_err(|e| lookup_failure(principal_id, application_id, e))?;

        let mut granted = BTreeSet::new();
        for role_id in &role_ids {
            let permissions = self
                .catalog
                .role_permissions(*role_id)
                .await
                .map_err(|e| lookup_failure(principal_id, application_id, e))?;
            granted.extend(permissions);
        }

        debug!(
            principal_id = %principal_id,
            application_id = %application_id,
            roles = role_ids.len(),
            permissions = granted.len(),
            "resolved permissions"
        );

        Ok(granted.iter().map(Permission::to_string).collect())
    }

    pub async fn has_permission(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, AuthError> {
        let permission = Permission::new(resource, action);
        self.catalog
            .permission_granted(principal_id, application_id, &permission)
            .await
            .map_err(|e| lookup_failure(principal_id, application_id, e))
    }
}

fn lookup_failure(principal_id: Uuid, application_id: Uuid, e: RepoError) -> AuthError {
    error!(
        principal_id = %principal_id,
        application_id = %application_id,
        error = %e,
        "permission lookup failed"
    );
    AuthError::PermissionLookupFailure(e.to_string())
}
