use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repos::error::RepoError;
use crate::services::rbac::catalog::{BoxFuture, CatalogResult, RoleCatalog};
use crate::services::rbac::permission::Permission;

#[derive(Debug)]
struct RoleEntry {
    application_id: Uuid,
    permissions: BTreeSet<Permission>,
}

#[derive(Debug, Default)]
struct CatalogState {
    roles: HashMap<Uuid, RoleEntry>,
    // (principal, role, application)
    assignments: HashSet<(Uuid, Uuid, Uuid)>,
}

/// Process-local role catalog for tests and local wiring.
///
/// Enforces the same assignment rules as the Postgres schema: one assignment
/// per (principal, role, application) and the application must own the role.
/// The write methods stand in for catalog administration, which the service
/// itself never performs; `RoleCatalogRepo::assign` is the Postgres twin.
#[derive(Clone, Debug, Default)]
pub struct InMemoryRoleCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryRoleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a role owned by `application_id`; returns its id.
    pub async fn add_role<I>(&self, application_id: Uuid, permissions: I) -> Uuid
    where
        I: IntoIterator<Item = Permission>,
    {
        let role_id = Uuid::new_v4();
        let entry = RoleEntry {
            application_id,
            permissions: permissions.into_iter().collect(),
        };
        self.state.write().await.roles.insert(role_id, entry);
        role_id
    }

    pub async fn grant(&self, role_id: Uuid, permission: Permission) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        let role = state.roles.get_mut(&role_id).ok_or(RepoError::NotFound)?;
        role.permissions.insert(permission);
        Ok(())
    }

    pub async fn assign(
        &self,
        principal_id: Uuid,
        role_id: Uuid,
        application_id: Uuid,
    ) -> CatalogResult<()> {
        let mut state = self.state.write().await;
        let owner = state
            .roles
            .get(&role_id)
            .map(|r| r.application_id)
            .ok_or(RepoError::NotFound)?;
        if owner != application_id {
            return Err(RepoError::ApplicationMismatch);
        }
        if !state
            .assignments
            .insert((principal_id, role_id, application_id))
        {
            return Err(RepoError::Conflict);
        }
        Ok(())
    }

    pub async fn unassign(&self, principal_id: Uuid, role_id: Uuid, application_id: Uuid) -> bool {
        self.state
            .write()
            .await
            .assignments
            .remove(&(principal_id, role_id, application_id))
    }
}

impl RoleCatalog for InMemoryRoleCatalog {
    fn assigned_role_ids(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
    ) -> BoxFuture<'_, CatalogResult<Vec<Uuid>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .assignments
                .iter()
                .filter(|(p, _, a)| *p == principal_id && *a == application_id)
                .map(|(_, role_id, _)| *role_id)
                .collect())
        })
    }

    fn role_permissions(&self, role_id: Uuid) -> BoxFuture<'_, CatalogResult<Vec<Permission>>> {
        Box::pin(async move {
            let state = self.state.read().await;
            Ok(state
                .roles
                .get(&role_id)
                .map(|r| r.permissions.iter().cloned().collect())
                .unwrap_or_default())
        })
    }
}
