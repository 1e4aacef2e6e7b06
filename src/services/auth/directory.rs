use uuid::Uuid;

use crate::repos::directory_repo::{DirectoryRepo, PrincipalRow};
use crate::repos::error::RepoResult;
use crate::services::rbac::catalog::BoxFuture;

/// What login needs to know about a principal.
///
/// Decoupled from the `principals` row layout.
#[derive(Clone)]
pub struct PrincipalCredentials {
    pub id: Uuid,
    pub password_hash: String,
    pub active: bool,
}

impl std::fmt::Debug for PrincipalCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalCredentials")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl From<PrincipalRow> for PrincipalCredentials {
    fn from(r: PrincipalRow) -> Self {
        Self {
            id: r.id,
            password_hash: r.password_hash,
            active: r.active,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApplicationInfo {
    pub id: Uuid,
    pub name: String,
    pub system: bool,
}

/// Read side of identity and tenancy used by `LoginService`.
///
/// Consulted on login and again on every refresh.
pub trait Directory: Send + Sync {
    fn find_principal_by_login<'a>(
        &'a self,
        login: &'a str,
    ) -> BoxFuture<'a, RepoResult<Option<PrincipalCredentials>>>;

    fn find_principal_by_id(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<PrincipalCredentials>>>;

    fn find_application(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<ApplicationInfo>>>;
}

impl Directory for DirectoryRepo {
    fn find_principal_by_login<'a>(
        &'a self,
        login: &'a str,
    ) -> BoxFuture<'a, RepoResult<Option<PrincipalCredentials>>> {
        Box::pin(async move {
            let row = DirectoryRepo::find_principal_by_login(self, login).await?;
            Ok(row.map(PrincipalCredentials::from))
        })
    }

    fn find_principal_by_id(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<PrincipalCredentials>>> {
        Box::pin(async move {
            let row = DirectoryRepo::find_principal_by_id(self, id).await?;
            Ok(row.map(PrincipalCredentials::from))
        })
    }

    fn find_application(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<ApplicationInfo>>> {
        Box::pin(async move {
            let row = DirectoryRepo::find_application(self, id).await?;
            Ok(row.map(|r| ApplicationInfo {
                id: r.id,
                name: r.name,
                system: r.system,
            }))
        })
    }
}
