use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::services::audit::{AuditSink, AuthEvent, AuthEventKind};
use crate::services::auth::claims::TokenClaims;
use crate::services::auth::directory::{ApplicationInfo, Directory};
use crate::services::auth::error::AuthError;
use crate::services::auth::password::{decoy_hash, verify_password};
use crate::services::auth::token_issuer::IssuedPair;
use crate::services::cache::CacheClient;
use crate::services::rbac::resolver::PermissionResolver;
use crate::services::session::manager::SessionManager;

/// Login, logout, refresh and validation as exposed over HTTP.
///
/// Wires the directory, the permission resolver and the session manager
/// together; holds no state of its own.
pub struct LoginService<C: CacheClient> {
    directory: Arc<dyn Directory>,
    resolver: PermissionResolver,
    sessions: Arc<SessionManager<C>>,
    audit: Arc<dyn AuditSink>,
    decoy_hash: Option<String>,
}

impl<C: CacheClient> std::fmt::Debug for LoginService<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginService")
            .field("resolver", &self.resolver)
            .field("sessions", &self.sessions)
            .finish_non_exhaustive()
    }
}

impl<C: CacheClient> LoginService<C> {
    pub fn new(
        directory: Arc<dyn Directory>,
        resolver: PermissionResolver,
        sessions: Arc<SessionManager<C>>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            directory,
            resolver,
            sessions,
            audit,
            decoy_hash: decoy_hash(),
        }
    }

    pub fn sessions(&self) -> &SessionManager<C> {
        &self.sessions
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Authenticate and open a session in `application_id`.
    ///
    /// Unknown login, inactive principal and wrong password are all
    /// `InvalidCredentials`.
    pub async fn login(
        &self,
        login: &str,
        password: &str,
        application_id: Uuid,
    ) -> Result<IssuedPair, AuthError> {
        let outcome = self.open_session(login, password, application_id).await;

        match &outcome {
            Ok(pair) => {
                info!(
                    principal_id = %pair.access.claims.principal_id,
                    application_id = %application_id,
                    "login succeeded"
                );
                self.audit.record(
                    AuthEvent::new(AuthEventKind::LoginSucceeded)
                        .scope(pair.access.claims.principal_id, application_id),
                );
            }
            Err(e) => {
                info!(application_id = %application_id, reason = e.reason(), "login failed");
                self.audit
                    .record(AuthEvent::new(AuthEventKind::LoginFailed).reason(e.reason()));
            }
        }

        outcome
    }

    async fn open_session(
        &self,
        login: &str,
        password: &str,
        application_id: Uuid,
    ) -> Result<IssuedPair, AuthError> {
        let found = self
            .directory
            .find_principal_by_login(login)
            .await
            .map_err(|e| {
                error!(error = %e, "principal lookup failed");
                AuthError::DirectoryUnavailable(e.to_string())
            })?;

        let Some(principal) = found else {
            if let Some(decoy) = &self.decoy_hash {
                verify_password(decoy.clone(), password.to_string()).await;
            }
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password(principal.password_hash.clone(), password.to_string()).await {
            return Err(AuthError::InvalidCredentials);
        }
        if !principal.active {
            return Err(AuthError::InvalidCredentials);
        }

        let application = self.application(application_id).await?;

        // Never issue a token whose permissions could not be computed.
        let permissions = self.resolver.resolve(principal.id, application.id).await?;

        let pair = self
            .sessions
            .issuer()
            .issue_pair(principal.id, application.id, permissions)?;
        self.sessions
            .store_token(&pair.access.token, &pair.access.claims)
            .await?;
        self.sessions
            .store_token(&pair.refresh.token, &pair.refresh.claims)
            .await?;

        Ok(pair)
    }

    async fn application(&self, application_id: Uuid) -> Result<ApplicationInfo, AuthError> {
        self.directory
            .find_application(application_id)
            .await
            .map_err(|e| {
                error!(application_id = %application_id, error = %e, "application lookup failed");
                AuthError::DirectoryUnavailable(e.to_string())
            })?
            .ok_or(AuthError::UnknownPrincipalOrApplication)
    }

    /// End every session of the bearer's principal in the bearer's application.
    pub async fn logout(&self, access_token: &str) -> Result<usize, AuthError> {
        let claims = self.sessions.validate_access(access_token).await?;

        let revoked = self
            .sessions
            .invalidate_all_in_application(claims.principal_id, claims.application_id, None)
            .await?;
        // The bearer may not be indexed (e.g. cached by write-back only).
        self.sessions.invalidate_token(access_token).await?;

        Ok(revoked)
    }

    /// End every session of the bearer's principal in every application.
    pub async fn logout_everywhere(&self, access_token: &str) -> Result<usize, AuthError> {
        let claims = self.sessions.validate_access(access_token).await?;

        let revoked = self
            .sessions
            .invalidate_all_for_principal(claims.principal_id)
            .await?;
        self.sessions.invalidate_token(access_token).await?;

        Ok(revoked)
    }

    /// Rotate a refresh token; permissions are recomputed from current roles.
    ///
    /// The principal must still exist and be active, and the application must
    /// still exist. Both are checked before the old token is consumed.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedPair, AuthError> {
        let claims = self.sessions.validate_refresh(refresh_token).await?;

        let principal = self
            .directory
            .find_principal_by_id(claims.principal_id)
            .await
            .map_err(|e| {
                error!(principal_id = %claims.principal_id, error = %e, "principal lookup failed");
                AuthError::DirectoryUnavailable(e.to_string())
            })?;
        if !principal.is_some_and(|p| p.active) {
            info!(principal_id = %claims.principal_id, "refresh refused: principal missing or inactive");
            return Err(AuthError::InvalidCredentials);
        }
        self.application(claims.application_id).await?;

        let permissions = self
            .resolver
            .resolve(claims.principal_id, claims.application_id)
            .await?;

        self.sessions.refresh_pair(refresh_token, permissions).await
    }

    /// Claims of a valid token, or `None`. The reason never leaves the process.
    pub async fn validate(&self, token: &str) -> Option<TokenClaims> {
        self.sessions.validate_token(token).await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::repos::error::{RepoError, RepoResult};
    use crate::services::audit::TracingAuditSink;
    use crate::services::auth::claims::TokenKind;
    use crate::services::auth::directory::PrincipalCredentials;
    use crate::services::auth::password::tests::hash;
    use crate::services::auth::token_issuer::tests::issuer;
    use crate::services::cache::InMemoryCache;
    use crate::services::rbac::catalog::{BoxFuture, CatalogResult, RoleCatalog};
    use crate::services::rbac::memory::InMemoryRoleCatalog;
    use crate::services::rbac::permission::Permission;
    use crate::services::session::cache::SessionCache;

    /// Shared maps so a test can change the directory after wiring.
    #[derive(Clone, Default)]
    struct StaticDirectory {
        principals: Arc<Mutex<HashMap<String, PrincipalCredentials>>>,
        applications: Arc<Mutex<HashMap<Uuid, ApplicationInfo>>>,
    }

    impl StaticDirectory {
        fn add_principal(&self, login: &str, credentials: PrincipalCredentials) {
            self.principals.lock().unwrap().insert(login.into(), credentials);
        }

        fn set_active(&self, login: &str, active: bool) {
            if let Some(p) = self.principals.lock().unwrap().get_mut(login) {
                p.active = active;
            }
        }

        fn add_application(&self, id: Uuid, name: &str) {
            self.applications.lock().unwrap().insert(
                id,
                ApplicationInfo {
                    id,
                    name: name.into(),
                    system: false,
                },
            );
        }

        fn remove_application(&self, id: Uuid) {
            self.applications.lock().unwrap().remove(&id);
        }
    }

    impl Directory for StaticDirectory {
        fn find_principal_by_login<'a>(
            &'a self,
            login: &'a str,
        ) -> BoxFuture<'a, RepoResult<Option<PrincipalCredentials>>> {
            let found = self.principals.lock().unwrap().get(login).cloned();
            Box::pin(async move { Ok(found) })
        }

        fn find_principal_by_id(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<PrincipalCredentials>>> {
            let found = self
                .principals
                .lock()
                .unwrap()
                .values()
                .find(|p| p.id == id)
                .cloned();
            Box::pin(async move { Ok(found) })
        }

        fn find_application(&self, id: Uuid) -> BoxFuture<'_, RepoResult<Option<ApplicationInfo>>> {
            let found = self.applications.lock().unwrap().get(&id).cloned();
            Box::pin(async move { Ok(found) })
        }
    }

    struct FailingCatalog;

    impl RoleCatalog for FailingCatalog {
        fn assigned_role_ids(&self, _: Uuid, _: Uuid) -> BoxFuture<'_, CatalogResult<Vec<Uuid>>> {
            Box::pin(async { Err(RepoError::Db(sqlx::Error::PoolClosed)) })
        }

        fn role_permissions(&self, _: Uuid) -> BoxFuture<'_, CatalogResult<Vec<Permission>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    struct World {
        service: LoginService<InMemoryCache>,
        directory: StaticDirectory,
        catalog: InMemoryRoleCatalog,
        reader: Uuid,
        alice: Uuid,
        app_x: Uuid,
        app_y: Uuid,
    }

    fn world_with_catalog(
        catalog: Arc<dyn RoleCatalog>,
    ) -> (LoginService<InMemoryCache>, StaticDirectory, Uuid, Uuid, Uuid) {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let (app_x, app_y) = (Uuid::new_v4(), Uuid::new_v4());

        let directory = StaticDirectory::default();
        directory.add_principal(
            "alice",
            PrincipalCredentials {
                id: alice,
                password_hash: hash("correct horse"),
                active: true,
            },
        );
        directory.add_principal(
            "bob",
            PrincipalCredentials {
                id: bob,
                password_hash: hash("battery staple"),
                active: false,
            },
        );
        directory.add_application(app_x, "x");
        directory.add_application(app_y, "y");

        let sessions = SessionManager::new(
            issuer(),
            SessionCache::new(Arc::new(InMemoryCache::new()), "login", Duration::from_secs(3600)),
            Arc::new(TracingAuditSink),
            Duration::from_secs(0),
        );
        let service = LoginService::new(
            Arc::new(directory.clone()),
            PermissionResolver::new(catalog),
            Arc::new(sessions),
            Arc::new(TracingAuditSink),
        );
        (service, directory, alice, app_x, app_y)
    }

    async fn world() -> World {
        let catalog = InMemoryRoleCatalog::new();
        let (service, directory, alice, app_x, app_y) =
            world_with_catalog(Arc::new(catalog.clone()));

        let reader = catalog
            .add_role(app_x, [Permission::new("users", "read")])
            .await;
        catalog.assign(alice, reader, app_x).await.unwrap();

        World {
            service,
            directory,
            catalog,
            reader,
            alice,
            app_x,
            app_y,
        }
    }

    #[tokio::test]
    async fn login_issues_a_pair_with_resolved_permissions() {
        let w = world().await;

        let pair = w.service.login("alice", "correct horse", w.app_x).await.unwrap();

        let claims = w.service.validate(&pair.access.token).await.unwrap();
        assert_eq!(claims.principal_id, w.alice);
        assert_eq!(claims.application_id, w.app_x);
        assert_eq!(
            claims.permissions().unwrap().iter().collect::<Vec<_>>(),
            vec!["users:read"]
        );
        assert_eq!(pair.refresh.claims.kind(), TokenKind::Refresh);
    }

    #[tokio::test]
    async fn bad_credentials_look_the_same() {
        let w = world().await;

        for (login, password) in [
            ("alice", "wrong"),
            ("nobody", "correct horse"),
            ("bob", "battery staple"),
        ] {
            assert!(
                matches!(
                    w.service.login(login, password, w.app_x).await,
                    Err(AuthError::InvalidCredentials)
                ),
                "{login}"
            );
        }
    }

    #[tokio::test]
    async fn unknown_application_is_rejected() {
        let w = world().await;

        assert!(matches!(
            w.service
                .login("alice", "correct horse", Uuid::new_v4())
                .await,
            Err(AuthError::UnknownPrincipalOrApplication)
        ));
    }

    #[tokio::test]
    async fn permission_failure_blocks_login() {
        let (service, _, alice, app_x, _) = world_with_catalog(Arc::new(FailingCatalog));

        assert!(matches!(
            service.login("alice", "correct horse", app_x).await,
            Err(AuthError::PermissionLookupFailure(_))
        ));
        assert_eq!(service.sessions().invalidate_all_for_principal(alice).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn logout_is_scoped_to_the_bearer_application() {
        let w = world().await;
        let in_x = w.service.login("alice", "correct horse", w.app_x).await.unwrap();
        let second_in_x = w.service.login("alice", "correct horse", w.app_x).await.unwrap();
        let in_y = w.service.login("alice", "correct horse", w.app_y).await.unwrap();

        let revoked = w.service.logout(&in_x.access.token).await.unwrap();

        assert_eq!(revoked, 4);
        assert!(w.service.validate(&in_x.access.token).await.is_none());
        assert!(w.service.validate(&second_in_x.refresh.token).await.is_none());
        assert!(w.service.validate(&in_y.access.token).await.is_some());
        assert!(w.service.refresh(&in_y.refresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn logout_requires_an_access_token() {
        let w = world().await;
        let pair = w.service.login("alice", "correct horse", w.app_x).await.unwrap();

        assert!(matches!(
            w.service.logout(&pair.refresh.token).await,
            Err(AuthError::WrongTokenKind {
                expected: TokenKind::Access
            })
        ));
        assert!(w.service.validate(&pair.access.token).await.is_some());
    }

    #[tokio::test]
    async fn logout_everywhere_covers_all_applications() {
        let w = world().await;
        let in_x = w.service.login("alice", "correct horse", w.app_x).await.unwrap();
        let in_y = w.service.login("alice", "correct horse", w.app_y).await.unwrap();

        let revoked = w.service.logout_everywhere(&in_x.access.token).await.unwrap();

        assert_eq!(revoked, 4);
        assert!(w.service.validate(&in_y.access.token).await.is_none());
        assert!(w.service.validate(&in_y.refresh.token).await.is_none());
    }

    #[tokio::test]
    async fn refresh_picks_up_role_changes() {
        let w = world().await;
        let pair = w.service.login("alice", "correct horse", w.app_x).await.unwrap();

        let editor = w
            .catalog
            .add_role(w.app_x, [Permission::new("users", "update")])
            .await;
        w.catalog.assign(w.alice, editor, w.app_x).await.unwrap();

        let rotated = w.service.refresh(&pair.refresh.token).await.unwrap();
        let claims = w.service.validate(&rotated.access.token).await.unwrap();

        assert!(claims.permissions().unwrap().contains("users:update"));
        assert!(claims.permissions().unwrap().contains("users:read"));
        assert!(matches!(
            w.service.refresh(&pair.refresh.token).await,
            Err(AuthError::Blacklisted)
        ));
    }

    #[tokio::test]
    async fn refresh_drops_permissions_of_removed_roles() {
        let w = world().await;
        let pair = w.service.login("alice", "correct horse", w.app_x).await.unwrap();

        assert!(w.catalog.unassign(w.alice, w.reader, w.app_x).await);

        let rotated = w.service.refresh(&pair.refresh.token).await.unwrap();
        assert!(rotated.access.claims.permissions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn deactivated_principal_cannot_keep_refreshing() {
        let w = world().await;
        let pair = w.service.login("alice", "correct horse", w.app_x).await.unwrap();

        w.directory.set_active("alice", false);

        assert!(matches!(
            w.service.refresh(&pair.refresh.token).await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            w.service.refresh(&pair.refresh.token).await,
            Err(AuthError::InvalidCredentials)
        ));

        // The refused token was not consumed.
        w.directory.set_active("alice", true);
        assert!(w.service.refresh(&pair.refresh.token).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_into_a_removed_application_is_refused() {
        let w = world().await;
        let pair = w.service.login("alice", "correct horse", w.app_x).await.unwrap();

        w.directory.remove_application(w.app_x);

        assert!(matches!(
            w.service.refresh(&pair.refresh.token).await,
            Err(AuthError::UnknownPrincipalOrApplication)
        ));
        assert!(w.service.validate(&pair.refresh.token).await.is_some());
    }

    #[tokio::test]
    async fn validate_hides_the_failure_reason() {
        let w = world().await;
        assert!(w.service.validate("not-a-token").await.is_none());
    }
}
