/*
 * Responsibility
 * - shared context bound to the Router
 * - cheap to clone (everything behind Arc)
 */
use std::sync::Arc;

use crate::services::auth::login_service::LoginService;
use crate::services::cache::CacheClient;

/// Generic over the cache backend so the router runs against Valkey in
/// production and the in-memory cache in tests.
pub struct AppState<C: CacheClient> {
    pub auth: Arc<LoginService<C>>,
}

impl<C: CacheClient> AppState<C> {
    pub fn new(auth: Arc<LoginService<C>>) -> Self {
        Self { auth }
    }
}

impl<C: CacheClient> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<C: CacheClient> std::fmt::Debug for AppState<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").field("auth", &self.auth).finish()
    }
}
