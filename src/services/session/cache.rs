use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

use crate::services::auth::claims::TokenClaims;
use crate::services::auth::fingerprint::Fingerprint;
use crate::services::cache::{CacheClient, CacheError};

/// Cached projection of a token's claims, stored under its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub claims: TokenClaims,
    // Unix seconds
    pub cached_at: i64,
}

#[derive(Debug, Error)]
pub enum SessionCacheError {
    #[error("session record is already expired")]
    Expired,

    #[error(transparent)]
    Backend(#[from] CacheError),

    #[error("session record codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type SessionCacheResult<T> = Result<T, SessionCacheError>;

/// Session records, blacklist, and the per-(principal, application) index
/// on top of a TTL key-value store.
///
/// Key layout (all under `prefix`):
/// - `session:{fp}`                 JSON `SessionRecord`
/// - `blacklist:{fp}`               revocation marker
/// - `active:{principal}:{app}`     set of fingerprints
/// - `apps:{principal}`             set of application ids with tracked sessions
#[derive(Clone)]
pub struct SessionCache<C: CacheClient> {
    cache: Arc<C>,
    prefix: String,
    // Index sets are re-armed with this TTL on every add.
    index_ttl: Duration,
}

impl<C: CacheClient> std::fmt::Debug for SessionCache<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("backend", &self.cache.backend_name())
            .field("prefix", &self.prefix)
            .field("index_ttl", &self.index_ttl)
            .finish()
    }
}

impl<C: CacheClient> SessionCache<C> {
    pub fn new(cache: Arc<C>, prefix: impl Into<String>, index_ttl: Duration) -> Self {
        Self {
            cache,
            prefix: prefix.into(),
            index_ttl,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.cache.backend_name()
    }

    fn session_key(&self, fp: &Fingerprint) -> String {
        format!("{}:session:{}", self.prefix, fp)
    }

    fn blacklist_key(&self, fp: &Fingerprint) -> String {
        format!("{}:blacklist:{}", self.prefix, fp)
    }

    fn active_key(&self, principal_id: Uuid, application_id: Uuid) -> String {
        format!("{}:active:{}:{}", self.prefix, principal_id, application_id)
    }

    fn apps_key(&self, principal_id: Uuid) -> String {
        format!("{}:apps:{}", self.prefix, principal_id)
    }

    /// Store a record. A zero TTL means the token is already past `exp`.
    pub async fn put(
        &self,
        fp: &Fingerprint,
        record: &SessionRecord,
        ttl: Duration,
    ) -> SessionCacheResult<()> {
        if ttl.is_zero() {
            return Err(SessionCacheError::Expired);
        }
        let value = serde_json::to_string(record)?;
        self.cache
            .set_with_ttl(&self.session_key(fp), &value, ttl)
            .await?;
        Ok(())
    }

    pub async fn get(&self, fp: &Fingerprint) -> SessionCacheResult<Option<SessionRecord>> {
        let Some(raw) = self.cache.get_string(&self.session_key(fp)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub async fn remove(&self, fp: &Fingerprint) -> SessionCacheResult<bool> {
        Ok(self.cache.del(&self.session_key(fp)).await? > 0)
    }

    /// Mark a fingerprint as permanently invalid. Re-blacklisting just
    /// refreshes the TTL.
    pub async fn blacklist(&self, fp: &Fingerprint, ttl: Duration) -> SessionCacheResult<()> {
        self.cache
            .set_with_ttl(&self.blacklist_key(fp), "1", ttl)
            .await?;
        Ok(())
    }

    /// Blacklist only if nobody has yet.
    ///
    /// Returns `true` for the single caller that performed the insert.
    pub async fn claim_blacklist(&self, fp: &Fingerprint, ttl: Duration) -> SessionCacheResult<bool> {
        Ok(self
            .cache
            .set_if_absent_with_ttl(&self.blacklist_key(fp), "1", ttl)
            .await?)
    }

    pub async fn is_blacklisted(&self, fp: &Fingerprint) -> SessionCacheResult<bool> {
        Ok(self.cache.exists(&self.blacklist_key(fp)).await?)
    }

    pub async fn track_active(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        fp: &Fingerprint,
    ) -> SessionCacheResult<()> {
        let active = self.active_key(principal_id, application_id);
        self.cache.set_add(&active, fp.as_str()).await?;
        self.cache.expire(&active, self.index_ttl).await?;

        let apps = self.apps_key(principal_id);
        self.cache
            .set_add(&apps, &application_id.to_string())
            .await?;
        self.cache.expire(&apps, self.index_ttl).await?;
        Ok(())
    }

    pub async fn untrack(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        fp: &Fingerprint,
    ) -> SessionCacheResult<bool> {
        Ok(self
            .cache
            .set_remove(&self.active_key(principal_id, application_id), fp.as_str())
            .await?)
    }

    pub async fn list_active(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
    ) -> SessionCacheResult<Vec<Fingerprint>> {
        let members = self
            .cache
            .set_members(&self.active_key(principal_id, application_id))
            .await?;
        Ok(members.into_iter().map(Fingerprint::from_stored).collect())
    }

    pub async fn clear_active(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
    ) -> SessionCacheResult<()> {
        self.cache
            .del(&self.active_key(principal_id, application_id))
            .await?;
        Ok(())
    }

    pub async fn list_applications(&self, principal_id: Uuid) -> SessionCacheResult<Vec<Uuid>> {
        let members = self.cache.set_members(&self.apps_key(principal_id)).await?;
        // Foreign members cannot have been written by us; skip them.
        Ok(members
            .iter()
            .filter_map(|m| Uuid::parse_str(m).ok())
            .collect())
    }
}
