use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::audit::{AuditSink, AuthEvent, AuthEventKind};
use crate::services::auth::claims::{TokenClaims, TokenKind};
use crate::services::auth::error::AuthError;
use crate::services::auth::fingerprint::Fingerprint;
use crate::services::auth::token_issuer::{IssuedPair, TokenIssuer, expect_kind};
use crate::services::cache::CacheClient;
use crate::services::session::cache::{SessionCache, SessionCacheError, SessionRecord};

/// Blacklist entries outlive the longest token by at least this much.
const MIN_BLACKLIST_MARGIN: Duration = Duration::from_secs(60);

impl From<SessionCacheError> for AuthError {
    fn from(e: SessionCacheError) -> Self {
        match e {
            SessionCacheError::Expired => AuthError::Expired,
            other => AuthError::CacheUnavailable(other.to_string()),
        }
    }
}

/// Issue/validate/invalidate/refresh on top of `TokenIssuer` and `SessionCache`.
///
/// The cache only ever short-circuits work: a validation that the signature
/// check would accept is never failed because the cache misbehaved. Revocation
/// is the opposite; if the blacklist cannot be written the call fails.
pub struct SessionManager<C: CacheClient> {
    issuer: TokenIssuer,
    cache: SessionCache<C>,
    audit: Arc<dyn AuditSink>,
    blacklist_ttl: Duration,
}

impl<C: CacheClient> std::fmt::Debug for SessionManager<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("issuer", &self.issuer)
            .field("cache", &self.cache)
            .field("blacklist_ttl", &self.blacklist_ttl)
            .finish()
    }
}

impl<C: CacheClient> SessionManager<C> {
    pub fn new(
        issuer: TokenIssuer,
        cache: SessionCache<C>,
        audit: Arc<dyn AuditSink>,
        blacklist_ttl: Duration,
    ) -> Self {
        let floor = issuer.lifetimes().longest() + MIN_BLACKLIST_MARGIN;
        let blacklist_ttl = if blacklist_ttl < floor {
            warn!(
                configured = ?blacklist_ttl,
                using = ?floor,
                "blacklist TTL shorter than the longest token lifetime; raising it"
            );
            floor
        } else {
            blacklist_ttl
        };

        Self {
            issuer,
            cache,
            audit,
            blacklist_ttl,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn blacklist_ttl(&self) -> Duration {
        self.blacklist_ttl
    }

    /// Blacklist, then cached record, then signature check with write-back.
    pub async fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let fp = Fingerprint::of(token);
        let outcome = self.validate_fingerprinted(token, &fp).await;

        match &outcome {
            Ok(claims) => self.audit.record(
                AuthEvent::new(AuthEventKind::TokenValidated)
                    .scope(claims.principal_id, claims.application_id)
                    .token_kind(claims.kind()),
            ),
            Err(e) => self
                .audit
                .record(AuthEvent::new(AuthEventKind::ValidationFailed).reason(e.reason())),
        }

        outcome
    }

    pub async fn validate_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        expect_kind(self.validate_token(token).await?, TokenKind::Access)
    }

    pub async fn validate_refresh(&self, token: &str) -> Result<TokenClaims, AuthError> {
        expect_kind(self.validate_token(token).await?, TokenKind::Refresh)
    }

    async fn validate_fingerprinted(
        &self,
        token: &str,
        fp: &Fingerprint,
    ) -> Result<TokenClaims, AuthError> {
        let now = Utc::now().timestamp();

        let cache_usable = match self.cache.is_blacklisted(fp).await {
            Ok(true) => return Err(AuthError::Blacklisted),
            Ok(false) => true,
            Err(e) => {
                warn!(fingerprint = %fp, error = %e, "blacklist lookup failed; using signature check only");
                false
            }
        };

        if cache_usable {
            match self.cache.get(fp).await {
                Ok(Some(record)) if record.claims.expires_at > now => {
                    debug!(fingerprint = %fp, "session cache hit");
                    return Ok(record.claims);
                }
                Ok(_) => {}
                Err(e) => warn!(fingerprint = %fp, error = %e, "session cache read failed"),
            }
        }

        let claims = self.issuer.validate(token)?;

        if cache_usable && let Some(ttl) = claims.remaining_seconds(now) {
            let record = SessionRecord {
                claims: claims.clone(),
                cached_at: now,
            };
            if let Err(e) = self.cache.put(fp, &record, Duration::from_secs(ttl)).await {
                warn!(fingerprint = %fp, error = %e, "session cache write-back failed");
            }
        }

        Ok(claims)
    }

    /// Cache a freshly issued token and index it under its (principal, application).
    pub async fn store_token(&self, token: &str, claims: &TokenClaims) -> Result<(), AuthError> {
        let fp = Fingerprint::of(token);
        let now = Utc::now().timestamp();
        let ttl = Duration::from_secs(claims.remaining_seconds(now).unwrap_or(0));

        let record = SessionRecord {
            claims: claims.clone(),
            cached_at: now,
        };
        self.cache.put(&fp, &record, ttl).await?;
        self.cache
            .track_active(claims.principal_id, claims.application_id, &fp)
            .await?;

        self.audit.record(
            AuthEvent::new(AuthEventKind::TokenIssued)
                .scope(claims.principal_id, claims.application_id)
                .token_kind(claims.kind()),
        );
        Ok(())
    }

    /// Revoke one token. Safe to call repeatedly.
    pub async fn invalidate_token(&self, token: &str) -> Result<(), AuthError> {
        let fp = Fingerprint::of(token);
        let record = self.revoke(&fp).await?;

        let mut event = AuthEvent::new(AuthEventKind::TokenInvalidated);
        if let Some(rec) = record {
            event = event
                .scope(rec.claims.principal_id, rec.claims.application_id)
                .token_kind(rec.claims.kind());
        }
        self.audit.record(event);
        Ok(())
    }

    async fn revoke(&self, fp: &Fingerprint) -> Result<Option<SessionRecord>, AuthError> {
        let record = self.cache.get(fp).await.unwrap_or_else(|e| {
            warn!(fingerprint = %fp, error = %e, "could not read session before revoking");
            None
        });

        self.cache.blacklist(fp, self.blacklist_ttl).await?;
        self.cache.remove(fp).await?;

        if let Some(rec) = &record
            && let Err(e) = self
                .cache
                .untrack(rec.claims.principal_id, rec.claims.application_id, fp)
                .await
        {
            warn!(fingerprint = %fp, error = %e, "failed to drop fingerprint from active index");
        }

        Ok(record)
    }

    /// Revoke the tracked sessions of one principal inside one application.
    ///
    /// With `kind`, only sessions of that kind are revoked and the others stay
    /// indexed; without it every tracked session goes and the index is cleared.
    /// Other applications of the same principal are never touched.
    /// Returns the number of sessions revoked.
    pub async fn invalidate_all_in_application(
        &self,
        principal_id: Uuid,
        application_id: Uuid,
        kind: Option<TokenKind>,
    ) -> Result<usize, AuthError> {
        let fingerprints = self.cache.list_active(principal_id, application_id).await?;
        let mut revoked = 0;

        for fp in fingerprints {
            let record = match self.cache.get(&fp).await {
                Ok(record) => record,
                Err(SessionCacheError::Codec(e)) => {
                    warn!(fingerprint = %fp, error = %e, "unreadable session record; treating as evicted");
                    None
                }
                Err(e) => return Err(e.into()),
            };

            match record {
                Some(rec) if rec.claims.principal_id != principal_id
                    || rec.claims.application_id != application_id =>
                {
                    warn!(fingerprint = %fp, "indexed session belongs elsewhere; dropping it from this index");
                    self.cache.untrack(principal_id, application_id, &fp).await?;
                }
                Some(rec) if kind.is_none_or(|k| rec.claims.kind() == k) => {
                    self.cache.blacklist(&fp, self.blacklist_ttl).await?;
                    self.cache.remove(&fp).await?;
                    self.cache.untrack(principal_id, application_id, &fp).await?;
                    revoked += 1;
                }
                Some(_) => {}
                // Expired or evicted. Its kind is unknown, so it is only
                // blacklisted when every kind is being revoked.
                None if kind.is_none() => {
                    self.cache.blacklist(&fp, self.blacklist_ttl).await?;
                }
                None => {}
            }
        }

        if kind.is_none() {
            self.cache.clear_active(principal_id, application_id).await?;
        }

        debug!(
            principal_id = %principal_id,
            application_id = %application_id,
            kind = ?kind,
            revoked,
            "invalidated application sessions"
        );
        let mut event = AuthEvent::new(AuthEventKind::SessionsInvalidated)
            .scope(principal_id, application_id)
            .count(revoked);
        if let Some(k) = kind {
            event = event.token_kind(k);
        }
        self.audit.record(event);

        Ok(revoked)
    }

    /// Cascade `invalidate_all_in_application` over every application the
    /// principal has tracked sessions in.
    ///
    /// Applications stay in the per-principal set: a login racing the cascade
    /// may have just added itself, and stale members age out with the index TTL.
    pub async fn invalidate_all_for_principal(&self, principal_id: Uuid) -> Result<usize, AuthError> {
        let applications = self.cache.list_applications(principal_id).await?;
        let mut revoked = 0;

        for application_id in applications {
            revoked += self
                .invalidate_all_in_application(principal_id, application_id, None)
                .await?;
        }

        Ok(revoked)
    }

    /// Rotate a refresh token into a new pair carrying `new_permissions`.
    ///
    /// The old refresh token is blacklisted before anything is minted. If
    /// minting or storing fails afterwards the whole call fails and the
    /// principal has to log in again; the old token is never reusable.
    pub async fn refresh_pair(
        &self,
        refresh_token: &str,
        new_permissions: BTreeSet<String>,
    ) -> Result<IssuedPair, AuthError> {
        let outcome = self.rotate(refresh_token, new_permissions).await;

        match &outcome {
            Ok(pair) => self.audit.record(
                AuthEvent::new(AuthEventKind::TokenRefreshed)
                    .scope(pair.refresh.claims.principal_id, pair.refresh.claims.application_id),
            ),
            Err(e) => self
                .audit
                .record(AuthEvent::new(AuthEventKind::RefreshFailed).reason(e.reason())),
        }

        outcome
    }

    async fn rotate(
        &self,
        refresh_token: &str,
        new_permissions: BTreeSet<String>,
    ) -> Result<IssuedPair, AuthError> {
        let claims = self.validate_refresh(refresh_token).await?;
        let fp = Fingerprint::of(refresh_token);

        // First writer wins; a concurrent rotation of the same token loses here.
        if !self.cache.claim_blacklist(&fp, self.blacklist_ttl).await? {
            return Err(AuthError::Blacklisted);
        }
        if let Err(e) = self.cache.remove(&fp).await {
            warn!(fingerprint = %fp, error = %e, "failed to drop rotated refresh token record");
        }
        if let Err(e) = self
            .cache
            .untrack(claims.principal_id, claims.application_id, &fp)
            .await
        {
            warn!(fingerprint = %fp, error = %e, "failed to drop rotated refresh token from index");
        }

        let pair = self
            .issuer
            .issue_pair(claims.principal_id, claims.application_id, new_permissions)?;
        self.store_token(&pair.access.token, &pair.access.claims)
            .await?;
        self.store_token(&pair.refresh.token, &pair.refresh.claims)
            .await?;

        Ok(pair)
    }
}
