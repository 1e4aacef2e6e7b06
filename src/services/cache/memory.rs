//! Process-local cache backend.
//!
//! Mirrors the subset of Valkey semantics the session layer relies on:
//! per-key TTL, SET NX, and native sets that disappear when emptied.
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::services::cache::client::{CacheClient, CacheError, CacheResult};

#[derive(Debug)]
enum Value {
    Str(String),
    Set(BTreeSet<String>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryCache {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::InvalidValue(format!("WRONGTYPE operation against key {key}"))
}

// Drop the entry if it has expired, then hand back whatever is left.
fn live<'a>(map: &'a mut HashMap<String, Entry>, key: &str, now: Instant) -> Option<&'a mut Entry> {
    if map.get(key).is_some_and(|e| !e.is_live(now)) {
        map.remove(key);
    }
    map.get_mut(key)
}

#[async_trait]
impl CacheClient for InMemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        let mut map = self.entries.lock().await;
        match live(&mut map, key, Instant::now()) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut map = self.entries.lock().await;
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> CacheResult<bool> {
        let now = Instant::now();
        let mut map = self.entries.lock().await;
        if live(&mut map, key, now).is_some() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        let now = Instant::now();
        let mut map = self.entries.lock().await;
        Ok(match map.remove(key) {
            Some(entry) if entry.is_live(now) => 1,
            _ => 0,
        })
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let mut map = self.entries.lock().await;
        Ok(live(&mut map, key, Instant::now()).is_some())
    }

    async fn set_add(&self, key: &str, member: &str) -> CacheResult<bool> {
        let now = Instant::now();
        let mut map = self.entries.lock().await;
        if map.get(key).is_some_and(|e| !e.is_live(now)) {
            map.remove(key);
        }
        let entry = map.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Set(BTreeSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(members) => Ok(members.insert(member.to_string())),
            Value::Str(_) => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> CacheResult<bool> {
        let mut map = self.entries.lock().await;
        let (removed, now_empty) = match live(&mut map, key, Instant::now()) {
            None => return Ok(false),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => (members.remove(member), members.is_empty()),
            Some(_) => return Err(wrong_type(key)),
        };
        // Redis deletes a set once its last member is gone.
        if now_empty {
            map.remove(key);
        }
        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> CacheResult<Vec<String>> {
        let mut map = self.entries.lock().await;
        match live(&mut map, key, Instant::now()) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        let mut map = self.entries.lock().await;
        match live(&mut map, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
