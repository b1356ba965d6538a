use crate::config::{RouteConfig, VaryDimension};
use crate::context::Identity;
use bytes::Bytes;
use http::HeaderMap;
use std::collections::HashMap;

/// A cached response body.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Bytes,
    /// Epoch millis. The entry is dead once `now >= expires_at`.
    pub expires_at: u64,
}

impl CacheEntry {
    fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(Bytes),
    Miss,
}

/// Per-route TTL store of successful response bodies.
///
/// Owned by the route's state bundle, so it needs no synchronization of its
/// own. Expired entries are dropped lazily on read and eagerly by the sweeper.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: HashMap<String, CacheEntry>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&mut self, key: &str, now: u64) -> CacheLookup {
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return CacheLookup::Hit(entry.payload.clone()),
            Some(_) => {}
            None => return CacheLookup::Miss,
        }
        self.entries.remove(key);
        CacheLookup::Miss
    }

    pub fn store(&mut self, key: String, payload: Bytes, ttl_seconds: u64, now: u64) {
        let expires_at = now.saturating_add(ttl_seconds.saturating_mul(1000));
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                payload,
                expires_at,
            },
        );
    }

    pub fn evict_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Build the composite cache key for a request:
/// `prefix[:user:<id>][:org:<id>][:<header>:<value>]...`
///
/// The prefix falls back to the route id when none is configured. Vary
/// dimensions without a value on the request are left out of the key.
pub fn cache_key(route: &RouteConfig, identity: &Identity, headers: &HeaderMap) -> String {
    let policy = &route.cache;
    let mut key = if policy.key_prefix.is_empty() {
        route.id.clone()
    } else {
        policy.key_prefix.clone()
    };

    if policy.vary_on.contains(&VaryDimension::User) {
        if let Some(ref user) = identity.user_id {
            key.push_str(":user:");
            key.push_str(user);
        }
    }
    if policy.vary_on.contains(&VaryDimension::Organization) {
        if let Some(ref org) = identity.organization_id {
            key.push_str(":org:");
            key.push_str(org);
        }
    }
    for name in &policy.vary_headers {
        let value = headers
            .get(name.as_str())
            .and_then(|v| v.to_str().ok());
        if let Some(value) = value {
            key.push(':');
            key.push_str(name);
            key.push(':');
            key.push_str(value);
        }
    }
    key
}
