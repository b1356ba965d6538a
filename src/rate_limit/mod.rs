//! Fixed-window rate limiting.
//!
//! Windows are aligned on epoch time: `window_start = floor(now / window) * window`.
//! Every window starts empty, so a caller can push up to `2 × requests_per_window`
//! through in a short burst that straddles a boundary. That is the accepted
//! behaviour of this limiter and is covered by tests.

pub mod store;

pub use store::{Consumption, MemoryWindowStore, WindowStore};

use crate::config::RouteConfig;
use crate::context::Identity;
use crate::error::GatewayError;
use serde::Serialize;
use std::sync::Arc;

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u64,
        remaining: u64,
        /// Epoch millis at which the current window ends.
        reset_at: u64,
    },
    Denied {
        limit: u64,
        reset_at: u64,
        retry_after_secs: u64,
    },
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }

    pub fn info(&self) -> RateLimitInfo {
        match *self {
            RateLimitDecision::Allowed {
                limit,
                remaining,
                reset_at,
            } => RateLimitInfo {
                limit,
                remaining,
                reset_at,
                retry_after_secs: None,
            },
            RateLimitDecision::Denied {
                limit,
                reset_at,
                retry_after_secs,
            } => RateLimitInfo {
                limit,
                remaining: 0,
                reset_at,
                retry_after_secs: Some(retry_after_secs),
            },
        }
    }
}

/// Quota details reported back to the HTTP layer (e.g. `X-RateLimit-*` headers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    pub limit: u64,
    pub remaining: u64,
    pub reset_at: u64,
    pub retry_after_secs: Option<u64>,
}

pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(MemoryWindowStore::new()))
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>) -> Self {
        Self { store }
    }

    /// Count one request against the route's current window.
    ///
    /// Errors only when the backing store fails; callers decide whether to
    /// fail open.
    pub fn check_and_consume(
        &self,
        route: &RouteConfig,
        identity: &Identity,
        now: u64,
    ) -> Result<RateLimitDecision, GatewayError> {
        let policy = &route.rate_limit;
        let limit = policy.requests_per_window;
        let window_ms = policy.window_seconds.saturating_mul(1000).max(1);
        let window_start = now / window_ms * window_ms;
        let window_end = window_start + window_ms;

        let key = window_key(route, identity, window_start);
        match self.store.try_consume(&route.id, &key, window_end, limit)? {
            Consumption::Consumed(count) => Ok(RateLimitDecision::Allowed {
                limit,
                remaining: limit.saturating_sub(count),
                reset_at: window_end,
            }),
            Consumption::Exhausted => {
                let retry_after_secs = window_end.saturating_sub(now).div_ceil(1000).max(1);
                tracing::debug!(
                    "rate_limit: window exhausted, route={}, key={}, retry_after_secs={}",
                    route.id,
                    key,
                    retry_after_secs
                );
                Ok(RateLimitDecision::Denied {
                    limit,
                    reset_at: window_end,
                    retry_after_secs,
                })
            }
        }
    }

    pub fn evict_expired(&self, now: u64) -> Result<usize, GatewayError> {
        self.store.evict_expired(now)
    }

    pub fn remove_route(&self, route_id: &str) -> Result<usize, GatewayError> {
        self.store.remove_route(route_id)
    }

    pub fn window_count(&self) -> usize {
        self.store.len()
    }
}

/// `routeId:windowStart[:user:<id>][:org:<id>]`
fn window_key(route: &RouteConfig, identity: &Identity, window_start: u64) -> String {
    let policy = &route.rate_limit;
    let mut key = format!("{}:{}", route.id, window_start);
    if policy.per_user {
        if let Some(ref user) = identity.user_id {
            key.push_str(":user:");
            key.push_str(user);
        }
    }
    if policy.per_organization {
        if let Some(ref org) = identity.organization_id {
            key.push_str(":org:");
            key.push_str(org);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn route(limit: u64, window_secs: u64) -> RouteConfig {
        let mut r = RouteConfig::new("contacts", "GET", "/api/v1/contacts", "svc");
        r.rate_limit.requests_per_window = limit;
        r.rate_limit.window_seconds = window_secs;
        r
    }

    #[test]
    fn test_fixed_window_allows_then_denies() {
        let limiter = RateLimiter::default();
        let r = route(3, 60);
        let anon = Identity::anonymous();
        let now = 600_000;

        for expected_remaining in [2, 1, 0] {
            match limiter.check_and_consume(&r, &anon, now).unwrap() {
                RateLimitDecision::Allowed { remaining, reset_at, .. } => {
                    assert_eq!(remaining, expected_remaining);
                    assert_eq!(reset_at, 660_000);
                }
                other => panic!("expected allowed, got {:?}", other),
            }
        }

        match limiter.check_and_consume(&r, &anon, now + 1_500).unwrap() {
            RateLimitDecision::Denied { retry_after_secs, .. } => {
                // 58.5s left in the window, rounded up.
                assert_eq!(retry_after_secs, 59);
            }
            other => panic!("expected denied, got {:?}", other),
        }
    }

    #[test]
    fn test_window_rollover_allows_again() {
        let limiter = RateLimiter::default();
        let r = route(1, 60);
        let anon = Identity::anonymous();

        assert!(limiter.check_and_consume(&r, &anon, 0).unwrap().is_allowed());
        assert!(!limiter.check_and_consume(&r, &anon, 59_999).unwrap().is_allowed());
        assert!(limiter.check_and_consume(&r, &anon, 60_000).unwrap().is_allowed());
    }

    #[test]
    fn test_boundary_burst_is_permitted() {
        let limiter = RateLimiter::default();
        let r = route(3, 60);
        let anon = Identity::anonymous();

        let mut allowed = 0;
        for t in [59_990, 59_995, 59_999, 60_000, 60_001, 60_005] {
            if limiter.check_and_consume(&r, &anon, t).unwrap().is_allowed() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 6, "fixed windows admit 2x the quota across a boundary");
    }

    #[test]
    fn test_per_user_keys_are_independent() {
        let limiter = RateLimiter::default();
        let mut r = route(1, 60);
        r.rate_limit.per_user = true;

        let alice = Identity::user("alice");
        let bob = Identity::user("bob");
        assert!(limiter.check_and_consume(&r, &alice, 0).unwrap().is_allowed());
        assert!(!limiter.check_and_consume(&r, &alice, 0).unwrap().is_allowed());
        assert!(limiter.check_and_consume(&r, &bob, 0).unwrap().is_allowed());
    }

    #[test]
    fn test_per_user_without_identity_shares_route_window() {
        let limiter = RateLimiter::default();
        let mut r = route(1, 60);
        r.rate_limit.per_user = true;

        assert!(limiter.check_and_consume(&r, &Identity::anonymous(), 0).unwrap().is_allowed());
        assert!(!limiter.check_and_consume(&r, &Identity::anonymous(), 0).unwrap().is_allowed());
    }

    #[test]
    fn test_window_key_format() {
        let mut r = route(1, 60);
        r.rate_limit.per_user = true;
        r.rate_limit.per_organization = true;
        let id = Identity::user("u1").with_organization("o9");
        assert_eq!(window_key(&r, &id, 120_000), "contacts:120000:user:u1:org:o9");

        r.rate_limit.per_user = false;
        assert_eq!(window_key(&r, &id, 0), "contacts:0:org:o9");
    }

    #[derive(Default)]
    struct FlakyStore {
        down: AtomicBool,
        inner: MemoryWindowStore,
    }

    impl WindowStore for FlakyStore {
        fn try_consume(
            &self,
            route_id: &str,
            key: &str,
            window_end: u64,
            limit: u64,
        ) -> Result<Consumption, GatewayError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(GatewayError::StoreUnavailable("down".into()));
            }
            self.inner.try_consume(route_id, key, window_end, limit)
        }

        fn evict_expired(&self, now: u64) -> Result<usize, GatewayError> {
            self.inner.evict_expired(now)
        }

        fn remove_route(&self, route_id: &str) -> Result<usize, GatewayError> {
            self.inner.remove_route(route_id)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn test_store_error_is_propagated() {
        let store = Arc::new(FlakyStore::default());
        store.down.store(true, Ordering::SeqCst);
        let limiter = RateLimiter::new(store);
        let err = limiter
            .check_and_consume(&route(1, 60), &Identity::anonymous(), 0)
            .unwrap_err();
        assert!(matches!(err, GatewayError::StoreUnavailable(_)));
    }
}
