//! Gateway decision engine.
//!
//! One [`AdmissionEngine`] is built at process start and shared by handle
//! (`Arc<AdmissionEngine>`) with the HTTP layer. It owns every piece of
//! per-route state: breaker, response cache and metrics in a per-route
//! bundle, and rate-limit windows in the limiter's store.

mod health;
mod result;
mod slot;

pub use health::{classify, HealthDetails, HealthReport, HealthStatus, UNHEALTHY_ERROR_RATE_PERCENT};
pub use result::{AdmissionReason, AdmissionResult, Outcome};

use crate::cache::{cache_key, CacheLookup};
use crate::circuit_breaker::{BreakerCheck, CircuitBreakerState, CircuitState};
use crate::clock::{Clock, SystemClock};
use crate::config::{GatewayConfig, RouteConfig, RouteUpdate};
use crate::context::{AdmissionRequest, Identity};
use crate::error::GatewayError;
use crate::metrics::RouteMetrics;
use crate::rate_limit::{MemoryWindowStore, RateLimitDecision, RateLimiter, WindowStore};
use crate::routing::{RouteRegistry, Upserted};
use dashmap::DashMap;
use http::HeaderMap;
use slot::RouteSlot;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Entries evicted by one housekeeping pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub rate_limit_windows: usize,
    pub cache_entries: usize,
}

pub struct AdmissionEngine {
    registry: RouteRegistry,
    slots: DashMap<String, Arc<RouteSlot>>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
    /// Serializes route mutations (add/update/remove) so the registry and
    /// the slot map never disagree about which routes exist.
    config_mu: Mutex<()>,
}

impl Default for AdmissionEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl AdmissionEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_store(clock, Arc::new(MemoryWindowStore::new()))
    }

    pub fn with_store(clock: Arc<dyn Clock>, store: Arc<dyn WindowStore>) -> Self {
        Self {
            registry: RouteRegistry::new(),
            slots: DashMap::new(),
            limiter: RateLimiter::new(store),
            clock,
            config_mu: Mutex::new(()),
        }
    }

    /// Build an engine with the configured routes registered in file order.
    pub fn from_config(config: &GatewayConfig, clock: Arc<dyn Clock>) -> Result<Self, GatewayError> {
        let engine = Self::new(clock);
        for route in &config.routes {
            if !engine.add_route(route.clone()) {
                return Err(GatewayError::Config(format!(
                    "route '{}' could not be registered",
                    route.id
                )));
            }
        }
        Ok(engine)
    }

    // -- admission path --

    /// Decide whether a request may be dispatched downstream.
    ///
    /// Checks run in order and stop at the first rejection: route
    /// resolution, circuit breaker, cache lookup (GET only; a hit does not
    /// skip the next steps), rate limit, then the admission is counted. A
    /// hit is counted at lookup, even if the rate limiter then rejects.
    pub fn admit(&self, req: &AdmissionRequest) -> AdmissionResult {
        let now = self.clock.now_millis();

        let Some(route) = self.registry.resolve(&req.method, &req.path) else {
            debug!(
                "engine: no route matched, method={}, path={}",
                req.method, req.path
            );
            count_decision("", AdmissionReason::RouteNotFound.as_str());
            return AdmissionResult::rejected(AdmissionReason::RouteNotFound);
        };

        // Route removed between resolve and here.
        let Some(slot) = self.slot(&route.id) else {
            return AdmissionResult::rejected(AdmissionReason::RouteNotFound);
        };

        let mut state = match slot.lock() {
            Ok(state) => state,
            Err(e) => {
                error!("engine: admission bookkeeping failed, failing open, route={}, error={}", route.id, e);
                metrics::counter!("gateway_admission_fail_open_total", "route" => route.id.clone())
                    .increment(1);
                return AdmissionResult::fail_open(route);
            }
        };

        let check = state.breaker.check(&route.circuit_breaker, now);
        if check == BreakerCheck::Rejected {
            debug!("engine: circuit open, route={}", route.id);
            metrics::counter!("gateway_circuit_breaker_rejected_total", "route" => route.id.clone())
                .increment(1);
            count_decision(&route.id, AdmissionReason::CircuitOpen.as_str());
            return AdmissionResult {
                circuit_state: Some(state.breaker.state()),
                route: Some(route),
                ..AdmissionResult::rejected(AdmissionReason::CircuitOpen)
            };
        }

        let mut key = None;
        let mut cached_payload = None;
        if route.cache.enabled && req.is_cacheable_method() {
            let k = cache_key(&route, &req.identity, &req.headers);
            if let CacheLookup::Hit(payload) = state.cache.lookup(&k, now) {
                state.metrics.on_cache_hit();
                metrics::counter!("gateway_cache_hits_total", "route" => route.id.clone()).increment(1);
                cached_payload = Some(payload);
            }
            key = Some(k);
        }

        let mut reason = None;
        let rate_limit = match self.limiter.check_and_consume(&route, &req.identity, now) {
            Ok(decision @ RateLimitDecision::Denied { .. }) => {
                metrics::counter!("gateway_rate_limit_rejected_total", "route" => route.id.clone())
                    .increment(1);
                count_decision(&route.id, AdmissionReason::RateLimitExceeded.as_str());
                return AdmissionResult {
                    rate_limit: Some(decision.info()),
                    circuit_state: Some(state.breaker.state()),
                    route: Some(route),
                    ..AdmissionResult::rejected(AdmissionReason::RateLimitExceeded)
                };
            }
            Ok(decision) => Some(decision.info()),
            Err(e) => {
                error!("engine: rate limiter unavailable, failing open, route={}, error={}", route.id, e);
                metrics::counter!("gateway_admission_fail_open_total", "route" => route.id.clone())
                    .increment(1);
                reason = Some(AdmissionReason::InternalError);
                None
            }
        };

        if check == BreakerCheck::Probe {
            state.breaker.consume_probe();
        }
        state.metrics.on_admitted(now);
        count_decision(&route.id, "admitted");

        AdmissionResult {
            allowed: true,
            reason,
            rate_limit,
            circuit_state: Some(state.breaker.state()),
            cache_hit: cached_payload.is_some(),
            cached_payload,
            cache_key: key,
            route: Some(route),
        }
    }

    /// Post-dispatch bookkeeping: metrics, then breaker, then cache fill.
    pub fn record_outcome(&self, route_id: &str, outcome: Outcome) {
        let now = self.clock.now_millis();
        let (Some(route), Some(slot)) = (self.registry.get(route_id), self.slot(route_id)) else {
            warn!("engine: outcome for unknown route ignored, route={}", route_id);
            return;
        };

        // `lock` has already cleared the poison; apply the outcome anyway.
        let mut state = slot.lock().unwrap_or_else(|e| {
            error!("engine: recovering route state, route={}, error={}", route_id, e);
            slot.read()
        });

        state.metrics.on_outcome(outcome.success, outcome.response_time_ms);
        metrics::counter!(
            "gateway_outcomes_total",
            "route" => route.id.clone(),
            "result" => if outcome.success { "success" } else { "failure" },
        )
        .increment(1);

        if outcome.success {
            state.breaker.record_success(&route.circuit_breaker);
        } else {
            state.breaker.record_failure(&route.circuit_breaker, now);
        }

        if outcome.success && route.cache.enabled {
            if let Some(payload) = outcome.payload {
                let key = outcome
                    .cache_key
                    .unwrap_or_else(|| cache_key(&route, &Identity::anonymous(), &HeaderMap::new()));
                state.cache.store(key, payload, route.cache.ttl_seconds, now);
            }
        }
    }

    // -- route administration --

    /// Register a route, or replace the config of an existing one in place.
    /// Returns `false` when the config is invalid.
    pub fn add_route(&self, route: RouteConfig) -> bool {
        if let Err(e) = route.validate() {
            warn!("config: route rejected, error={}", e);
            return false;
        }
        let _guard = self.config_mu.lock().unwrap_or_else(PoisonError::into_inner);
        let id = route.id.clone();
        let next = route.clone();

        // State first: a route must never resolve without its slot.
        self.slots
            .entry(id.clone())
            .or_insert_with(|| Arc::new(RouteSlot::new(&id)));

        match self.registry.upsert(route) {
            Upserted::Inserted => {
                info!("config: route added, id={}, method={}, path={}", id, next.method, next.path);
            }
            Upserted::Replaced(previous) => {
                self.reconcile(&previous, &next);
                info!("config: route replaced, id={}", id);
            }
        }
        self.update_route_metric();
        true
    }

    /// Apply a partial update. Returns `false` for an unknown id or when the
    /// result would be invalid.
    pub fn update_route(&self, route_id: &str, update: RouteUpdate) -> bool {
        let _guard = self.config_mu.lock().unwrap_or_else(PoisonError::into_inner);
        let updated = self.registry.update(route_id, &update, |next| match next.validate() {
            Ok(()) => true,
            Err(e) => {
                warn!("config: route update rejected, error={}", e);
                false
            }
        });

        match updated {
            Some((previous, next)) => {
                self.reconcile(&previous, &next);
                info!("config: route updated, id={}", route_id);
                true
            }
            None => {
                info!("config: route update ignored, id={}", route_id);
                false
            }
        }
    }

    /// Remove a route and everything tracked for it.
    pub fn remove_route(&self, route_id: &str) -> bool {
        let _guard = self.config_mu.lock().unwrap_or_else(PoisonError::into_inner);
        if self.registry.remove(route_id).is_none() {
            info!("config: route delete ignored (not found), id={}", route_id);
            return false;
        }
        self.slots.remove(route_id);
        if let Err(e) = self.limiter.remove_route(route_id) {
            error!("config: rate-limit windows not purged, id={}, error={}", route_id, e);
        }
        self.update_route_metric();
        info!("config: route deleted, id={}", route_id);
        true
    }

    /// Registered routes, in registration order.
    pub fn routes(&self) -> Vec<Arc<RouteConfig>> {
        self.registry.routes()
    }

    pub fn route(&self, route_id: &str) -> Option<Arc<RouteConfig>> {
        self.registry.get(route_id)
    }

    // -- observability --

    pub fn metrics(&self, route_id: &str) -> Option<RouteMetrics> {
        self.slot(route_id).map(|slot| slot.read().metrics.clone())
    }

    pub fn all_metrics(&self) -> HashMap<String, RouteMetrics> {
        self.snapshot(|id, slot| (id, slot.read().metrics.clone()))
    }

    pub fn circuit_breaker_state(&self, route_id: &str) -> Option<CircuitBreakerState> {
        self.slot(route_id).map(|slot| slot.read().breaker.snapshot())
    }

    pub fn circuit_breaker_states(&self) -> HashMap<String, CircuitBreakerState> {
        self.snapshot(|id, slot| (id, slot.read().breaker.snapshot()))
    }

    pub fn health_status(&self) -> HealthReport {
        let mut details = HealthDetails {
            total_routes: 0,
            open_circuit_breakers: Vec::new(),
            high_error_rate_routes: Vec::new(),
            total_requests: 0,
            active_connections: 0,
        };

        for route in self.registry.routes() {
            let Some(slot) = self.slot(&route.id) else {
                continue;
            };
            details.total_routes += 1;
            let state = slot.read();
            if state.breaker.state() == CircuitState::Open {
                details.open_circuit_breakers.push(route.id.clone());
            }
            if state.metrics.error_rate_percent > UNHEALTHY_ERROR_RATE_PERCENT {
                details.high_error_rate_routes.push(route.id.clone());
            }
            details.total_requests += state.metrics.total_requests;
            details.active_connections += state.metrics.active_connections;
        }

        HealthReport::from_details(details)
    }

    // -- housekeeping --

    /// Evict expired rate-limit windows and cache entries.
    pub fn sweep_expired(&self) -> SweepStats {
        let now = self.clock.now_millis();
        let mut stats = SweepStats::default();

        match self.limiter.evict_expired(now) {
            Ok(n) => stats.rate_limit_windows = n,
            Err(e) => error!("sweeper: rate-limit eviction failed, error={}", e),
        }

        let slots: Vec<Arc<RouteSlot>> = self.slots.iter().map(|e| e.value().clone()).collect();
        for slot in slots {
            match slot.lock() {
                Ok(mut state) => stats.cache_entries += state.cache.evict_expired(now),
                Err(e) => error!("sweeper: cache eviction skipped, error={}", e),
            }
        }

        metrics::counter!("gateway_sweeper_evicted_total", "kind" => "rate_limit_window")
            .increment(stats.rate_limit_windows as u64);
        metrics::counter!("gateway_sweeper_evicted_total", "kind" => "cache_entry")
            .increment(stats.cache_entries as u64);
        stats
    }

    pub fn rate_limit_window_count(&self) -> usize {
        self.limiter.window_count()
    }

    // -- private helpers --

    /// Clone the slot handle out of the map so no shard lock is held while
    /// the route mutex is taken.
    fn slot(&self, route_id: &str) -> Option<Arc<RouteSlot>> {
        self.slots.get(route_id).map(|e| e.value().clone())
    }

    fn snapshot<T, F>(&self, f: F) -> HashMap<String, T>
    where
        F: Fn(String, &RouteSlot) -> (String, T),
    {
        let slots: Vec<(String, Arc<RouteSlot>)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        slots.into_iter().map(|(id, slot)| f(id, &slot)).collect()
    }

    /// Bring runtime state in line with a changed route config.
    fn reconcile(&self, previous: &RouteConfig, next: &RouteConfig) {
        let Some(slot) = self.slot(&next.id) else {
            return;
        };
        let mut state = slot.read();
        if previous.cache != next.cache {
            state.cache.clear();
        }
        if !next.circuit_breaker.enabled {
            state.breaker.reset();
        }
    }

    fn update_route_metric(&self) {
        metrics::gauge!("gateway_config_routes_total").set(self.registry.len() as f64);
    }
}

fn count_decision(route_id: &str, decision: &'static str) {
    metrics::counter!(
        "gateway_admission_total",
        "route" => route_id.to_string(),
        "decision" => decision,
    )
    .increment(1);
}
