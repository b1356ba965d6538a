//! End-to-end admission scenarios driven through the public engine API with a
//! manual clock.

use admission_gateway::circuit_breaker::CircuitState;
use admission_gateway::config::{GatewayConfig, RouteConfig};
use admission_gateway::engine::{AdmissionReason, HealthStatus, Outcome};
use admission_gateway::error::GatewayError;
use admission_gateway::rate_limit::{Consumption, WindowStore};
use admission_gateway::{AdmissionEngine, AdmissionRequest, Identity, ManualClock};
use http::{HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

/// 2023-11-14T22:14:00Z, aligned to a whole minute.
const START: u64 = 1_700_000_040_000;

fn setup() -> (AdmissionEngine, ManualClock) {
    let clock = ManualClock::new(START);
    (AdmissionEngine::new(Arc::new(clock.clone())), clock)
}

fn get(path: &str) -> AdmissionRequest {
    AdmissionRequest::new("GET", path)
}

fn route(id: &str, path: &str) -> RouteConfig {
    RouteConfig::new(id, "GET", path, format!("http://{id}:8080"))
}

#[test]
fn fixed_window_limits_and_rolls_over() {
    let (engine, clock) = setup();
    let mut r = route("contacts", "/api/v1/contacts");
    r.rate_limit.requests_per_window = 3;
    r.rate_limit.window_seconds = 60;
    assert!(engine.add_route(r));

    for expected_remaining in [2, 1, 0] {
        let res = engine.admit(&get("/api/v1/contacts"));
        assert!(res.allowed);
        assert_eq!(res.rate_limit.unwrap().remaining, expected_remaining);
    }

    let denied = engine.admit(&get("/api/v1/contacts"));
    assert!(!denied.allowed);
    assert_eq!(denied.reason, Some(AdmissionReason::RateLimitExceeded));
    let info = denied.rate_limit.unwrap();
    assert_eq!(info.remaining, 0);
    assert_eq!(info.retry_after_secs, Some(60));

    clock.advance(Duration::from_secs(60));
    assert!(engine.admit(&get("/api/v1/contacts")).allowed);
}

#[test]
fn window_boundary_allows_double_burst() {
    let (engine, clock) = setup();
    let mut r = route("contacts", "/contacts");
    r.rate_limit.requests_per_window = 3;
    r.rate_limit.window_seconds = 60;
    assert!(engine.add_route(r));

    clock.advance(Duration::from_secs(59));
    let mut allowed = 0;
    for _ in 0..4 {
        allowed += engine.admit(&get("/contacts")).allowed as usize;
    }
    clock.advance(Duration::from_secs(1));
    for _ in 0..4 {
        allowed += engine.admit(&get("/contacts")).allowed as usize;
    }
    assert_eq!(allowed, 6);
}

#[test]
fn per_user_windows_are_independent() {
    let (engine, _) = setup();
    let mut r = route("inbox", "/inbox");
    r.rate_limit.requests_per_window = 1;
    r.rate_limit.per_user = true;
    assert!(engine.add_route(r));

    let alice = get("/inbox").with_identity(Identity::user("alice"));
    let bob = get("/inbox").with_identity(Identity::user("bob"));
    assert!(engine.admit(&alice).allowed);
    assert!(!engine.admit(&alice).allowed);
    assert!(engine.admit(&bob).allowed);
}

#[test]
fn breaker_opens_on_threshold() {
    let (engine, _) = setup();
    let mut r = route("billing", "/billing");
    r.circuit_breaker.failure_threshold = 3;
    assert!(engine.add_route(r));

    for _ in 0..3 {
        assert!(engine.admit(&get("/billing")).allowed);
        engine.record_outcome("billing", Outcome::failure(120.0));
    }

    let res = engine.admit(&get("/billing"));
    assert!(!res.allowed);
    assert_eq!(res.reason, Some(AdmissionReason::CircuitOpen));
    assert_eq!(res.circuit_state, Some(CircuitState::Open));
    assert_eq!(
        engine.circuit_breaker_states()["billing"].state,
        CircuitState::Open
    );
}

#[test]
fn breaker_recovers_through_half_open() {
    let (engine, clock) = setup();
    let mut r = route("billing", "/billing");
    r.circuit_breaker.failure_threshold = 3;
    r.circuit_breaker.recovery_timeout_seconds = 30;
    assert!(engine.add_route(r));

    for _ in 0..3 {
        engine.record_outcome("billing", Outcome::failure(10.0));
    }
    clock.advance(Duration::from_secs(29));
    assert_eq!(
        engine.admit(&get("/billing")).reason,
        Some(AdmissionReason::CircuitOpen)
    );

    clock.advance(Duration::from_secs(1));
    let probe = engine.admit(&get("/billing"));
    assert!(probe.allowed);
    assert_eq!(probe.circuit_state, Some(CircuitState::HalfOpen));
    assert_eq!(
        engine.circuit_breaker_state("billing").unwrap().half_open_probe_count,
        1
    );

    engine.record_outcome("billing", Outcome::success(8.0));
    let state = engine.circuit_breaker_state("billing").unwrap();
    assert_eq!(state.state, CircuitState::Closed);
    assert_eq!(state.failure_count, 0);
    assert_eq!(state.next_probe_allowed_at, None);
}

#[test]
fn failed_probe_reopens() {
    let (engine, clock) = setup();
    let mut r = route("billing", "/billing");
    r.circuit_breaker.failure_threshold = 1;
    r.circuit_breaker.recovery_timeout_seconds = 30;
    assert!(engine.add_route(r));

    engine.record_outcome("billing", Outcome::failure(10.0));
    clock.advance(Duration::from_secs(30));
    assert!(engine.admit(&get("/billing")).allowed);
    engine.record_outcome("billing", Outcome::failure(10.0));

    let state = engine.circuit_breaker_state("billing").unwrap();
    assert_eq!(state.state, CircuitState::Open);
    assert_eq!(state.next_probe_allowed_at, Some(START + 60_000));
}

#[test]
fn cache_hit_then_expiry() {
    let (engine, clock) = setup();
    let mut r = route("catalog", "/catalog/:sku");
    r.cache.enabled = true;
    r.cache.ttl_seconds = 30;
    r.cache.key_prefix = "catalog".to_string();
    assert!(engine.add_route(r));

    let first = engine.admit(&get("/catalog/42"));
    assert!(!first.cache_hit);
    engine.record_outcome(
        "catalog",
        Outcome::success(5.0)
            .with_payload(r#"{"sku":42}"#)
            .with_cache_key(first.cache_key),
    );

    let hit = engine.admit(&get("/catalog/42"));
    assert!(hit.allowed);
    assert!(hit.cache_hit);
    assert_eq!(hit.cached_payload.unwrap().as_ref(), br#"{"sku":42}"#);

    clock.advance(Duration::from_secs(30));
    assert!(!engine.admit(&get("/catalog/42")).cache_hit);
}

#[test]
fn cache_hit_still_consumes_quota() {
    let (engine, _) = setup();
    let mut r = route("catalog", "/catalog");
    r.cache.enabled = true;
    r.rate_limit.requests_per_window = 2;
    assert!(engine.add_route(r));
    engine.record_outcome("catalog", Outcome::success(1.0).with_payload("page"));

    assert!(engine.admit(&get("/catalog")).cache_hit);
    assert!(engine.admit(&get("/catalog")).cache_hit);
    let third = engine.admit(&get("/catalog"));
    assert_eq!(third.reason, Some(AdmissionReason::RateLimitExceeded));
    assert!(!third.cache_hit);

    // The rejected request still found the entry, so hits outrun admissions
    // and the rate sits at its cap.
    let metrics = engine.metrics("catalog").unwrap();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.cache_hits, 3);
    assert_eq!(metrics.cache_hit_rate, 100.0);
}

#[test]
fn vary_header_separates_cache_entries() {
    let (engine, _) = setup();
    let mut r = route("catalog", "/catalog");
    r.cache.enabled = true;
    r.cache.vary_headers = vec!["accept-language".to_string()];
    assert!(engine.add_route(r));

    let lang = |value: &'static str| {
        let mut headers = HeaderMap::new();
        headers.insert("accept-language", HeaderValue::from_static(value));
        get("/catalog").with_headers(headers)
    };

    let en = engine.admit(&lang("en"));
    assert_eq!(en.cache_key.as_deref(), Some("catalog:accept-language:en"));
    engine.record_outcome(
        "catalog",
        Outcome::success(2.0).with_payload("catalog (en)").with_cache_key(en.cache_key),
    );

    let de = engine.admit(&lang("de"));
    assert!(!de.cache_hit);
    engine.record_outcome(
        "catalog",
        Outcome::success(2.0).with_payload("catalog (de)").with_cache_key(de.cache_key),
    );

    assert_eq!(
        engine.admit(&lang("en")).cached_payload.unwrap().as_ref(),
        b"catalog (en)"
    );
    assert_eq!(
        engine.admit(&lang("de")).cached_payload.unwrap().as_ref(),
        b"catalog (de)"
    );
    assert!(!engine.admit(&get("/catalog")).cache_hit);
}

#[test]
fn route_matching_requires_equal_segments() {
    let (engine, _) = setup();
    assert!(engine.add_route(route("contact", "/api/v1/contacts/:id")));

    let res = engine.admit(&get("/api/v1/contacts/42"));
    assert_eq!(res.route_id(), Some("contact"));
    for path in ["/api/v1/contacts/42/notes", "/api/v1/contacts"] {
        assert_eq!(
            engine.admit(&get(path)).reason,
            Some(AdmissionReason::RouteNotFound),
            "{path}"
        );
    }
}

#[test]
fn first_registered_route_wins() {
    let (engine, _) = setup();
    assert!(engine.add_route(route("by-id", "/users/:id")));
    assert!(engine.add_route(route("me", "/users/me")));
    assert_eq!(engine.admit(&get("/users/me")).route_id(), Some("by-id"));

    assert!(engine.remove_route("by-id"));
    assert_eq!(engine.admit(&get("/users/me")).route_id(), Some("me"));
}

#[test]
fn metrics_reads_have_no_side_effects() {
    let (engine, _) = setup();
    assert!(engine.add_route(route("users", "/users")));
    engine.admit(&get("/users"));
    engine.record_outcome("users", Outcome::success(40.0));
    engine.admit(&get("/users"));
    engine.record_outcome("users", Outcome::failure(80.0));

    let first = engine.metrics("users").unwrap();
    let second = engine.metrics("users").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.average_response_time_ms, 60.0);
    assert_eq!(first.p99_response_time_ms, 80.0);
    assert_eq!(first.error_rate_percent, 50.0);
    assert_eq!(first.active_connections, 0);
    assert_eq!(engine.all_metrics()["users"], first);
}

#[test]
fn health_boundary_at_half_open() {
    let (engine, _) = setup();
    for i in 0..4 {
        let mut r = route(&format!("r{i}"), &format!("/r{i}"));
        r.circuit_breaker.failure_threshold = 1;
        assert!(engine.add_route(r));
    }
    assert_eq!(engine.health_status().status, HealthStatus::Healthy);

    engine.record_outcome("r0", Outcome::failure(1.0));
    engine.record_outcome("r1", Outcome::failure(1.0));
    let report = engine.health_status();
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.details.open_circuit_breakers, vec!["r0", "r1"]);

    let mut fifth = route("r4", "/r4");
    fifth.circuit_breaker.failure_threshold = 1;
    assert!(engine.add_route(fifth));
    engine.record_outcome("r4", Outcome::failure(1.0));
    let report = engine.health_status();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.details.total_routes, 5);
}

#[test]
fn high_error_rate_is_unhealthy() {
    let (engine, _) = setup();
    let mut r = route("search", "/search");
    r.circuit_breaker.enabled = false;
    assert!(engine.add_route(r));

    for i in 0..10 {
        engine.admit(&get("/search"));
        let outcome = if i == 0 {
            Outcome::failure(1.0)
        } else {
            Outcome::success(1.0)
        };
        engine.record_outcome("search", outcome);
    }
    // Exactly 10% is not above the threshold.
    assert_eq!(engine.health_status().status, HealthStatus::Healthy);

    engine.admit(&get("/search"));
    engine.record_outcome("search", Outcome::failure(1.0));
    let report = engine.health_status();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.details.high_error_rate_routes, vec!["search"]);
}

#[test]
fn remove_route_drops_all_state() {
    let (engine, _) = setup();
    assert!(engine.add_route(route("users", "/users")));
    engine.admit(&get("/users"));
    assert_eq!(engine.rate_limit_window_count(), 1);

    assert!(engine.remove_route("users"));
    assert!(!engine.remove_route("users"));
    assert!(engine.metrics("users").is_none());
    assert!(engine.circuit_breaker_state("users").is_none());
    assert_eq!(engine.rate_limit_window_count(), 0);
    assert_eq!(
        engine.admit(&get("/users")).reason,
        Some(AdmissionReason::RouteNotFound)
    );
}

#[test]
fn unknown_route_updates_return_false() {
    let (engine, _) = setup();
    assert!(!engine.update_route("ghost", Default::default()));
    assert!(!engine.remove_route("ghost"));
}

struct BrokenStore;

impl WindowStore for BrokenStore {
    fn try_consume(&self, _: &str, _: &str, _: u64, _: u64) -> Result<Consumption, GatewayError> {
        Err(GatewayError::StoreUnavailable("backend offline".to_string()))
    }

    fn evict_expired(&self, _: u64) -> Result<usize, GatewayError> {
        Err(GatewayError::StoreUnavailable("backend offline".to_string()))
    }

    fn remove_route(&self, _: &str) -> Result<usize, GatewayError> {
        Ok(0)
    }

    fn len(&self) -> usize {
        0
    }
}

#[test]
fn store_failure_fails_open() {
    let clock = ManualClock::new(START);
    let engine = AdmissionEngine::with_store(Arc::new(clock), Arc::new(BrokenStore));
    assert!(engine.add_route(route("users", "/users")));

    let res = engine.admit(&get("/users"));
    assert!(res.allowed);
    assert_eq!(res.reason, Some(AdmissionReason::InternalError));
    assert!(res.rate_limit.is_none());
    assert_eq!(engine.metrics("users").unwrap().total_requests, 1);
    assert_eq!(engine.sweep_expired().rate_limit_windows, 0);
}

#[test]
fn engine_from_config_registers_routes_in_order() {
    let config: GatewayConfig = toml::from_str(
        r#"
        [[routes]]
        id = "contacts"
        path = "/api/v1/contacts/:id"

        [routes.rate_limit]
        requests_per_window = 2

        [[routes]]
        id = "health"
        path = "/health"
        method = "*"
        "#,
    )
    .unwrap();

    let engine = AdmissionEngine::from_config(&config, Arc::new(ManualClock::new(START))).unwrap();
    let ids: Vec<_> = engine.routes().iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec!["contacts", "health"]);
    assert_eq!(
        engine.route("contacts").unwrap().rate_limit.requests_per_window,
        2
    );
    assert!(engine.admit(&AdmissionRequest::new("DELETE", "/health")).allowed);
}
