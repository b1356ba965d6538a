use crate::circuit_breaker::CircuitState;
use crate::config::RouteConfig;
use crate::rate_limit::RateLimitInfo;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

/// Why a request was rejected, or why it was let through unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionReason {
    RouteNotFound,
    CircuitOpen,
    RateLimitExceeded,
    /// Bookkeeping failed and the request was admitted anyway (fail open).
    InternalError,
}

impl AdmissionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionReason::RouteNotFound => "route_not_found",
            AdmissionReason::CircuitOpen => "circuit_open",
            AdmissionReason::RateLimitExceeded => "rate_limit_exceeded",
            AdmissionReason::InternalError => "internal_error",
        }
    }
}

/// Pre-dispatch decision returned to the HTTP layer.
///
/// Translating a rejection into a transport status (429, 503, ...) is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct AdmissionResult {
    pub allowed: bool,
    pub reason: Option<AdmissionReason>,
    pub rate_limit: Option<RateLimitInfo>,
    pub circuit_state: Option<CircuitState>,
    pub cache_hit: bool,
    pub cached_payload: Option<Bytes>,
    /// Composite cache key for this request, when the route caches. Hand it
    /// back through [`Outcome::with_cache_key`] so the response is stored
    /// under the same vary dimensions.
    pub cache_key: Option<String>,
    pub route: Option<Arc<RouteConfig>>,
}

impl AdmissionResult {
    pub(crate) fn rejected(reason: AdmissionReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            rate_limit: None,
            circuit_state: None,
            cache_hit: false,
            cached_payload: None,
            cache_key: None,
            route: None,
        }
    }

    /// Admitted without any bookkeeping.
    pub(crate) fn fail_open(route: Arc<RouteConfig>) -> Self {
        Self {
            allowed: true,
            reason: Some(AdmissionReason::InternalError),
            route: Some(route),
            ..Self::rejected(AdmissionReason::InternalError)
        }
    }

    pub fn route_id(&self) -> Option<&str> {
        self.route.as_deref().map(|r| r.id.as_str())
    }
}

/// Downstream result reported after dispatch.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub success: bool,
    pub response_time_ms: f64,
    pub payload: Option<Bytes>,
    pub cache_key: Option<String>,
}

impl Outcome {
    pub fn success(response_time_ms: f64) -> Self {
        Self {
            success: true,
            response_time_ms,
            payload: None,
            cache_key: None,
        }
    }

    pub fn failure(response_time_ms: f64) -> Self {
        Self {
            success: false,
            ..Self::success(response_time_ms)
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_cache_key(mut self, cache_key: Option<String>) -> Self {
        self.cache_key = cache_key;
        self
    }
}
