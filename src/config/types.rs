use crate::error::GatewayError;
use serde::{Deserialize, Deserializer, Serialize};

/// Deserialize a `T` that implements `Default`, treating JSON `null` the same as
/// a missing field (returns `T::default()`).  Use with:
///   `#[serde(default, deserialize_with = "deserialize_null_default")]`
fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Registration order is significant: the first matching enabled route wins.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub routes: Vec<RouteConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// How often expired rate-limit windows and cache entries are evicted (seconds).
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_interval(),
        }
    }
}

fn default_sweep_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_listen")]
    pub listen: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            listen: default_admin_listen(),
        }
    }
}

fn default_admin_listen() -> String {
    "0.0.0.0:9091".to_string()
}

/// A gateway route and the admission policies attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub id: String,

    /// Path pattern. Segments starting with `:` match any single segment.
    pub path: String,

    /// HTTP method, compared case-insensitively. `*` matches any method.
    #[serde(default = "default_method")]
    pub method: String,

    /// Opaque downstream identifier, interpreted by the hosting HTTP layer.
    #[serde(default)]
    pub target: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub rate_limit: RateLimitPolicy,

    #[serde(default)]
    pub cache: CachePolicy,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerPolicy,
}

impl RouteConfig {
    /// Route with default policies: rate limited, breaker enabled, cache off.
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            method: method.into(),
            target: target.into(),
            enabled: true,
            rate_limit: RateLimitPolicy::default(),
            cache: CachePolicy::default(),
            circuit_breaker: CircuitBreakerPolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.id.is_empty() {
            return Err(GatewayError::Config(format!(
                "route with path '{}' has empty id",
                self.path
            )));
        }
        if !self.path.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "route '{}': path '{}' must start with '/'",
                self.id, self.path
            )));
        }
        if self.method.is_empty() {
            return Err(GatewayError::Config(format!(
                "route '{}' has empty method",
                self.id
            )));
        }
        if self.rate_limit.window_seconds == 0 || self.rate_limit.requests_per_window == 0 {
            return Err(GatewayError::Config(format!(
                "route '{}': rate_limit requires non-zero 'requests_per_window' and 'window_seconds'",
                self.id
            )));
        }
        let cb = &self.circuit_breaker;
        if cb.enabled && (cb.failure_threshold == 0 || cb.half_open_max_probes == 0) {
            return Err(GatewayError::Config(format!(
                "route '{}': circuit_breaker requires non-zero 'failure_threshold' and 'half_open_max_probes'",
                self.id
            )));
        }
        Ok(())
    }
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_true() -> bool {
    true
}

/// Fixed-window quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    #[serde(default = "default_requests_per_window")]
    pub requests_per_window: u64,

    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Carried for config compatibility; fixed windows do not use it.
    #[serde(default)]
    pub burst: u64,

    /// Key windows additionally by caller user id.
    #[serde(default)]
    pub per_user: bool,

    /// Key windows additionally by caller organization id.
    #[serde(default)]
    pub per_organization: bool,

    /// Reserved for cost accounting; every admission consumes quota.
    #[serde(default)]
    pub skip_successful_requests: bool,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            requests_per_window: default_requests_per_window(),
            window_seconds: default_window_seconds(),
            burst: 0,
            per_user: false,
            per_organization: false,
            skip_successful_requests: false,
        }
    }
}

fn default_requests_per_window() -> u64 {
    100
}

fn default_window_seconds() -> u64 {
    60
}

/// Identity dimensions that can be folded into a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaryDimension {
    #[serde(alias = "user_id")]
    User,
    #[serde(alias = "org", alias = "organization_id")]
    Organization,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,

    /// Empty means "use the route id".
    #[serde(default)]
    pub key_prefix: String,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub vary_on: Vec<VaryDimension>,

    /// Header names whose values are folded into the key, in this order.
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub vary_headers: Vec<String>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_seconds: default_cache_ttl(),
            key_prefix: String::new(),
            vary_on: Vec::new(),
            vary_headers: Vec::new(),
        }
    }
}

fn default_cache_ttl() -> u64 {
    300
}

/// State machine: Closed → Open → HalfOpen → Closed/Open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerPolicy {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cb_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_cb_recovery_timeout")]
    pub recovery_timeout_seconds: u64,

    /// Failures further apart than this do not accumulate.
    #[serde(default = "default_cb_monitoring_window")]
    pub monitoring_window_seconds: u64,

    #[serde(default = "default_cb_half_open_probes")]
    pub half_open_max_probes: u32,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_cb_failure_threshold(),
            recovery_timeout_seconds: default_cb_recovery_timeout(),
            monitoring_window_seconds: default_cb_monitoring_window(),
            half_open_max_probes: default_cb_half_open_probes(),
        }
    }
}

fn default_cb_failure_threshold() -> u32 {
    5
}

fn default_cb_recovery_timeout() -> u64 {
    60
}

fn default_cb_monitoring_window() -> u64 {
    300
}

fn default_cb_half_open_probes() -> u32 {
    3
}

/// Partial route update. `None` leaves the field untouched; the id never changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteUpdate {
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
    #[serde(default)]
    pub cache: Option<CachePolicy>,
    #[serde(default)]
    pub circuit_breaker: Option<CircuitBreakerPolicy>,
}

impl RouteUpdate {
    /// Apply onto a copy of `route`.
    pub fn apply(&self, route: &RouteConfig) -> RouteConfig {
        let mut next = route.clone();
        if let Some(ref path) = self.path {
            next.path = path.clone();
        }
        if let Some(ref method) = self.method {
            next.method = method.clone();
        }
        if let Some(ref target) = self.target {
            next.target = target.clone();
        }
        if let Some(enabled) = self.enabled {
            next.enabled = enabled;
        }
        if let Some(ref rl) = self.rate_limit {
            next.rate_limit = rl.clone();
        }
        if let Some(ref cache) = self.cache {
            next.cache = cache.clone();
        }
        if let Some(ref cb) = self.circuit_breaker {
            next.circuit_breaker = cb.clone();
        }
        next
    }
}
