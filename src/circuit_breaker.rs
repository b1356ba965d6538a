use crate::config::CircuitBreakerPolicy;
use serde::Serialize;

/// Circuit breaker state machine: Closed → Open → HalfOpen → Closed/Open.
///
/// Per-route granularity. The breaker carries no lock of its own; it lives in
/// the route's state bundle and is mutated under that route's mutex.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    route_id: String,
    state: CircuitBreakerState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Observable breaker state. Timestamps are epoch millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<u64>,
    /// Set only while Open.
    pub next_probe_allowed_at: Option<u64>,
    pub half_open_probe_count: u32,
}

impl Default for CircuitBreakerState {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            last_failure_at: None,
            next_probe_allowed_at: None,
            half_open_probe_count: 0,
        }
    }
}

/// Result of checking the circuit breaker before a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerCheck {
    /// Breaker is closed or disabled.
    Allowed,
    /// Breaker is half-open and has probe budget left.
    Probe,
    /// Open and not yet eligible to probe, or probe budget exhausted.
    Rejected,
}

impl CircuitBreaker {
    pub fn new(route_id: impl Into<String>) -> Self {
        Self {
            route_id: route_id.into(),
            state: CircuitBreakerState::default(),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state.state
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        self.state.clone()
    }

    /// Back to a fresh Closed breaker.
    pub fn reset(&mut self) {
        self.state = CircuitBreakerState::default();
    }

    /// Admission-time inspection. May move Open → HalfOpen once the recovery
    /// timeout has elapsed, but never consumes probe budget; see
    /// [`consume_probe`](Self::consume_probe).
    pub fn check(&mut self, policy: &CircuitBreakerPolicy, now: u64) -> BreakerCheck {
        if !policy.enabled {
            return BreakerCheck::Allowed;
        }
        match self.state.state {
            CircuitState::Closed => BreakerCheck::Allowed,
            CircuitState::Open => {
                let eligible = self
                    .state
                    .next_probe_allowed_at
                    .map_or(true, |at| now >= at);
                if !eligible {
                    return BreakerCheck::Rejected;
                }
                self.transition(CircuitState::HalfOpen);
                self.state.failure_count = 0;
                self.state.next_probe_allowed_at = None;
                self.state.half_open_probe_count = 0;
                tracing::info!(
                    "circuit_breaker: half-open, route={}, probes={}",
                    self.route_id,
                    policy.half_open_max_probes
                );
                self.half_open_check(policy)
            }
            CircuitState::HalfOpen => self.half_open_check(policy),
        }
    }

    fn half_open_check(&self, policy: &CircuitBreakerPolicy) -> BreakerCheck {
        if self.state.half_open_probe_count >= policy.half_open_max_probes {
            tracing::debug!(
                "circuit_breaker: probe budget exhausted, route={}",
                self.route_id
            );
            BreakerCheck::Rejected
        } else {
            BreakerCheck::Probe
        }
    }

    /// Count an admitted half-open request against the probe budget.
    pub fn consume_probe(&mut self) {
        if self.state.state == CircuitState::HalfOpen {
            self.state.half_open_probe_count += 1;
        }
    }

    pub fn record_success(&mut self, policy: &CircuitBreakerPolicy) {
        if !policy.enabled {
            return;
        }
        match self.state.state {
            CircuitState::Closed => {
                self.state.failure_count = self.state.failure_count.saturating_sub(1);
            }
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Closed);
                self.state.failure_count = 0;
                self.state.next_probe_allowed_at = None;
                self.state.half_open_probe_count = 0;
                tracing::info!("circuit_breaker: closed (probe succeeded), route={}", self.route_id);
            }
            // Late outcome of a request admitted before the breaker opened.
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self, policy: &CircuitBreakerPolicy, now: u64) {
        if !policy.enabled {
            return;
        }
        match self.state.state {
            CircuitState::Closed => {
                let window_ms = policy.monitoring_window_seconds.saturating_mul(1000);
                if let Some(last) = self.state.last_failure_at {
                    if now.saturating_sub(last) > window_ms {
                        self.state.failure_count = 0;
                    }
                }
                self.state.failure_count += 1;
                self.state.last_failure_at = Some(now);
                if self.state.failure_count >= policy.failure_threshold {
                    self.open(policy, now);
                    tracing::warn!(
                        "circuit_breaker: opened, route={}, failures={}",
                        self.route_id,
                        self.state.failure_count
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.state.last_failure_at = Some(now);
                self.open(policy, now);
                tracing::warn!(
                    "circuit_breaker: re-opened (probe failed in half-open), route={}",
                    self.route_id
                );
            }
            CircuitState::Open => {
                self.state.last_failure_at = Some(now);
            }
        }
    }

    fn open(&mut self, policy: &CircuitBreakerPolicy, now: u64) {
        self.transition(CircuitState::Open);
        self.state.next_probe_allowed_at =
            Some(now.saturating_add(policy.recovery_timeout_seconds.saturating_mul(1000)));
        self.state.half_open_probe_count = 0;
    }

    fn transition(&mut self, to: CircuitState) {
        self.state.state = to;
        metrics::counter!(
            "gateway_circuit_breaker_transitions_total",
            "route" => self.route_id.clone(),
            "to" => to.as_str(),
        )
        .increment(1);
    }
}
