use crate::cache::ResponseCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::error::GatewayError;
use crate::metrics::RouteMetrics;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Everything the engine tracks for one route, guarded by one mutex.
///
/// Admission and outcome recording for the same route serialize on this
/// lock; different routes never contend.
pub(crate) struct RouteSlot {
    route_id: String,
    state: Mutex<RouteState>,
}

pub(crate) struct RouteState {
    pub breaker: CircuitBreaker,
    pub cache: ResponseCache,
    pub metrics: RouteMetrics,
}

impl RouteSlot {
    pub fn new(route_id: &str) -> Self {
        Self {
            route_id: route_id.to_string(),
            state: Mutex::new(RouteState {
                breaker: CircuitBreaker::new(route_id),
                cache: ResponseCache::new(),
                metrics: RouteMetrics::default(),
            }),
        }
    }

    /// Lock for mutation. A poisoned lock is reported once and cleared, so
    /// the next caller gets the state back.
    pub fn lock(&self) -> Result<MutexGuard<'_, RouteState>, GatewayError> {
        match self.state.lock() {
            Ok(guard) => Ok(guard),
            Err(_) => {
                self.state.clear_poison();
                Err(GatewayError::LockPoisoned(self.route_id.clone()))
            }
        }
    }

    /// Lock for snapshot reads, tolerating poison.
    pub fn read(&self) -> MutexGuard<'_, RouteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
