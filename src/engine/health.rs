use serde::Serialize;

/// A route whose error rate is above this is considered failing.
pub const UNHEALTHY_ERROR_RATE_PERCENT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthDetails {
    pub total_routes: usize,
    pub open_circuit_breakers: Vec<String>,
    pub high_error_rate_routes: Vec<String>,
    pub total_requests: u64,
    pub active_connections: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub details: HealthDetails,
}

impl HealthReport {
    pub fn from_details(details: HealthDetails) -> Self {
        let status = classify(
            details.total_routes,
            details.open_circuit_breakers.len(),
            !details.high_error_rate_routes.is_empty(),
        );
        Self { status, details }
    }
}

/// Unhealthy when any route fails too often or strictly more than half of
/// all routes have an open breaker; degraded when at least one is open.
pub fn classify(total_routes: usize, open_breakers: usize, any_high_error_rate: bool) -> HealthStatus {
    if any_high_error_rate || open_breakers * 2 > total_routes {
        HealthStatus::Unhealthy
    } else if open_breakers > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}
