use serde::Serialize;

/// Operational counters for one route.
///
/// Derived fields (`error_rate_percent`, `throughput_per_minute`,
/// `cache_hit_rate`) are recomputed on every write, so reading a snapshot is a
/// plain clone with no side effects.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouteMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub failure_count: u64,
    /// Running mean over completed (success + failure) requests.
    pub average_response_time_ms: f64,
    /// Highest response time ever observed. Kept under the legacy p95 name.
    pub p95_response_time_ms: f64,
    /// Highest response time ever observed. Kept under the legacy p99 name.
    pub p99_response_time_ms: f64,
    pub error_rate_percent: f64,
    /// `total_requests / 60`, a coarse rate proxy rather than a sliding rate.
    pub throughput_per_minute: f64,
    pub cache_hits: u64,
    /// `cache_hits / total_requests` as a percentage, capped at 100.
    pub cache_hit_rate: f64,
    pub active_connections: u64,
    /// Epoch millis of the most recent admission.
    pub last_request_at: Option<u64>,
}

impl RouteMetrics {
    pub fn on_admitted(&mut self, now: u64) {
        self.total_requests += 1;
        self.active_connections += 1;
        self.last_request_at = Some(now);
        self.refresh();
    }

    pub fn on_cache_hit(&mut self) {
        self.cache_hits += 1;
        self.refresh();
    }

    pub fn on_outcome(&mut self, success: bool, response_time_ms: f64) {
        self.active_connections = self.active_connections.saturating_sub(1);
        if success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }

        let n = (self.success_count + self.failure_count) as f64;
        self.average_response_time_ms =
            (self.average_response_time_ms * (n - 1.0) + response_time_ms) / n;

        if response_time_ms > self.p95_response_time_ms {
            self.p95_response_time_ms = response_time_ms;
        }
        if response_time_ms > self.p99_response_time_ms {
            self.p99_response_time_ms = response_time_ms;
        }
        self.refresh();
    }

    fn refresh(&mut self) {
        if self.total_requests == 0 {
            self.error_rate_percent = 0.0;
            self.cache_hit_rate = 0.0;
        } else {
            let total = self.total_requests as f64;
            self.error_rate_percent = self.failure_count as f64 / total * 100.0;
            self.cache_hit_rate = (self.cache_hits as f64 / total * 100.0).min(100.0);
        }
        self.throughput_per_minute = self.total_requests as f64 / 60.0;
    }
}
