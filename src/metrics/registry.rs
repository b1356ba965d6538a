use metrics::{describe_counter, describe_gauge, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Thin handle around the global metrics recorder.
///
/// After `Metrics::install()` the `metrics` crate macros (`counter!`, `gauge!`)
/// emitted by the engine are recorded. Without it they are no-ops, which is
/// what library users and unit tests get. The `PrometheusHandle` is retained
/// solely for rendering the `/metrics` endpoint.
#[derive(Clone)]
pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// Must be called **once** at startup; a second call fails because a
    /// global recorder is already set.
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new().install_recorder()?;

        // admission path
        describe_counter!(
            "gateway_admission_total",
            Unit::Count,
            "Admission decisions by route and decision"
        );
        describe_counter!(
            "gateway_rate_limit_rejected_total",
            Unit::Count,
            "Total requests rejected by the fixed-window rate limiter"
        );
        describe_counter!(
            "gateway_circuit_breaker_rejected_total",
            Unit::Count,
            "Total requests rejected by an open or probe-exhausted circuit breaker"
        );
        describe_counter!(
            "gateway_cache_hits_total",
            Unit::Count,
            "Total admissions served a cached payload"
        );
        describe_counter!(
            "gateway_admission_fail_open_total",
            Unit::Count,
            "Admissions allowed because of an internal bookkeeping fault"
        );

        // outcome path
        describe_counter!(
            "gateway_outcomes_total",
            Unit::Count,
            "Downstream outcomes reported by the HTTP layer"
        );
        describe_counter!(
            "gateway_circuit_breaker_transitions_total",
            Unit::Count,
            "Circuit breaker state transitions by route and target state"
        );

        // config & housekeeping
        describe_gauge!(
            "gateway_config_routes_total",
            Unit::Count,
            "Number of routes currently registered"
        );
        describe_counter!(
            "gateway_sweeper_evicted_total",
            Unit::Count,
            "Expired rate-limit windows and cache entries evicted by the sweeper"
        );

        Ok(Self { handle })
    }

    /// Render all metrics in Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
