pub mod cache;
pub mod circuit_breaker;
pub mod clock;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod rate_limit;
pub mod routing;
pub mod server;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{AdmissionRequest, Identity};
pub use engine::{AdmissionEngine, AdmissionReason, AdmissionResult, HealthStatus, Outcome};
pub use error::GatewayError;
