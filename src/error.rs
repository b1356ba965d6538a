use thiserror::Error;

/// Infrastructure faults raised inside the engine.
///
/// Admission rejections are not errors; they are returned as
/// [`AdmissionResult`](crate::engine::AdmissionResult) values. These variants
/// cover bookkeeping failures, which the engine logs and then fails open on.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limit store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("route state lock poisoned: {0}")]
    LockPoisoned(String),
    #[error("config error: {0}")]
    Config(String),
}
