#![allow(dead_code)]
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Typed failure taxonomy for the decision core. Every public operation on
/// the engine returns one of these instead of swallowing the problem; none
/// of them may escape a tick boundary unlogged.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No account snapshot or no candles from the gateway. The capital
    /// context flips to Offline and the tick is abandoned.
    #[error("gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Broker declined an entry or close. No retry inside the same tick.
    #[error("order rejected: {0}")]
    OrderRejected(String),

    /// A signal was already accepted for this candle fingerprint.
    #[error("stale fingerprint for candle {0}")]
    StaleFingerprint(DateTime<Utc>),

    /// RiskGate refused the order. Not an error to the operator, only a
    /// dropped proposal.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Internal consistency check failed (zones vs equity, peak vs current).
    /// Fatal in debug builds; in release the context is rebuilt from the
    /// last consistent snapshot.
    #[error("invariant breach: {0}")]
    InvariantBreach(String),

    /// Cumulative loss or consecutive losses crossed the emergency line.
    #[error("emergency stop engaged")]
    EmergencyStop,

    #[error("config error: {0}")]
    Config(String),
}

impl EngineError {
    /// Rejections are normal decision outcomes; only the rest should ever
    /// surface as operator-visible errors.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            EngineError::StaleFingerprint(_) | EngineError::ConstraintViolation(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
