//! Error taxonomy surfaced by the core.
//!
//! `VenueError` classifies adapter failures for retry and propagation
//! decisions; `FailureKind` classifies engine-level failures for the circuit
//! breaker. The two are deliberately separate: a venue error may or may not
//! become a breaker-visible failure depending on where it happens.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure modes of a venue adapter call.
#[derive(Debug, Error)]
pub enum VenueError {
    /// Retriable: timeout, connection reset, 5xx, soft rate limit.
    #[error("transient venue error: {0}")]
    Transient(String),

    /// Credential failure; the venue is disabled until operator action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Hard rate limit; callers throttle, never trip the breaker.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Contract unknown to the venue.
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-retriable venue rejection (invalid parameters, closed market).
    #[error("fatal venue error: {0}")]
    Fatal(String),
}

impl VenueError {
    /// Whether the bounded-retry policy may re-attempt this call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VenueError::Transient(_) | VenueError::RateLimited(_))
    }
}

/// Engine failure classification consumed by the circuit breaker and alerter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// An execution attempt errored before or during firing.
    ExecutionFailure,
    /// One leg filled and the other did not (or could not be confirmed).
    AsymmetricExecution,
    /// WebSocket reconnect attempts exhausted for a venue.
    ConnectionLost,
    /// Daily realized loss breached the configured limit.
    DailyLossLimit,
    /// Hard rate limit observed; slows the scan loop, never pauses.
    RateLimitExceeded,
    /// Repeated state snapshot I/O failure.
    StateUnrecoverable,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailureKind::ExecutionFailure => "execution_failure",
            FailureKind::AsymmetricExecution => "asymmetric_execution",
            FailureKind::ConnectionLost => "connection_lost",
            FailureKind::DailyLossLimit => "daily_loss_limit",
            FailureKind::RateLimitExceeded => "rate_limit_exceeded",
            FailureKind::StateUnrecoverable => "state_unrecoverable",
        };
        write!(f, "{}", s)
    }
}

/// Convenience alias for adapter results.
pub type VenueResult<T> = Result<T, VenueError>;
