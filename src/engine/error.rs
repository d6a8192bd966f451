use ulid::Ulid;

use crate::model::ReservationStatus;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed request: bad interval, start in the past, self-booking,
    /// policy bounds violated. Recoverable by the caller; never retried.
    Validation(&'static str),
    /// An overlapping holding reservation was found. The id names it.
    Conflict(Ulid),
    NotFound(Ulid),
    /// Actor attempted an action they do not own.
    Authorization(&'static str),
    /// Event not valid from the current status. Distinct from the idempotent
    /// same-state repeat, which succeeds as a no-op.
    StateTransition {
        from: ReservationStatus,
        event: &'static str,
    },
    /// No pricing tier applies to the requested duration.
    Unpriceable(Ulid),
    /// Gateway authorize/capture/refund failed or timed out. The reservation
    /// stays in its pre-transition state.
    Payment(String),
    LimitExceeded(&'static str),
    Storage(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::Conflict(id) => write!(f, "conflict with reservation: {id}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Authorization(msg) => write!(f, "not authorized: {msg}"),
            EngineError::StateTransition { from, event } => {
                write!(f, "cannot {event} a {from} reservation")
            }
            EngineError::Unpriceable(id) => {
                write!(f, "resource {id} has no applicable pricing tier")
            }
            EngineError::Payment(e) => write!(f, "payment failed: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Storage(e) => write!(f, "storage error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
