//! Domain error types.
//!
//! `DomainError` is the single error type threaded through the domain and
//! service layers. `ErrorKind` is the small, stable classification the
//! RPC/HTTP boundary switches on — callers match `.kind()`, not variants,
//! so adding a new variant never touches the boundary layer.

use thiserror::Error;
use uuid::Uuid;

/// Stable error classification exposed across the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    NotAuthorized,
    InvalidState,
    ValidationFailed,
    DuplicateDetected,
    CapacityExceeded,
    ExternalUnavailable,
    Timeout,
    Conflict,
}

impl ErrorKind {
    /// Retryable kinds get an internal capped-backoff retry before they
    /// surface to the caller. `NotAuthorized` is never retried.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalUnavailable | Self::Timeout)
    }
}

/// Domain-level errors that can occur anywhere in the orchestrator.
#[derive(Debug, Error, Clone)]
pub enum DomainError {
    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(Uuid),

    #[error("phase not found: {0}")]
    PhaseNotFound(Uuid),

    #[error("agent not found: {0}")]
    AgentNotFound(String),

    #[error("memory not found: {0}")]
    MemoryNotFound(Uuid),

    #[error("result not found: {0}")]
    ResultNotFound(Uuid),

    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("task queue has reached max_concurrent_agents ({0})")]
    CapacityExceeded(usize),

    #[error("task is a near-duplicate of {0} (similarity {1:.3})")]
    DuplicateDetected(Uuid, f32),

    #[error("blocking {0} on {1} would create a cycle in the ticket graph")]
    BlockingCycle(Uuid, Uuid),

    #[error("agent id supplied by caller does not match any live agent")]
    NotAuthorized,

    #[error("timed out waiting on {0}")]
    TimedOut(String),

    #[error("external provider unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl DomainError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::TaskNotFound(_)
            | Self::TicketNotFound(_)
            | Self::WorkflowNotFound(_)
            | Self::PhaseNotFound(_)
            | Self::AgentNotFound(_)
            | Self::MemoryNotFound(_)
            | Self::ResultNotFound(_) => ErrorKind::NotFound,
            Self::InvalidStateTransition { .. } => ErrorKind::InvalidState,
            Self::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Self::DuplicateDetected(_, _) => ErrorKind::DuplicateDetected,
            Self::BlockingCycle(_, _) | Self::ConcurrencyConflict { .. } => ErrorKind::Conflict,
            Self::NotAuthorized => ErrorKind::NotAuthorized,
            Self::TimedOut(_) => ErrorKind::Timeout,
            Self::ExternalUnavailable(_) => ErrorKind::ExternalUnavailable,
            Self::ValidationFailed(_) | Self::ExecutionFailed(_) => ErrorKind::ValidationFailed,
            Self::DatabaseError(_) | Self::SerializationError(_) => ErrorKind::ExternalUnavailable,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DomainError::DatabaseError("row not found".to_string()),
            other => DomainError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_not_found_maps_to_not_found_kind() {
        assert_eq!(DomainError::TaskNotFound(Uuid::nil()).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn external_unavailable_is_retryable() {
        assert!(DomainError::ExternalUnavailable("down".into()).kind().is_retryable());
        assert!(!DomainError::NotAuthorized.kind().is_retryable());
    }

    #[test]
    fn blocking_cycle_is_conflict() {
        let err = DomainError::BlockingCycle(Uuid::nil(), Uuid::nil());
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn sqlx_row_not_found_converts() {
        let domain: DomainError = sqlx::Error::RowNotFound.into();
        assert!(matches!(domain, DomainError::DatabaseError(_)));
    }
}
