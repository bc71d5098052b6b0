//! Error taxonomy of the lifecycle engine.

use crate::request_store::StoreError;
use crate::types::{RequestId, RequestStatus, Role, UserId};
use crate::validation::ValidationErrors;
use std::fmt;
use thiserror::Error;

/// Engine operations, used to label errors, logs and metrics.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Public intake.
    Create,
    /// Dispatcher lists requests.
    List,
    /// Master lists own requests.
    ListMine,
    /// Dispatcher assigns a master.
    Assign,
    /// Dispatcher cancels.
    Cancel,
    /// Master takes assigned work.
    Take,
    /// Master completes work in progress.
    Complete,
}

impl Operation {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::List => "list",
            Self::ListMine => "list_mine",
            Self::Assign => "assign",
            Self::Cancel => "cancel",
            Self::Take => "take",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which precondition of a transition failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    /// The request is not in any of the required statuses.
    WrongStatus {
        /// Statuses the operation accepts.
        expected: &'static [RequestStatus],
        /// Status observed after the failed write.
        actual: RequestStatus,
    },
    /// The status fits but the acting master is not the assignee.
    NotAssignee {
        /// The master who tried to act.
        actor: UserId,
        /// The master the request is assigned to.
        assigned_to: Option<UserId>,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongStatus { expected, actual } => {
                let expected: Vec<&str> = expected.iter().map(RequestStatus::as_str).collect();
                write!(
                    f,
                    "status is '{actual}', expected {}",
                    expected.join(" or ")
                )
            }
            Self::NotAssignee { actor, assigned_to } => match assigned_to {
                Some(owner) => write!(f, "assigned to master {owner}, not {actor}"),
                None => write!(f, "not assigned to master {actor}"),
            },
        }
    }
}

/// Errors returned by [`LifecycleEngine`](crate::lifecycle::LifecycleEngine)
/// operations.
///
/// None of them are retried by the engine. `Conflict` is the only variant a
/// caller may reasonably retry after re-reading the request.
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Intake payload failed validation; nothing was persisted.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Status filter is not one of the five lifecycle statuses.
    #[error("Invalid status filter: {0}")]
    InvalidFilter(String),

    /// Assign target does not exist or is not a master.
    #[error("User {0} is not a known master")]
    UnknownMaster(UserId),

    /// Operation is not legal from the request's current state.
    #[error("Cannot {operation} request {request_id}: {rejection}")]
    InvalidTransition {
        /// Request the operation targeted.
        request_id: RequestId,
        /// Operation that was rejected.
        operation: Operation,
        /// Precondition that failed.
        rejection: Rejection,
    },

    /// `take` lost: the request is no longer assigned to the caller in
    /// status `assigned` (a concurrent take won, or it never was).
    #[error("Request {request_id} was already taken or its status changed")]
    Conflict {
        /// Request the take targeted.
        request_id: RequestId,
    },

    /// Request id does not exist.
    #[error("Request {0} not found")]
    NotFound(RequestId),

    /// Caller's role may not perform this operation.
    #[error("Role '{role}' may not {operation}")]
    Forbidden {
        /// Operation attempted.
        operation: Operation,
        /// Caller's role.
        role: Role,
    },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ValidationErrors> for LifecycleError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl LifecycleError {
    /// Whether the caller may retry after re-reading current state.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_display_names_statuses() {
        let err = LifecycleError::InvalidTransition {
            request_id: RequestId::new(5),
            operation: Operation::Cancel,
            rejection: Rejection::WrongStatus {
                expected: &[RequestStatus::New, RequestStatus::Assigned],
                actual: RequestStatus::Done,
            },
        };
        assert_eq!(
            err.to_string(),
            "Cannot cancel request 5: status is 'done', expected new or assigned"
        );
    }

    #[test]
    fn not_assignee_display() {
        let rejection = Rejection::NotAssignee {
            actor: UserId::new(8),
            assigned_to: Some(UserId::new(7)),
        };
        assert_eq!(rejection.to_string(), "assigned to master 7, not 8");
    }

    #[test]
    fn only_conflict_is_retryable() {
        assert!(LifecycleError::Conflict { request_id: RequestId::new(1) }.is_retryable());
        assert!(!LifecycleError::NotFound(RequestId::new(1)).is_retryable());
        assert!(!LifecycleError::UnknownMaster(UserId::new(1)).is_retryable());
    }

    #[test]
    fn forbidden_display() {
        let err = LifecycleError::Forbidden {
            operation: Operation::Take,
            role: Role::Dispatcher,
        };
        assert_eq!(err.to_string(), "Role 'dispatcher' may not take");
    }
}
