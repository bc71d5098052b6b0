//! The request lifecycle engine.
//!
//! # Transitions
//!
//! | Operation  | Role       | From                | To            | Owner check |
//! |------------|------------|---------------------|---------------|-------------|
//! | `assign`   | dispatcher | `new`               | `assigned`    | no          |
//! | `cancel`   | dispatcher | `new`, `assigned`   | `canceled`    | no          |
//! | `take`     | master     | `assigned`          | `in_progress` | yes         |
//! | `complete` | master     | `in_progress`       | `done`        | yes         |
//!
//! Each transition is issued as ONE [`ConditionalUpdate`]. The engine never
//! reads a request to decide whether to write it. After a failed write it may
//! read the row once to tell the caller *why* (missing id, wrong status, wrong
//! master); that read never feeds another write.
//!
//! # Failure mapping
//!
//! `take` is the one operation expected to lose races between masters, so
//! any failed `take` surfaces as the retryable [`LifecycleError::Conflict`].
//! `assign`, `cancel` and `complete` surface as terminal
//! [`LifecycleError::NotFound`] or [`LifecycleError::InvalidTransition`].

use crate::environment::Clock;
use crate::error::{LifecycleError, Operation, Rejection};
use crate::request_store::{ConditionalUpdate, RequestFilter, RequestStore};
use crate::types::{Actor, NewRequest, Request, RequestId, RequestStatus, Role, User, UserId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Definition of one state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Operation performing the transition.
    pub operation: Operation,
    /// Role allowed to perform it.
    pub role: Role,
    /// Statuses the request must be in.
    pub from: &'static [RequestStatus],
    /// Status written on success.
    pub to: RequestStatus,
    /// Whether the acting master must be the assignee.
    pub owner_scoped: bool,
}

impl Transition {
    /// Whether this transition may leave `status`.
    #[must_use]
    pub fn permits(&self, status: RequestStatus) -> bool {
        self.from.contains(&status)
    }

    /// The guarded update performing this transition on `id`.
    #[must_use]
    pub const fn update(&self, id: RequestId, now: DateTime<Utc>) -> ConditionalUpdate {
        ConditionalUpdate::new(id, self.from, self.to, now)
    }
}

/// `new` → `assigned`, by a dispatcher.
pub const ASSIGN: Transition = Transition {
    operation: Operation::Assign,
    role: Role::Dispatcher,
    from: &[RequestStatus::New],
    to: RequestStatus::Assigned,
    owner_scoped: false,
};

/// `new` | `assigned` → `canceled`, by a dispatcher.
pub const CANCEL: Transition = Transition {
    operation: Operation::Cancel,
    role: Role::Dispatcher,
    from: &[RequestStatus::New, RequestStatus::Assigned],
    to: RequestStatus::Canceled,
    owner_scoped: false,
};

/// `assigned` → `in_progress`, by the assigned master.
pub const TAKE: Transition = Transition {
    operation: Operation::Take,
    role: Role::Master,
    from: &[RequestStatus::Assigned],
    to: RequestStatus::InProgress,
    owner_scoped: true,
};

/// `in_progress` → `done`, by the assigned master.
pub const COMPLETE: Transition = Transition {
    operation: Operation::Complete,
    role: Role::Master,
    from: &[RequestStatus::InProgress],
    to: RequestStatus::Done,
    owner_scoped: true,
};

/// Every transition out of an existing request.
pub const TRANSITIONS: [Transition; 4] = [ASSIGN, CANCEL, TAKE, COMPLETE];

/// Stateless lifecycle engine.
///
/// Holds only shared handles to the store and the clock, so it is cheap to
/// clone and safe to call from any number of tasks at once.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn RequestStore>,
    clock: Arc<dyn Clock>,
}

impl LifecycleEngine {
    /// Create a new engine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn RequestStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn RequestStore> {
        &self.store
    }

    /// Create a request in status `new` from the public intake.
    ///
    /// # Errors
    ///
    /// - `Validation`: a field is shorter than its minimum; nothing persisted
    /// - `Store`: the insert failed
    #[tracing::instrument(skip(self, request))]
    pub async fn create_request(&self, request: NewRequest) -> Result<Request, LifecycleError> {
        if let Err(errors) = request.validate() {
            tracing::debug!(errors = %errors, "Request intake rejected");
            record(Operation::Create, "rejected");
            return Err(errors.into());
        }

        let created = self.store.insert_request(request, self.clock.now()).await?;

        tracing::info!(request_id = %created.id, "Request created");
        metrics::counter!("repair_desk.requests.created").increment(1);
        record(Operation::Create, "applied");
        Ok(created)
    }

    /// List requests for a dispatcher, optionally filtered by status.
    ///
    /// `status` is the raw wire value; it must be one of the five lifecycle
    /// statuses. Results are ordered by creation time ascending.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: caller is not a dispatcher
    /// - `InvalidFilter`: `status` is non-empty and not a lifecycle status
    /// - `Store`: the query failed
    #[tracing::instrument(skip(self))]
    pub async fn list_requests(
        &self,
        actor: &Actor,
        status: Option<&str>,
    ) -> Result<Vec<Request>, LifecycleError> {
        require_role(actor, Role::Dispatcher, Operation::List)?;

        // An empty `?status=` means no filter
        let status = status
            .filter(|raw| !raw.is_empty())
            .map(|raw| {
                raw.parse::<RequestStatus>()
                    .map_err(|e| LifecycleError::InvalidFilter(e.value().to_string()))
            })
            .transpose()?;

        let filter = RequestFilter {
            status,
            assigned_to: None,
        };
        Ok(self.store.list_requests(filter).await?)
    }

    /// List the requests assigned to the calling master.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: caller is not a master
    /// - `Store`: the query failed
    #[tracing::instrument(skip(self))]
    pub async fn list_my_requests(&self, actor: &Actor) -> Result<Vec<Request>, LifecycleError> {
        require_role(actor, Role::Master, Operation::ListMine)?;
        Ok(self
            .store
            .list_requests(RequestFilter::assigned_to(actor.id))
            .await?)
    }

    /// Read one request.
    ///
    /// Dispatchers see every request; a master sees only requests assigned
    /// to them and gets `NotFound` for any other id.
    ///
    /// # Errors
    ///
    /// - `NotFound`: id does not exist or is not visible to the caller
    /// - `Store`: the query failed
    #[tracing::instrument(skip(self))]
    pub async fn get_request(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<Request, LifecycleError> {
        let request = self
            .store
            .get_request(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))?;

        match actor.role {
            Role::Dispatcher => Ok(request),
            Role::Master if request.assigned_to == Some(actor.id) => Ok(request),
            Role::Master => Err(LifecycleError::NotFound(id)),
        }
    }

    /// All masters a dispatcher can choose from.
    ///
    /// # Errors
    ///
    /// - `Store`: the query failed
    pub async fn list_masters(&self) -> Result<Vec<User>, LifecycleError> {
        Ok(self.store.list_masters().await?)
    }

    /// Assign a `new` request to a master.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: caller is not a dispatcher
    /// - `UnknownMaster`: `master_id` does not exist or is not a master
    /// - `NotFound`: request id does not exist
    /// - `InvalidTransition`: request is not `new`
    /// - `Store`: the update failed
    #[tracing::instrument(skip(self))]
    pub async fn assign_request(
        &self,
        actor: &Actor,
        id: RequestId,
        master_id: UserId,
    ) -> Result<Request, LifecycleError> {
        require_role(actor, ASSIGN.role, ASSIGN.operation)?;

        let is_master = self
            .store
            .get_user(master_id)
            .await?
            .is_some_and(|user| user.role == Role::Master);
        if !is_master {
            tracing::debug!(master_id = %master_id, "Assign target is not a master");
            record(Operation::Assign, "rejected");
            return Err(LifecycleError::UnknownMaster(master_id));
        }

        let update = ASSIGN.update(id, self.clock.now()).set_assignee(master_id);
        self.transition(&ASSIGN, actor, update).await
    }

    /// Cancel a request that is `new` or `assigned`.
    ///
    /// The assignee, if any, is kept.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: caller is not a dispatcher
    /// - `NotFound`: request id does not exist
    /// - `InvalidTransition`: request is already `in_progress`, `done` or
    ///   `canceled`
    /// - `Store`: the update failed
    #[tracing::instrument(skip(self))]
    pub async fn cancel_request(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<Request, LifecycleError> {
        require_role(actor, CANCEL.role, CANCEL.operation)?;

        let update = CANCEL.update(id, self.clock.now());
        self.transition(&CANCEL, actor, update).await
    }

    /// Take an `assigned` request into work.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: caller is not a master
    /// - `Conflict`: the request is not `assigned` to the caller (a
    ///   concurrent take won, it belongs to another master, or it was
    ///   never assigned / does not exist)
    /// - `Store`: the update failed
    #[tracing::instrument(skip(self))]
    pub async fn take_request(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<Request, LifecycleError> {
        require_role(actor, TAKE.role, TAKE.operation)?;

        let update = TAKE.update(id, self.clock.now()).expect_assignee(actor.id);
        self.transition(&TAKE, actor, update).await
    }

    /// Complete a request the caller has in progress.
    ///
    /// # Errors
    ///
    /// - `Forbidden`: caller is not a master
    /// - `NotFound`: request id does not exist
    /// - `InvalidTransition`: request is not `in_progress`, or is assigned
    ///   to another master
    /// - `Store`: the update failed
    #[tracing::instrument(skip(self))]
    pub async fn complete_request(
        &self,
        actor: &Actor,
        id: RequestId,
    ) -> Result<Request, LifecycleError> {
        require_role(actor, COMPLETE.role, COMPLETE.operation)?;

        let update = COMPLETE.update(id, self.clock.now()).expect_assignee(actor.id);
        self.transition(&COMPLETE, actor, update).await
    }

    async fn transition(
        &self,
        transition: &Transition,
        actor: &Actor,
        update: ConditionalUpdate,
    ) -> Result<Request, LifecycleError> {
        let id = update.id;

        if let Some(updated) = self.store.conditional_update(update).await? {
            tracing::info!(
                request_id = %id,
                operation = %transition.operation,
                status = %updated.status,
                version = %updated.version,
                "Request transitioned"
            );
            record(transition.operation, "applied");
            return Ok(updated);
        }

        let error = self.explain_rejection(transition, actor, id).await?;
        if error.is_retryable() {
            tracing::warn!(request_id = %id, operation = %transition.operation, "Transition lost a race");
            record(transition.operation, "conflict");
        } else {
            tracing::debug!(request_id = %id, error = %error, "Transition rejected");
            record(transition.operation, "rejected");
        }
        Err(error)
    }

    /// Classifies a conditional update that matched no row.
    async fn explain_rejection(
        &self,
        transition: &Transition,
        actor: &Actor,
        id: RequestId,
    ) -> Result<LifecycleError, LifecycleError> {
        if transition.operation == Operation::Take {
            return Ok(LifecycleError::Conflict { request_id: id });
        }

        let Some(current) = self.store.get_request(id).await? else {
            return Ok(LifecycleError::NotFound(id));
        };

        let rejection = if transition.owner_scoped && transition.permits(current.status) {
            Rejection::NotAssignee {
                actor: actor.id,
                assigned_to: current.assigned_to,
            }
        } else {
            Rejection::WrongStatus {
                expected: transition.from,
                actual: current.status,
            }
        };

        Ok(LifecycleError::InvalidTransition {
            request_id: id,
            operation: transition.operation,
            rejection,
        })
    }
}

fn require_role(actor: &Actor, role: Role, operation: Operation) -> Result<(), LifecycleError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(LifecycleError::Forbidden {
            operation,
            role: actor.role,
        })
    }
}

fn record(operation: Operation, outcome: &'static str) {
    metrics::counter!(
        "repair_desk.transitions",
        "operation" => operation.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}
