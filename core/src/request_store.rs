//! Request store trait and related types.
//!
//! This module defines the contract between the lifecycle engine and durable
//! storage. Beyond plain reads and inserts it exposes exactly one write
//! primitive for existing requests: [`RequestStore::conditional_update`].
//!
//! # Conditional update
//!
//! A conditional update names a request id, the statuses the request must
//! currently be in, optionally the master it must currently be assigned to,
//! and the new values to write. The store applies the new values and
//! increments `version` **if and only if** every predicate holds at the
//! moment of the write, and returns the updated row. Otherwise it writes
//! nothing and returns `None`.
//!
//! The check and the write must be one atomic step: no other conditional
//! update on the same row may observe or modify it in between. For
//! `PostgreSQL` this is a single `UPDATE ... WHERE ... RETURNING` statement;
//! the in-memory store holds its write lock across check and mutation.
//!
//! # Implementations
//!
//! - `PostgresRequestStore` (in `repair-desk-postgres`): production
//! - `InMemoryRequestStore` (in `repair-desk-testing`): fast, deterministic tests
//!
//! # Example
//!
//! ```no_run
//! use repair_desk_core::request_store::{ConditionalUpdate, RequestStore, StoreError};
//! use repair_desk_core::types::{RequestId, RequestStatus, UserId};
//! use repair_desk_core::Utc;
//!
//! async fn take<S: RequestStore>(store: &S) -> Result<bool, StoreError> {
//!     let update = ConditionalUpdate::new(
//!         RequestId::new(1),
//!         &[RequestStatus::Assigned],
//!         RequestStatus::InProgress,
//!         Utc::now(),
//!     )
//!     .expect_assignee(UserId::new(7));
//!
//!     Ok(store.conditional_update(update).await?.is_some())
//! }
//! ```

use crate::types::{NewRequest, NewUser, Request, RequestId, RequestStatus, User, UserId};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
///
/// A failed precondition is **not** an error: `conditional_update` reports it
/// as `Ok(None)`.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain type.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A uniqueness constraint was violated (e.g. duplicate username).
    #[error("Duplicate {entity}: {key}")]
    Duplicate {
        /// Kind of entity (`user`, ...).
        entity: &'static str,
        /// The conflicting key.
        key: String,
    },
}

/// Atomic compare-and-set over one request row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConditionalUpdate {
    /// Row to update.
    pub id: RequestId,
    /// The row's current status must be one of these.
    pub expected_status: &'static [RequestStatus],
    /// When set, the row's current assignee must equal this user.
    pub expected_assignee: Option<UserId>,
    /// Status to write.
    pub set_status: RequestStatus,
    /// When set, assignee to write; `None` leaves the assignee unchanged.
    pub set_assignee: Option<UserId>,
    /// Timestamp written to `updated_at`.
    pub updated_at: DateTime<Utc>,
}

impl ConditionalUpdate {
    /// Move `id` from any of `expected_status` to `set_status`.
    #[must_use]
    pub const fn new(
        id: RequestId,
        expected_status: &'static [RequestStatus],
        set_status: RequestStatus,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            expected_status,
            expected_assignee: None,
            set_status,
            set_assignee: None,
            updated_at,
        }
    }

    /// Additionally require the row to be assigned to `user`.
    #[must_use]
    pub const fn expect_assignee(mut self, user: UserId) -> Self {
        self.expected_assignee = Some(user);
        self
    }

    /// Assignee to write on success.
    #[must_use]
    pub const fn set_assignee(mut self, user: UserId) -> Self {
        self.set_assignee = Some(user);
        self
    }

    /// Whether `request` satisfies every predicate of this update.
    ///
    /// Stores that evaluate predicates in process (rather than in SQL) use
    /// this inside their critical section.
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        request.id == self.id
            && self.expected_status.contains(&request.status)
            && self
                .expected_assignee
                .is_none_or(|user| request.assigned_to == Some(user))
    }

    /// Applies the new values to `request` and bumps its version.
    ///
    /// Callers must have checked [`matches`](Self::matches) under the same
    /// lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] without touching `request` if its
    /// version cannot be incremented, as `PostgreSQL` rejects an `INTEGER`
    /// overflow.
    pub fn apply(&self, request: &mut Request) -> Result<(), StoreError> {
        let version = request.version.checked_next().ok_or_else(|| {
            StoreError::Database(format!("version overflow on request {}", request.id))
        })?;
        request.status = self.set_status;
        if let Some(user) = self.set_assignee {
            request.assigned_to = Some(user);
        }
        request.updated_at = self.updated_at;
        request.version = version;
        Ok(())
    }
}

/// Filter for listing requests. Every set field must match exactly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestFilter {
    /// Only requests in this status.
    pub status: Option<RequestStatus>,
    /// Only requests assigned to this master.
    pub assigned_to: Option<UserId>,
}

impl RequestFilter {
    /// Match every request.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            status: None,
            assigned_to: None,
        }
    }

    /// Match requests in `status`.
    #[must_use]
    pub const fn with_status(status: RequestStatus) -> Self {
        Self {
            status: Some(status),
            assigned_to: None,
        }
    }

    /// Match requests assigned to `user`.
    #[must_use]
    pub const fn assigned_to(user: UserId) -> Self {
        Self {
            status: None,
            assigned_to: Some(user),
        }
    }

    /// Whether `request` passes this filter.
    #[must_use]
    pub fn matches(&self, request: &Request) -> bool {
        self.status.is_none_or(|s| request.status == s)
            && self.assigned_to.is_none_or(|u| request.assigned_to == Some(u))
    }
}

/// Store abstraction for requests and the user directory.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the engine shares one store across
/// every concurrent caller.
///
/// # Dyn Compatibility
///
/// Methods return boxed futures instead of using `async fn` so the store can
/// be held as `Arc<dyn RequestStore>`.
pub trait RequestStore: Send + Sync {
    /// Insert a new request in status `new`, unassigned, at version 1.
    ///
    /// `created_at` is written to both `created_at` and `updated_at`.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn insert_request(
        &self,
        request: NewRequest,
        created_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Request>;

    /// Point lookup by id. Returns `None` when the id does not exist.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    /// - `Decode`: stored row is malformed
    fn get_request(&self, id: RequestId) -> StoreFuture<'_, Option<Request>>;

    /// List requests passing `filter`, ordered by `created_at` ascending
    /// (ties broken by id ascending).
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    /// - `Decode`: a stored row is malformed
    fn list_requests(&self, filter: RequestFilter) -> StoreFuture<'_, Vec<Request>>;

    /// Atomically apply `update` if all of its predicates hold.
    ///
    /// Returns the updated row (with `version` incremented by one) on success
    /// and `None` if the id does not exist or any predicate failed.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    /// - `Decode`: the returned row is malformed
    fn conditional_update(&self, update: ConditionalUpdate) -> StoreFuture<'_, Option<Request>>;

    /// Register a user.
    ///
    /// # Errors
    ///
    /// - `Duplicate`: username already taken
    /// - `Database`: connection or query failed
    fn insert_user(&self, user: NewUser) -> StoreFuture<'_, User>;

    /// Look up a user by id.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    /// - `Decode`: stored row is malformed
    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>>;

    /// Look up a user by login handle.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    /// - `Decode`: stored row is malformed
    fn find_user_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<User>>;

    /// All users with the master role, ordered by id.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    /// - `Decode`: a stored row is malformed
    fn list_masters(&self) -> StoreFuture<'_, Vec<User>>;

    /// Number of registered users.
    ///
    /// # Errors
    ///
    /// - `Database`: connection or query failed
    fn count_users(&self) -> StoreFuture<'_, u64>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Version;

    fn request(status: RequestStatus, assigned_to: Option<UserId>) -> Request {
        let now = Utc::now();
        Request {
            id: RequestId::new(1),
            client_name: "Client".to_string(),
            phone: "12345".to_string(),
            address: "Somewhere 1".to_string(),
            problem_text: "Broken faucet".to_string(),
            status,
            assigned_to,
            created_at: now,
            updated_at: now,
            version: Version::new(2),
        }
    }

    #[test]
    fn matches_checks_status_set() {
        let update = ConditionalUpdate::new(
            RequestId::new(1),
            &[RequestStatus::New, RequestStatus::Assigned],
            RequestStatus::Canceled,
            Utc::now(),
        );
        assert!(update.matches(&request(RequestStatus::New, None)));
        assert!(update.matches(&request(RequestStatus::Assigned, Some(UserId::new(3)))));
        assert!(!update.matches(&request(RequestStatus::Done, Some(UserId::new(3)))));
    }

    #[test]
    fn matches_checks_id() {
        let update = ConditionalUpdate::new(
            RequestId::new(2),
            &[RequestStatus::New],
            RequestStatus::Assigned,
            Utc::now(),
        );
        assert!(!update.matches(&request(RequestStatus::New, None)));
    }

    #[test]
    fn matches_checks_assignee() {
        let update = ConditionalUpdate::new(
            RequestId::new(1),
            &[RequestStatus::Assigned],
            RequestStatus::InProgress,
            Utc::now(),
        )
        .expect_assignee(UserId::new(7));
        assert!(update.matches(&request(RequestStatus::Assigned, Some(UserId::new(7)))));
        assert!(!update.matches(&request(RequestStatus::Assigned, Some(UserId::new(8)))));
        assert!(!update.matches(&request(RequestStatus::Assigned, None)));
    }

    #[test]
    fn apply_bumps_version_and_keeps_assignee_when_unset() {
        let mut row = request(RequestStatus::Assigned, Some(UserId::new(7)));
        let at = row.updated_at + chrono::Duration::seconds(60);
        let update = ConditionalUpdate::new(
            RequestId::new(1),
            &[RequestStatus::Assigned],
            RequestStatus::Canceled,
            at,
        );

        update.apply(&mut row).unwrap();

        assert_eq!(row.status, RequestStatus::Canceled);
        assert_eq!(row.assigned_to, Some(UserId::new(7)));
        assert_eq!(row.updated_at, at);
        assert_eq!(row.version, Version::new(3));
    }

    #[test]
    fn apply_refuses_version_overflow() {
        let mut row = request(RequestStatus::Assigned, Some(UserId::new(7)));
        row.version = Version::new(i32::MAX);
        let before = row.clone();
        let update = ConditionalUpdate::new(
            RequestId::new(1),
            &[RequestStatus::Assigned],
            RequestStatus::Canceled,
            row.updated_at,
        );

        let err = update.apply(&mut row).unwrap_err();

        assert!(matches!(err, StoreError::Database(_)));
        assert_eq!(row, before);
    }

    #[test]
    fn filter_matches_exactly() {
        let row = request(RequestStatus::Assigned, Some(UserId::new(7)));
        assert!(RequestFilter::all().matches(&row));
        assert!(RequestFilter::with_status(RequestStatus::Assigned).matches(&row));
        assert!(!RequestFilter::with_status(RequestStatus::New).matches(&row));
        assert!(RequestFilter::assigned_to(UserId::new(7)).matches(&row));
        assert!(!RequestFilter::assigned_to(UserId::new(8)).matches(&row));
    }

    #[test]
    fn store_error_display() {
        let err = StoreError::Duplicate {
            entity: "user",
            key: "master1".to_string(),
        };
        assert_eq!(err.to_string(), "Duplicate user: master1");
    }
}
