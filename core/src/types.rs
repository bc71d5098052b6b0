//! Domain types for the repair desk.
//!
//! Strong identifiers (`RequestId`, `UserId`), the optimistic-lock
//! [`Version`], the wire-level [`RequestStatus`] vocabulary, and the
//! [`Request`] / [`User`] entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a repair request.
///
/// Assigned by the store at insert time and never changed afterwards.
///
/// # Examples
///
/// ```
/// use repair_desk_core::types::RequestId;
///
/// let id = RequestId::new(42);
/// assert_eq!(id.value(), 42);
/// assert_eq!(id.to_string(), "42");
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(i64);

impl RequestId {
    /// Create a `RequestId` from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Unique identifier for a user (dispatcher or master).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(i64);

impl UserId {
    /// Create a `UserId` from its raw value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    #[must_use]
    pub const fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Request version number for optimistic concurrency control.
///
/// Versions start at 1 when a request is created and increment by exactly 1
/// on every successful transition. A failed transition never touches it.
///
/// # Examples
///
/// ```
/// use repair_desk_core::types::Version;
///
/// let v1 = Version::INITIAL;
/// assert_eq!(v1.checked_next(), Some(Version::new(2)));
/// assert_eq!(Version::new(i32::MAX).checked_next(), None);
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(i32);

impl Version {
    /// The version of a freshly created request.
    pub const INITIAL: Self = Self(1);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    /// The next version, or `None` once the `INTEGER` column is exhausted.
    #[must_use]
    pub const fn checked_next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Roles and actors
// ============================================================================

/// Error returned when parsing a role or status from its wire form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    /// The rejected input.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Role of a user.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates, assigns and cancels requests.
    Dispatcher,
    /// Takes and completes requests assigned to them.
    Master,
}

impl Role {
    /// Wire / database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatcher => "dispatcher",
            Self::Master => "master",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dispatcher" => Ok(Self::Dispatcher),
            "master" => Ok(Self::Master),
            _ => Err(ParseEnumError {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// The identity on whose behalf an engine operation runs.
///
/// Supplied by the caller (the authentication layer) on every call; the
/// engine never reads it from shared process state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// User id of the caller.
    pub id: UserId,
    /// Role of the caller.
    pub role: Role,
}

impl Actor {
    /// Create a new actor.
    #[must_use]
    pub const fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }

    /// Shorthand for a dispatcher actor.
    #[must_use]
    pub const fn dispatcher(id: UserId) -> Self {
        Self::new(id, Role::Dispatcher)
    }

    /// Shorthand for a master actor.
    #[must_use]
    pub const fn master(id: UserId) -> Self {
        Self::new(id, Role::Master)
    }
}

// ============================================================================
// Request status
// ============================================================================

/// Lifecycle status of a request.
///
/// The snake_case names are the wire and storage vocabulary and must not
/// change: `new`, `assigned`, `in_progress`, `done`, `canceled`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Created, waiting for a dispatcher to assign it.
    New,
    /// Assigned to a master, not yet taken.
    Assigned,
    /// Taken by the assigned master.
    InProgress,
    /// Completed (terminal).
    Done,
    /// Canceled by a dispatcher (terminal).
    Canceled,
}

impl RequestStatus {
    /// All statuses in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::New,
        Self::Assigned,
        Self::InProgress,
        Self::Done,
        Self::Canceled,
    ];

    /// Wire / database representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Canceled => "canceled",
        }
    }

    /// Whether no further transition can leave this status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Canceled)
    }

    /// Whether a request in this status must carry an assignee.
    #[must_use]
    pub const fn requires_assignee(&self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress | Self::Done)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "status",
                value: s.to_string(),
            })
    }
}

// ============================================================================
// Entities
// ============================================================================

/// Descriptive fields submitted by the public intake form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    /// Client's name.
    pub client_name: String,
    /// Contact phone.
    pub phone: String,
    /// Address where the repair is needed.
    pub address: String,
    /// Free-text problem description.
    pub problem_text: String,
}

impl NewRequest {
    /// Creates a new intake payload.
    #[must_use]
    pub fn new(
        client_name: impl Into<String>,
        phone: impl Into<String>,
        address: impl Into<String>,
        problem_text: impl Into<String>,
    ) -> Self {
        Self {
            client_name: client_name.into(),
            phone: phone.into(),
            address: address.into(),
            problem_text: problem_text.into(),
        }
    }
}

/// A repair request as persisted by the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Store-assigned identifier.
    pub id: RequestId,
    /// Client's name.
    pub client_name: String,
    /// Contact phone.
    pub phone: String,
    /// Address where the repair is needed.
    pub address: String,
    /// Free-text problem description.
    pub problem_text: String,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Master the request is assigned to, if any.
    pub assigned_to: Option<UserId>,
    /// When the request was created.
    pub created_at: DateTime<Utc>,
    /// When the request last changed.
    pub updated_at: DateTime<Utc>,
    /// Optimistic-lock token.
    pub version: Version,
}

impl Request {
    /// Checks the assignee invariant for the current status.
    ///
    /// `assigned`, `in_progress` and `done` require an assignee, `new`
    /// forbids one, and `canceled` accepts either.
    #[must_use]
    pub const fn assignment_is_consistent(&self) -> bool {
        match self.status {
            RequestStatus::New => self.assigned_to.is_none(),
            RequestStatus::Canceled => true,
            RequestStatus::Assigned | RequestStatus::InProgress | RequestStatus::Done => {
                self.assigned_to.is_some()
            }
        }
    }
}

/// A dispatcher or master.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Store-assigned identifier.
    pub id: UserId,
    /// Login handle.
    pub username: String,
    /// Role of the user.
    pub role: Role,
    /// Display name.
    pub full_name: String,
}

impl User {
    /// The actor this user acts as.
    #[must_use]
    pub const fn as_actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

/// Fields for registering a user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Login handle (unique).
    pub username: String,
    /// Role of the user.
    pub role: Role,
    /// Display name.
    pub full_name: String,
}

impl NewUser {
    /// Creates a new user payload.
    #[must_use]
    pub fn new(username: impl Into<String>, role: Role, full_name: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            role,
            full_name: full_name.into(),
        }
    }
}
