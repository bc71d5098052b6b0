//! # Repair Desk Core
//!
//! Request lifecycle engine and store contract for a repair-service desk.
//!
//! A dispatcher creates, assigns and cancels repair requests; masters (field
//! workers) take and complete the requests assigned to them. Every request
//! moves through a fixed lifecycle:
//!
//! ```text
//!            assign            take               complete
//!   new ───────────► assigned ──────► in_progress ──────────► done
//!    │                  │
//!    └──── cancel ──────┴────► canceled
//! ```
//!
//! ## Concurrency model
//!
//! The [`LifecycleEngine`](lifecycle::LifecycleEngine) holds no state of its
//! own. Each transition is a single
//! [`conditional_update`](request_store::RequestStore::conditional_update)
//! against the store, matching on id, expected status and (for master
//! operations) the expected assignee. The store applies the write and bumps
//! the version only if every predicate still holds, so two masters racing to
//! take the same request cannot both win.
//!
//! ## Example
//!
//! ```ignore
//! use repair_desk_core::lifecycle::LifecycleEngine;
//! use repair_desk_core::types::{Actor, NewRequest, Role, UserId};
//!
//! let engine = LifecycleEngine::new(store, clock);
//! let request = engine.create_request(new_request).await?;
//!
//! let dispatcher = Actor::new(UserId::new(1), Role::Dispatcher);
//! engine.assign_request(&dispatcher, request.id, UserId::new(7)).await?;
//!
//! let master = Actor::new(UserId::new(7), Role::Master);
//! let taken = engine.take_request(&master, request.id).await?;
//! assert_eq!(taken.version, 3);
//! ```

pub mod error;
pub mod lifecycle;
pub mod request_store;
pub mod types;
pub mod validation;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{LifecycleError, Operation, Rejection};
pub use lifecycle::LifecycleEngine;
pub use request_store::{ConditionalUpdate, RequestFilter, RequestStore, StoreError};
pub use types::{
    Actor, NewRequest, NewUser, Request, RequestId, RequestStatus, Role, User, UserId, Version,
};

/// Environment module - Dependency injection traits
///
/// External dependencies of the engine are abstracted behind traits and
/// injected at construction time.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use repair_desk_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = clock.now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
