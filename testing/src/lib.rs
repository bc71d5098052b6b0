//! # Repair Desk Testing
//!
//! Testing utilities and helpers for the repair desk.
//!
//! This crate provides:
//! - [`InMemoryRequestStore`]: a `RequestStore` with the same atomicity as
//!   the `PostgreSQL` store, for fast deterministic tests
//! - Deterministic clocks
//! - Fixtures for a seeded desk (one dispatcher, two masters)
//! - proptest strategies for intake payloads and operation sequences
//!
//! ## Example
//!
//! ```
//! use repair_desk_testing::helpers::{TestDesk, valid_new_request};
//!
//! # tokio_test::block_on(async {
//! let desk = TestDesk::new().await;
//! let request = desk.engine.create_request(valid_new_request()).await?;
//! let assigned = desk
//!     .engine
//!     .assign_request(&desk.dispatcher, request.id, desk.master.id)
//!     .await?;
//! assert_eq!(assigned.assigned_to, Some(desk.master.id));
//! # Ok::<(), repair_desk_core::LifecycleError>(())
//! # }).unwrap();
//! ```

pub mod in_memory_store;

pub use in_memory_store::{CallCounts, InMemoryRequestStore};

/// Deterministic clocks.
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use repair_desk_core::environment::Clock;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use repair_desk_testing::mocks::FixedClock;
    /// use repair_desk_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every reading.
    ///
    /// Gives each created request a distinct `created_at` so ordering tests
    /// do not depend on id tie-breaking.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing `step` per reading.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            let mut next = self
                .next
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fixtures for engine-level tests.
pub mod helpers {
    use super::InMemoryRequestStore;
    use super::mocks::test_clock;
    use repair_desk_core::environment::Clock;
    use repair_desk_core::lifecycle::LifecycleEngine;
    use repair_desk_core::request_store::RequestStore;
    use repair_desk_core::types::{Actor, NewRequest, NewUser, Role, User};
    use std::sync::Arc;

    /// An intake payload that passes validation.
    #[must_use]
    pub fn valid_new_request() -> NewRequest {
        NewRequest::new("Иван Иванов", "12345", "ул. Ленина 1", "течёт кран постоянно")
    }

    /// An engine over an in-memory store with one dispatcher and two masters.
    #[derive(Clone)]
    pub struct TestDesk {
        /// Engine under test.
        pub engine: LifecycleEngine,
        /// Backing store, for inspection.
        pub store: InMemoryRequestStore,
        /// The dispatcher actor.
        pub dispatcher: Actor,
        /// First master.
        pub master: User,
        /// Second master.
        pub other_master: User,
    }

    impl TestDesk {
        /// Seeded desk on a fixed clock.
        ///
        /// # Panics
        ///
        /// Panics if seeding the in-memory store fails.
        pub async fn new() -> Self {
            Self::with_store(InMemoryRequestStore::new(), Arc::new(test_clock())).await
        }

        /// Seeded desk on the given store and clock.
        ///
        /// # Panics
        ///
        /// Panics if seeding the store fails.
        #[allow(clippy::expect_used)]
        pub async fn with_store(store: InMemoryRequestStore, clock: Arc<dyn Clock>) -> Self {
            let dispatcher = store
                .insert_user(NewUser::new("dispatcher", Role::Dispatcher, "Анна Петрова"))
                .await
                .expect("seed dispatcher");
            let master = store
                .insert_user(NewUser::new("master1", Role::Master, "Иван Сидоров"))
                .await
                .expect("seed master1");
            let other_master = store
                .insert_user(NewUser::new("master2", Role::Master, "Дмитрий Козлов"))
                .await
                .expect("seed master2");

            let engine = LifecycleEngine::new(Arc::new(store.clone()), clock);

            Self {
                engine,
                store,
                dispatcher: dispatcher.as_actor(),
                master,
                other_master,
            }
        }

        /// The first master as an actor.
        #[must_use]
        pub const fn master_actor(&self) -> Actor {
            self.master.as_actor()
        }

        /// The second master as an actor.
        #[must_use]
        pub const fn other_master_actor(&self) -> Actor {
            self.other_master.as_actor()
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;
    use repair_desk_core::types::NewRequest;

    /// Operations a property test can drive against a desk.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum Step {
        /// Create a new request.
        Create,
        /// Dispatcher assigns request `index` to master `master` (0 or 1).
        Assign {
            /// Index into the created requests (wrapped).
            index: usize,
            /// Which master.
            master: usize,
        },
        /// Dispatcher cancels request `index`.
        Cancel {
            /// Index into the created requests (wrapped).
            index: usize,
        },
        /// Master `master` takes request `index`.
        Take {
            /// Index into the created requests (wrapped).
            index: usize,
            /// Which master.
            master: usize,
        },
        /// Master `master` completes request `index`.
        Complete {
            /// Index into the created requests (wrapped).
            index: usize,
            /// Which master.
            master: usize,
        },
    }

    /// Any single step.
    pub fn arb_step() -> impl Strategy<Value = Step> {
        prop_oneof![
            Just(Step::Create),
            (0..8usize, 0..2usize).prop_map(|(index, master)| Step::Assign { index, master }),
            (0..8usize).prop_map(|index| Step::Cancel { index }),
            (0..8usize, 0..2usize).prop_map(|(index, master)| Step::Take { index, master }),
            (0..8usize, 0..2usize).prop_map(|(index, master)| Step::Complete { index, master }),
        ]
    }

    /// A sequence of steps that always starts with a create.
    pub fn arb_steps(max_len: usize) -> impl Strategy<Value = Vec<Step>> {
        prop::collection::vec(arb_step(), 1..max_len).prop_map(|mut steps| {
            steps.insert(0, Step::Create);
            steps
        })
    }

    /// Intake payloads that pass validation.
    pub fn arb_valid_new_request() -> impl Strategy<Value = NewRequest> {
        (
            "\\PC{2,30}",
            "[0-9+() -]{5,20}",
            "\\PC{5,60}",
            "\\PC{10,120}",
        )
            .prop_map(|(name, phone, address, problem)| {
                NewRequest::new(name, phone, address, problem)
            })
    }
}

/// Install a test-writer tracing subscriber, ignoring repeated calls.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "repair_desk_core=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use helpers::{TestDesk, valid_new_request};
pub use mocks::{FixedClock, SteppingClock, test_clock};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use repair_desk_core::environment::Clock;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn stepping_clock_advances() {
        let start = test_clock().now();
        let clock = SteppingClock::new(start, Duration::seconds(1));
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start + Duration::seconds(1));
    }
}
