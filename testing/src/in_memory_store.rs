//! In-memory request store for fast, deterministic testing.
//!
//! [`InMemoryRequestStore`] keeps every row in a `BTreeMap` behind a single
//! `RwLock`. A conditional update checks its predicates and mutates the row
//! under one write-lock acquisition, which gives the same per-row atomicity
//! the `PostgreSQL` store gets from a single `UPDATE ... RETURNING`.

use repair_desk_core::request_store::{
    ConditionalUpdate, RequestFilter, RequestStore, StoreError, StoreFuture,
};
use repair_desk_core::types::{
    NewRequest, NewUser, Request, RequestId, RequestStatus, Role, User, UserId, Version,
};
use repair_desk_core::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

#[derive(Debug, Default)]
struct Tables {
    requests: BTreeMap<RequestId, Request>,
    users: BTreeMap<UserId, User>,
    next_request_id: i64,
    next_user_id: i64,
}

/// Number of calls made to each store primitive.
#[derive(Debug, Default)]
struct Calls {
    get_request: AtomicUsize,
    conditional_update: AtomicUsize,
}

/// Snapshot of [`InMemoryRequestStore::call_counts`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `get_request` calls.
    pub get_request: usize,
    /// `conditional_update` calls.
    pub conditional_update: usize,
}

/// In-memory [`RequestStore`].
///
/// Cloning yields a handle to the same tables.
///
/// # Example
///
/// ```
/// use repair_desk_testing::InMemoryRequestStore;
/// use repair_desk_core::request_store::RequestStore;
/// use repair_desk_core::types::{NewRequest, RequestStatus};
/// use repair_desk_core::Utc;
///
/// # tokio_test::block_on(async {
/// let store = InMemoryRequestStore::new();
/// let request = store
///     .insert_request(
///         NewRequest::new("Client", "12345", "Main st 1", "Leaking faucet"),
///         Utc::now(),
///     )
///     .await?;
/// assert_eq!(request.status, RequestStatus::New);
/// # Ok::<(), repair_desk_core::StoreError>(())
/// # }).unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRequestStore {
    tables: Arc<RwLock<Tables>>,
    calls: Arc<Calls>,
    latency: Option<Duration>,
    offline: Arc<AtomicBool>,
}

impl InMemoryRequestStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` before every operation.
    ///
    /// Widens the window between concurrent callers so race tests
    /// interleave for real. The sleep happens outside the lock.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent operation fail with [`StoreError::Database`]
    /// (or succeed again when `offline` is false), as if the database had
    /// gone away. Shared by all clones.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of requests stored.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn request_count(&self) -> usize {
        self.tables.read().unwrap().requests.len()
    }

    /// Calls made so far to the request read and write primitives.
    #[must_use]
    pub fn call_counts(&self) -> CallCounts {
        CallCounts {
            get_request: self.calls.get_request.load(Ordering::SeqCst),
            conditional_update: self.calls.conditional_update.load(Ordering::SeqCst),
        }
    }

    /// Insert a row verbatim, bypassing the lifecycle.
    ///
    /// Lets tests set up requests in any state, including ones that break
    /// invariants. The id counter skips past the inserted id.
    ///
    /// # Panics
    ///
    /// Panics if the lock is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn put_request(&self, request: Request) {
        let mut tables = self.tables.write().unwrap();
        tables.next_request_id = tables.next_request_id.max(request.id.value());
        tables.requests.insert(request.id, request);
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|e| StoreError::Database(format!("lock poisoned: {e}")))
    }

    /// Runs `op` after the configured latency.
    fn run<T, F>(&self, op: F) -> StoreFuture<'_, T>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, StoreError> + Send + 'static,
    {
        let latency = self.latency;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if self.offline.load(Ordering::SeqCst) {
                return Err(StoreError::Database("store offline".to_string()));
            }
            op(self)
        })
    }
}

fn sorted(mut requests: Vec<Request>) -> Vec<Request> {
    requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    requests
}

impl RequestStore for InMemoryRequestStore {
    fn insert_request(
        &self,
        request: NewRequest,
        created_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Request> {
        self.run(move |store| {
            let mut tables = store.write()?;
            tables.next_request_id += 1;
            let row = Request {
                id: RequestId::new(tables.next_request_id),
                client_name: request.client_name,
                phone: request.phone,
                address: request.address,
                problem_text: request.problem_text,
                status: RequestStatus::New,
                assigned_to: None,
                created_at,
                updated_at: created_at,
                version: Version::INITIAL,
            };
            tables.requests.insert(row.id, row.clone());
            Ok(row)
        })
    }

    fn get_request(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        self.calls.get_request.fetch_add(1, Ordering::SeqCst);
        self.run(move |store| Ok(store.read()?.requests.get(&id).cloned()))
    }

    fn list_requests(&self, filter: RequestFilter) -> StoreFuture<'_, Vec<Request>> {
        self.run(move |store| {
            let tables = store.read()?;
            let matching = tables
                .requests
                .values()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect();
            Ok(sorted(matching))
        })
    }

    fn conditional_update(&self, update: ConditionalUpdate) -> StoreFuture<'_, Option<Request>> {
        self.calls.conditional_update.fetch_add(1, Ordering::SeqCst);
        self.run(move |store| {
            let mut tables = store.write()?;
            let Some(row) = tables.requests.get_mut(&update.id) else {
                return Ok(None);
            };
            if !update.matches(row) {
                return Ok(None);
            }
            update.apply(row)?;
            Ok(Some(row.clone()))
        })
    }

    fn insert_user(&self, user: NewUser) -> StoreFuture<'_, User> {
        self.run(move |store| {
            let mut tables = store.write()?;
            if tables.users.values().any(|u| u.username == user.username) {
                return Err(StoreError::Duplicate {
                    entity: "user",
                    key: user.username,
                });
            }
            tables.next_user_id += 1;
            let row = User {
                id: UserId::new(tables.next_user_id),
                username: user.username,
                role: user.role,
                full_name: user.full_name,
            };
            tables.users.insert(row.id, row.clone());
            Ok(row)
        })
    }

    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        self.run(move |store| Ok(store.read()?.users.get(&id).cloned()))
    }

    fn find_user_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<User>> {
        let username = username.to_string();
        self.run(move |store| {
            Ok(store
                .read()?
                .users
                .values()
                .find(|u| u.username == username)
                .cloned())
        })
    }

    fn list_masters(&self) -> StoreFuture<'_, Vec<User>> {
        self.run(|store| {
            Ok(store
                .read()?
                .users
                .values()
                .filter(|u| u.role == Role::Master)
                .cloned()
                .collect())
        })
    }

    fn count_users(&self) -> StoreFuture<'_, u64> {
        self.run(|store| Ok(store.read()?.users.len() as u64))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn intake() -> NewRequest {
        NewRequest::new("Client", "12345", "Main st 1", "Leaking faucet")
    }

    #[tokio::test]
    async fn insert_assigns_sequential_ids() {
        let store = InMemoryRequestStore::new();
        let first = store.insert_request(intake(), Utc::now()).await.unwrap();
        let second = store.insert_request(intake(), Utc::now()).await.unwrap();

        assert_eq!(first.id, RequestId::new(1));
        assert_eq!(second.id, RequestId::new(2));
        assert_eq!(first.version, Version::INITIAL);
        assert_eq!(first.assigned_to, None);
        assert_eq!(store.request_count(), 2);
    }

    #[tokio::test]
    async fn conditional_update_applies_once() {
        let store = InMemoryRequestStore::new();
        let row = store.insert_request(intake(), Utc::now()).await.unwrap();
        let update = ConditionalUpdate::new(
            row.id,
            &[RequestStatus::New],
            RequestStatus::Assigned,
            Utc::now(),
        )
        .set_assignee(UserId::new(7));

        let first = store.conditional_update(update.clone()).await.unwrap();
        let second = store.conditional_update(update).await.unwrap();

        let first = first.unwrap();
        assert_eq!(first.status, RequestStatus::Assigned);
        assert_eq!(first.assigned_to, Some(UserId::new(7)));
        assert_eq!(first.version, Version::new(2));
        assert!(second.is_none());

        let stored = store.get_request(row.id).await.unwrap().unwrap();
        assert_eq!(stored.version, Version::new(2));
    }

    #[tokio::test]
    async fn conditional_update_on_missing_id_returns_none() {
        let store = InMemoryRequestStore::new();
        let update = ConditionalUpdate::new(
            RequestId::new(99),
            &[RequestStatus::New],
            RequestStatus::Canceled,
            Utc::now(),
        );
        assert!(store.conditional_update(update).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let store = InMemoryRequestStore::new();
        store
            .insert_user(NewUser::new("master1", Role::Master, "Ivan"))
            .await
            .unwrap();
        let err = store
            .insert_user(NewUser::new("master1", Role::Master, "Other"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "user", .. }));
    }

    #[tokio::test]
    async fn list_masters_excludes_dispatchers() {
        let store = InMemoryRequestStore::new();
        store
            .insert_user(NewUser::new("dispatcher", Role::Dispatcher, "Anna"))
            .await
            .unwrap();
        store
            .insert_user(NewUser::new("master1", Role::Master, "Ivan"))
            .await
            .unwrap();

        let masters = store.list_masters().await.unwrap();
        assert_eq!(masters.len(), 1);
        assert_eq!(masters[0].username, "master1");
        assert_eq!(store.count_users().await.unwrap(), 2);
        assert!(store.find_user_by_username("dispatcher").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn put_request_advances_id_counter() {
        let store = InMemoryRequestStore::new();
        let mut row = store.insert_request(intake(), Utc::now()).await.unwrap();
        row.id = RequestId::new(10);
        store.put_request(row);

        let next = store.insert_request(intake(), Utc::now()).await.unwrap();
        assert_eq!(next.id, RequestId::new(11));
    }

    #[tokio::test]
    async fn offline_store_fails_until_restored() {
        let store = InMemoryRequestStore::new();
        let handle = store.clone();

        handle.set_offline(true);
        let err = store.count_users().await.unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));

        handle.set_offline(false);
        assert_eq!(store.count_users().await.unwrap(), 0);
    }
}
