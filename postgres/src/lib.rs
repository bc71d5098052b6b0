//! `PostgreSQL` request store for the repair desk.
//!
//! This crate provides a `PostgreSQL`-backed implementation of the
//! `RequestStore` trait from `repair-desk-core`. Every lifecycle transition is
//! one `UPDATE ... WHERE ... RETURNING` statement, so the predicate check and
//! the write happen atomically under the row lock `PostgreSQL` takes for the
//! update. Two masters racing to take the same request serialize on that
//! lock; the loser re-evaluates the `WHERE` clause against the committed row
//! and matches nothing.
//!
//! # Example
//!
//! ```ignore
//! use repair_desk_postgres::PostgresRequestStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresRequestStore::new("postgres://localhost/repair_desk").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use repair_desk_core::request_store::{
    ConditionalUpdate, RequestFilter, RequestStore, StoreError, StoreFuture,
};
use repair_desk_core::types::{
    NewRequest, NewUser, Request, RequestId, RequestStatus, Role, User, UserId, Version,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const REQUEST_COLUMNS: &str = "id, client_name, phone, address, problem_text, status, \
                               assigned_to, created_at, updated_at, version";

const USER_COLUMNS: &str = "id, username, role, full_name";

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: i64,
    client_name: String,
    phone: String,
    address: String,
    problem_text: String,
    status: String,
    assigned_to: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i32,
}

impl TryFrom<RequestRow> for Request {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<RequestStatus>()
            .map_err(|e| StoreError::Decode(format!("request {}: {e}", row.id)))?;

        Ok(Self {
            id: RequestId::new(row.id),
            client_name: row.client_name,
            phone: row.phone,
            address: row.address,
            problem_text: row.problem_text,
            status,
            assigned_to: row.assigned_to.map(UserId::new),
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: Version::new(row.version),
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    role: String,
    full_name: String,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Decode(format!("user {}: {e}", row.id)))?;

        Ok(Self {
            id: UserId::new(row.id),
            username: row.username,
            role,
            full_name: row.full_name,
        })
    }
}

fn database_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn decode_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// `PostgreSQL`-backed request store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct PostgresRequestStore {
    pool: PgPool,
}

impl PostgresRequestStore {
    /// Connect to `database_url` with a default pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Cheap `SELECT 1` round-trip, run once at startup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the database is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }
}

impl RequestStore for PostgresRequestStore {
    fn insert_request(
        &self,
        request: NewRequest,
        created_at: DateTime<Utc>,
    ) -> StoreFuture<'_, Request> {
        Box::pin(async move {
            let query = format!(
                "INSERT INTO requests
                     (client_name, phone, address, problem_text, status, created_at, updated_at, version)
                 VALUES ($1, $2, $3, $4, $5, $6, $6, $7)
                 RETURNING {REQUEST_COLUMNS}"
            );
            let row: RequestRow = sqlx::query_as(&query)
                .bind(&request.client_name)
                .bind(&request.phone)
                .bind(&request.address)
                .bind(&request.problem_text)
                .bind(RequestStatus::New.as_str())
                .bind(created_at)
                .bind(Version::INITIAL.value())
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;

            Request::try_from(row)
        })
    }

    fn get_request(&self, id: RequestId) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move {
            let query = format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = $1");
            let row: Option<RequestRow> = sqlx::query_as(&query)
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            row.map(Request::try_from).transpose()
        })
    }

    fn list_requests(&self, filter: RequestFilter) -> StoreFuture<'_, Vec<Request>> {
        Box::pin(async move {
            let query = format!(
                "SELECT {REQUEST_COLUMNS} FROM requests
                 WHERE ($1::TEXT IS NULL OR status = $1)
                   AND ($2::BIGINT IS NULL OR assigned_to = $2)
                 ORDER BY created_at ASC, id ASC"
            );
            let rows: Vec<RequestRow> = sqlx::query_as(&query)
                .bind(filter.status.map(|s| s.as_str()))
                .bind(filter.assigned_to.map(UserId::value))
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;

            decode_all(rows)
        })
    }

    fn conditional_update(&self, update: ConditionalUpdate) -> StoreFuture<'_, Option<Request>> {
        Box::pin(async move {
            let expected: Vec<&'static str> =
                update.expected_status.iter().map(RequestStatus::as_str).collect();

            // Check and write in one statement; the row lock serializes racers.
            let query = format!(
                "UPDATE requests
                 SET status = $4,
                     assigned_to = COALESCE($5, assigned_to),
                     updated_at = $6,
                     version = version + 1
                 WHERE id = $1
                   AND status = ANY($2)
                   AND ($3::BIGINT IS NULL OR assigned_to = $3)
                 RETURNING {REQUEST_COLUMNS}"
            );
            let row: Option<RequestRow> = sqlx::query_as(&query)
                .bind(update.id.value())
                .bind(expected)
                .bind(update.expected_assignee.map(UserId::value))
                .bind(update.set_status.as_str())
                .bind(update.set_assignee.map(UserId::value))
                .bind(update.updated_at)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            let matched = if row.is_some() { "matched" } else { "missed" };
            metrics::counter!("repair_desk.store.conditional_updates", "result" => matched)
                .increment(1);
            tracing::trace!(request_id = %update.id, result = matched, "Conditional update");

            row.map(Request::try_from).transpose()
        })
    }

    fn insert_user(&self, user: NewUser) -> StoreFuture<'_, User> {
        Box::pin(async move {
            let query = format!(
                "INSERT INTO users (username, role, full_name)
                 VALUES ($1, $2, $3)
                 RETURNING {USER_COLUMNS}"
            );
            let row: UserRow = sqlx::query_as(&query)
                .bind(&user.username)
                .bind(user.role.as_str())
                .bind(&user.full_name)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    if let sqlx::Error::Database(db_err) = &e {
                        if db_err.is_unique_violation() {
                            return StoreError::Duplicate {
                                entity: "user",
                                key: user.username.clone(),
                            };
                        }
                    }
                    database_error(e)
                })?;

            User::try_from(row)
        })
    }

    fn get_user(&self, id: UserId) -> StoreFuture<'_, Option<User>> {
        Box::pin(async move {
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
            let row: Option<UserRow> = sqlx::query_as(&query)
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            row.map(User::try_from).transpose()
        })
    }

    fn find_user_by_username<'a>(&'a self, username: &'a str) -> StoreFuture<'a, Option<User>> {
        Box::pin(async move {
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1");
            let row: Option<UserRow> = sqlx::query_as(&query)
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            row.map(User::try_from).transpose()
        })
    }

    fn list_masters(&self) -> StoreFuture<'_, Vec<User>> {
        Box::pin(async move {
            let query = format!("SELECT {USER_COLUMNS} FROM users WHERE role = $1 ORDER BY id");
            let rows: Vec<UserRow> = sqlx::query_as(&query)
                .bind(Role::Master.as_str())
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;

            decode_all(rows)
        })
    }

    fn count_users(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;

            u64::try_from(count).map_err(|e| StoreError::Decode(format!("user count: {e}")))
        })
    }
}
