//! Axum HTTP surface for the repair desk.
//!
//! Handlers are thin: they decode the caller from the actor headers, call
//! one [`LifecycleEngine`](repair_desk_core::LifecycleEngine) operation and
//! map the outcome to JSON or to an [`AppError`].
//!
//! # Request Flow
//!
//! 1. **Correlation middleware** tags the request and opens a tracing span
//! 2. **Extract** the actor (`X-Actor-Id`, `X-Actor-Role`), path, query and body
//! 3. **Dispatch** to the lifecycle engine
//! 4. **Map** the result or `LifecycleError` to an HTTP response
//!
//! # Example
//!
//! ```ignore
//! use repair_desk_web::{AppState, build_router};
//!
//! let app = build_router(AppState::new(engine));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{ACTOR_ID_HEADER, ACTOR_ROLE_HEADER, ActorContext, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::build_router;
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
