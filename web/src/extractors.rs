//! Custom Axum extractors.
//!
//! - `ActorContext`: the authenticated caller, from `X-Actor-Id` and
//!   `X-Actor-Role`
//! - `CorrelationId`: the request correlation ID
//!
//! Authentication itself happens upstream (a gateway or session layer); by
//! the time a request reaches these handlers the caller's identity is
//! carried in the two actor headers.
//!
//! # Examples
//!
//! ```ignore
//! use repair_desk_web::extractors::{ActorContext, CorrelationId};
//!
//! async fn handler(
//!     State(state): State<AppState>,
//!     ActorContext(actor): ActorContext,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<Vec<Request>>, AppError> {
//!     tracing::info!(correlation_id = %correlation_id.0, actor = %actor.id, "Listing");
//!     Ok(Json(state.engine.list_my_requests(&actor).await?))
//! }
//! ```

use crate::error::AppError;
use crate::middleware::correlation_id_from;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Response},
};
use repair_desk_core::types::{Actor, Role, UserId};
use thiserror::Error;
use uuid::Uuid;

/// Header carrying the caller's user id.
pub const ACTOR_ID_HEADER: &str = "X-Actor-Id";

/// Header carrying the caller's role (`dispatcher` or `master`).
pub const ACTOR_ROLE_HEADER: &str = "X-Actor-Role";

/// Why the actor headers could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActorRejection {
    /// A required header is absent.
    #[error("Missing {0} header")]
    Missing(&'static str),
    /// A header is present but malformed.
    #[error("Invalid {header} header: {value}")]
    Invalid {
        /// Header name.
        header: &'static str,
        /// Raw value received.
        value: String,
    },
}

impl IntoResponse for ActorRejection {
    fn into_response(self) -> Response {
        AppError::unauthorized(self.to_string()).into_response()
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorContext(pub Actor);

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, ActorRejection> {
    let value = parts
        .headers
        .get(name)
        .ok_or(ActorRejection::Missing(name))?;
    value.to_str().map_err(|_| ActorRejection::Invalid {
        header: name,
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    })
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = ActorRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw_id = header(parts, ACTOR_ID_HEADER)?;
        let id = raw_id
            .trim()
            .parse::<i64>()
            .map_err(|_| ActorRejection::Invalid {
                header: ACTOR_ID_HEADER,
                value: raw_id.to_string(),
            })?;

        let raw_role = header(parts, ACTOR_ROLE_HEADER)?;
        let role = raw_role
            .trim()
            .parse::<Role>()
            .map_err(|_| ActorRejection::Invalid {
                header: ACTOR_ROLE_HEADER,
                value: raw_role.to_string(),
            })?;

        Ok(Self(Actor::new(UserId::new(id), role)))
    }
}

/// Correlation ID for request tracing.
///
/// Reads the id stored by the correlation middleware, falling back to the
/// `X-Correlation-ID` header, or generates a new UUID v4.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Uuid>() {
            return Ok(Self(*id));
        }

        Ok(Self(
            correlation_id_from(&parts.headers).unwrap_or_else(Uuid::new_v4),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::CORRELATION_ID_HEADER;
    use axum::http::{Request, StatusCode};

    async fn extract(req: Request<()>) -> Result<ActorContext, ActorRejection> {
        let (mut parts, ()) = req.into_parts();
        ActorContext::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_from_headers() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "7")
            .header(ACTOR_ROLE_HEADER, "master")
            .body(())
            .expect("Valid request");

        let ActorContext(actor) = extract(req).await.expect("Should extract");

        assert_eq!(actor, Actor::master(UserId::new(7)));
    }

    #[tokio::test]
    async fn test_missing_role_is_rejected() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "1")
            .body(())
            .expect("Valid request");

        let rejection = extract(req).await.expect_err("Should reject");

        assert_eq!(rejection, ActorRejection::Missing(ACTOR_ROLE_HEADER));
        assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unknown_role_is_rejected() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "1")
            .header(ACTOR_ROLE_HEADER, "admin")
            .body(())
            .expect("Valid request");

        let rejection = extract(req).await.expect_err("Should reject");

        assert!(matches!(
            rejection,
            ActorRejection::Invalid { header: ACTOR_ROLE_HEADER, ref value } if value == "admin"
        ));
    }

    #[tokio::test]
    async fn test_non_numeric_id_is_rejected() {
        let req = Request::builder()
            .header(ACTOR_ID_HEADER, "seven")
            .header(ACTOR_ROLE_HEADER, "dispatcher")
            .body(())
            .expect("Valid request");

        let rejection = extract(req).await.expect_err("Should reject");

        assert!(matches!(rejection, ActorRejection::Invalid { header: ACTOR_ID_HEADER, .. }));
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let uuid = Uuid::new_v4();
        let req = Request::builder()
            .header(CORRELATION_ID_HEADER, uuid.to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, uuid);
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_extension() {
        let stored = Uuid::new_v4();
        let req = Request::builder()
            .header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        parts.extensions.insert(stored);
        let correlation_id = CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(correlation_id.0, stored);
    }
}
