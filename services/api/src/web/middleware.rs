//! services/api/src/web/middleware.rs
//!
//! Bearer-token authentication.
//!
//! `authenticate` runs in front of every route. A request carrying a valid
//! `Authorization: Bearer` token gets its [`Caller`] inserted into the request
//! extensions; anything else proceeds anonymously. Handlers then pick the
//! caller up through [`AuthCaller`] (401 when absent) or [`MaybeCaller`].

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use mangati_core::Caller;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use crate::error::HttpError;
use crate::web::state::AppState;

/// Middleware that validates the bearer token, if any, and stores the caller.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let verified = bearer_token(&req).map(|token| {
        state
            .verifier
            .verify(token)
            .and_then(|claims| claims.into_caller())
    });
    match verified {
        Some(Ok(caller)) => {
            req.extensions_mut().insert(caller);
        }
        Some(Err(e)) => debug!("Rejected bearer token: {}", e),
        None => {}
    }
    next.run(req).await
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// The verified caller of a route that requires authentication.
pub struct AuthCaller(pub Caller);

impl<S: Send + Sync> FromRequestParts<S> for AuthCaller {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .map(AuthCaller)
            .ok_or_else(|| HttpError::unauthorized("Authentication required"))
    }
}

/// The caller of a route that is open to anonymous visitors.
pub struct MaybeCaller(pub Option<Caller>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeCaller {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeCaller(parts.extensions.get::<Caller>().cloned()))
    }
}
