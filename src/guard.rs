//! Resolve the user behind a request's bearer token.
//!
//! The guard only decodes the token, it does not verify its signature.
//! Routes that need a trustworthy identity must sit behind
//! [`crate::router::authenticated`] first.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};

use crate::AppState;
use crate::token::Parser;
use crate::user::{User, UserRepository};

const BEARER: &str = "Bearer";

/// Current user of a request, if any.
///
/// Resolved at most once per request; later extractions read the copy kept
/// in request extensions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CurrentUser(pub Option<User>);

/// Token-to-user resolution.
#[derive(Clone)]
pub struct Guard {
    parser: Arc<dyn Parser>,
    users: Arc<dyn UserRepository>,
}

impl Guard {
    /// Create a new [`Guard`].
    pub fn new(parser: Arc<dyn Parser>, users: Arc<dyn UserRepository>) -> Self {
        Self { parser, users }
    }

    /// User named by the bearer token in `headers`. Every failure resolves to
    /// no user.
    pub async fn resolve(&self, headers: &HeaderMap) -> Option<User> {
        let token = bearer(headers)?;
        let claims = match self.parser.parse(token) {
            Ok(claims) => claims,
            Err(err) => {
                tracing::debug!(error = %err, "bearer token not decodable");
                return None;
            },
        };

        if claims.user.id.is_empty() {
            return None;
        }

        match self.users.find_by_id(&claims.user.id).await {
            Ok(user) => user,
            Err(err) => {
                tracing::warn!(error = %err, "cannot load current user");
                None
            },
        }
    }
}

/// Token of a `Bearer` authorization header.
pub(crate) fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case(BEARER) && !token.is_empty()).then_some(token)
}

impl FromRef<AppState> for Guard {
    fn from_ref(state: &AppState) -> Guard {
        state.guard.clone()
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    Guard: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> Result<Self, Self::Rejection> {
        if let Some(current) = parts.extensions.get::<CurrentUser>() {
            return Ok(current.clone());
        }

        let guard = Guard::from_ref(state);
        let current = CurrentUser(guard.resolve(&parts.headers).await);
        parts.extensions.insert(current.clone());

        Ok(current)
    }
}
