//! HTTP surface.

pub mod login;
pub mod logout;
pub mod me;
pub mod refresh_token;
pub mod status;

use axum::extract::{FromRequest, Request, State, rejection::JsonRejection};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use validator::Validate;

use crate::auth::TokenPair;
use crate::error::{Result, ServerError};
use crate::guard::bearer;
use crate::AppState;

pub const TOKEN_TYPE: &str = "Bearer";

/// Body returned on login and refresh.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token_type: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

impl From<TokenPair> for TokenResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            token_type: TOKEN_TYPE.to_owned(),
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: pair.expires_in,
        }
    }
}

/// JSON body checked with [`validator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Reject requests without a correctly signed, currently valid access token.
pub async fn authenticated(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response> {
    let token = bearer(req.headers()).ok_or(ServerError::Unauthorized)?;

    if let Err(err) = state.signer.validate(token) {
        tracing::debug!(error = %err, "access token rejected");
        return Err(ServerError::Unauthorized);
    }

    Ok(next.run(req).await)
}
