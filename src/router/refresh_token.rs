//! Get a new token with refresh token.

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use super::{TokenResponse, Valid};
use crate::AppState;
use crate::error::Result;

#[derive(Debug, Validate, Deserialize)]
pub struct Body {
    #[serde(rename = "refreshToken", alias = "refresh_token")]
    #[validate(length(
        equal = crate::refresh::TOKEN_LENGTH,
        message = "Invalid refresh token."
    ))]
    refresh_token: String,
}

pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<TokenResponse>> {
    let pair = state.auth.refresh(&body.refresh_token).await?;

    Ok(Json(pair.into()))
}
