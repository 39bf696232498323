use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use validator::Validate;

use super::Valid;
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

/// Retire one refresh token. Sessions on other devices are kept.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<StatusCode> {
    state.auth.logout(&body.refresh_token).await?;

    Ok(StatusCode::NO_CONTENT)
}
