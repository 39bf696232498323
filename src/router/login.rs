use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use validator::Validate;

use super::{TokenResponse, Valid};
use crate::AppState;
use crate::auth::Credentials;
use crate::error::Result;

#[derive(Debug, Validate, Deserialize)]
pub struct Body {
    #[validate(email(message = "Email must be formatted."))]
    email: String,
    #[validate(length(
        min = 1,
        max = 255,
        message = "Password must contain between 1 and 255 characters."
    ))]
    password: String,
}

/// Handler to log in with email and password.
pub async fn handler(
    State(state): State<AppState>,
    Valid(body): Valid<Body>,
) -> Result<Json<TokenResponse>> {
    let pair = state
        .auth
        .login(&Credentials {
            email: body.email,
            password: body.password,
        })
        .await?;

    Ok(Json(pair.into()))
}
