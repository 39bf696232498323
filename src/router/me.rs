use axum::Json;

use crate::error::{Result, ServerError};
use crate::guard::CurrentUser;
use crate::user::User;

/// Handler returning the authenticated user.
pub async fn handler(CurrentUser(user): CurrentUser) -> Result<Json<User>> {
    user.map(Json).ok_or(ServerError::Unauthorized)
}
