//! Login, refresh and logout use cases.

use std::sync::Arc;

use serde::Deserialize;

use crate::clock::Clock;
use crate::refresh::{RefreshTokenError, RefreshTokenManager, generate_id};
use crate::token::{Signer, TokenError};
use crate::user::{ClaimsMapper, PasswordHasher, User, UserError, UserRepository};

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email and wrong password alike.
    #[error("invalid credentials")]
    InvalidCredential,
    #[error("user not found")]
    UserNotFound,

    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    RefreshToken(#[from] RefreshTokenError),
    #[error(transparent)]
    User(#[from] UserError),
}

/// Login input.
#[derive(Clone, Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// Signed access token and the identifier of its refresh generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    /// Access token lifetime, in seconds.
    pub expires_in: i64,
    pub refresh_token: String,
}

/// Authentication orchestrator.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    mapper: Arc<dyn ClaimsMapper>,
    signer: Arc<dyn Signer>,
    refresh_tokens: RefreshTokenManager,
    clock: Arc<dyn Clock>,
    /// Compared against when the email is unknown, so both failures cost
    /// one hash verification.
    dummy_hash: String,
}

impl AuthService {
    /// Create a new [`AuthService`].
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        mapper: Arc<dyn ClaimsMapper>,
        signer: Arc<dyn Signer>,
        refresh_tokens: RefreshTokenManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let dummy_hash = hasher.hash(&generate_id()).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "cannot derive placeholder password hash");
            String::new()
        });

        Self {
            dummy_hash,
            users,
            hasher,
            mapper,
            signer,
            refresh_tokens,
            clock,
        }
    }

    fn access_token(&self, user: &User) -> Result<(String, i64)> {
        let claims = self.mapper.access_claims(user, self.clock.now());
        let expires_in = (claims.expires_at - claims.issued_at).num_seconds();

        Ok((self.signer.sign(&claims)?, expires_in))
    }

    fn login_failure(&self) -> AuthError {
        metrics::counter!("login_failures_total").increment(1);
        AuthError::InvalidCredential
    }

    /// Check credentials and open a new refresh token chain.
    pub async fn login(&self, credentials: &Credentials) -> Result<TokenPair> {
        let user = match self.users.find_by_email(&credentials.email).await? {
            Some(user)
                if self.hasher.verify(&credentials.password, &user.password) =>
            {
                user
            },
            Some(_) => return Err(self.login_failure()),
            None => {
                self.hasher.verify(&credentials.password, &self.dummy_hash);
                return Err(self.login_failure());
            },
        };

        let (access_token, expires_in) = self.access_token(&user)?;
        let refresh = self
            .refresh_tokens
            .create(self.mapper.user_claims(&user))
            .await?;

        tracing::info!(user_id = %user.id, "user logged in");

        Ok(TokenPair {
            access_token,
            expires_in,
            refresh_token: refresh.id,
        })
    }

    /// Rotate `refresh_token` and sign an access token for the current state
    /// of its user.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        let rotated = self.refresh_tokens.refresh(refresh_token).await?;

        let user = self
            .users
            .find_by_id(&rotated.user.id)
            .await?
            .ok_or(AuthError::UserNotFound)?;
        let (access_token, expires_in) = self.access_token(&user)?;

        tracing::info!(user_id = %user.id, "access token refreshed");

        Ok(TokenPair {
            access_token,
            expires_in,
            refresh_token: rotated.id,
        })
    }

    /// Retire `refresh_token`. Other generations stay untouched.
    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        self.refresh_tokens.invalidate(refresh_token).await?;

        tracing::info!("user logged out");
        Ok(())
    }
}
