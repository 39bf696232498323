//! Refresh token rotation with reuse detection.
//!
//! Each login opens a chain of generations. Refreshing a generation marks
//! it used and links it to a fresh child; presenting a used generation
//! again revokes it and all of its descendants.

use std::sync::Arc;

use chrono::TimeDelta;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;

use crate::cache::{CacheError, Cacher};
use crate::claims::{RefreshTokenClaims, UserClaims, expiry};
use crate::clock::Clock;

pub const TOKEN_LENGTH: u64 = 64;
pub const DEFAULT_TTL: TimeDelta = TimeDelta::days(30);

pub type Result<T> = std::result::Result<T, RefreshTokenError>;

#[derive(Debug, thiserror::Error)]
pub enum RefreshTokenError {
    #[error("refresh token not found")]
    NotFound,
    #[error("refresh token already used")]
    AlreadyUsed,
    #[error("refresh token expired")]
    Expired,
    #[error("refresh token store failed")]
    Store(#[source] CacheError),
}

impl From<CacheError> for RefreshTokenError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound => RefreshTokenError::NotFound,
            err => RefreshTokenError::Store(err),
        }
    }
}

/// Random alphanumeric identifier from the OS RNG.
pub fn generate_id() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH as usize)
        .map(char::from)
        .collect()
}

/// Drive generation chains stored in a [`Cacher`].
#[derive(Clone)]
pub struct RefreshTokenManager {
    cacher: Arc<dyn Cacher>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl RefreshTokenManager {
    /// Create a new [`RefreshTokenManager`].
    pub fn new(cacher: Arc<dyn Cacher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cacher,
            clock,
            ttl: DEFAULT_TTL,
        }
    }

    /// Update lifetime of new generations.
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    fn derive(&self, user: UserClaims) -> RefreshTokenClaims {
        RefreshTokenClaims {
            id: generate_id(),
            user,
            expires_at: expiry(self.clock.now(), self.ttl),
            child_id: None,
        }
    }

    /// Open a new chain for `user`.
    pub async fn create(&self, user: UserClaims) -> Result<RefreshTokenClaims> {
        let claims = self.derive(user);
        self.cacher.save(&claims).await?;

        tracing::debug!(user_id = %claims.user.id, "refresh token chain created");
        Ok(claims)
    }

    /// Rotate `token_id` into a new generation.
    pub async fn refresh(&self, token_id: &str) -> Result<RefreshTokenClaims> {
        // Reuse check comes before anything else, expiry included.
        if !self.cacher.is_unused(token_id).await? {
            let revoked = self.cacher.delete_all_generations(token_id).await?;

            metrics::counter!("refresh_token_reuse_total").increment(1);
            tracing::warn!(revoked, "refresh token reused, chain revoked");
            return Err(RefreshTokenError::AlreadyUsed);
        }

        let current = self.cacher.find(token_id).await?;
        if current.is_expired(self.clock.now()) {
            return Err(RefreshTokenError::Expired);
        }

        let next = self.derive(current.user);
        self.cacher.save(&next).await?;

        // Not transactional: on failure below the presented token stays
        // usable once more and `next` is orphaned until it expires.
        if let Err(err) = self.link(token_id, &next.id).await {
            tracing::error!(error = %err, "refresh token rotation left unlinked");
            return Err(err);
        }

        metrics::counter!("refresh_token_rotations_total").increment(1);
        Ok(next)
    }

    async fn link(&self, parent_id: &str, child_id: &str) -> Result<()> {
        self.cacher.invalidate(parent_id).await?;
        self.cacher.set_child_id(parent_id, child_id).await?;
        Ok(())
    }

    /// Mark `token_id` used without touching the rest of its chain.
    pub async fn invalidate(&self, token_id: &str) -> Result<()> {
        Ok(self.cacher.invalidate(token_id).await?)
    }
}
