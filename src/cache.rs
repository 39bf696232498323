//! Refresh token generations stored in a TTL key/value cache.
//!
//! Every token owns five independent keys `{prefix}:{token_id}:{field}`,
//! each expiring with the token itself. Generations link forward through
//! the `child:id` field.

pub mod generation;
pub mod memory;
pub mod redis;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::claims::RefreshTokenClaims;

pub use self::generation::GenerationStore;
pub use self::memory::MemoryBackend;
pub use self::redis::RedisBackend;

pub type Result<T> = std::result::Result<T, CacheError>;

pub const DEFAULT_PREFIX: &str = "refresh-token";

/// Errors raised by the generation store.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("refresh token not found")]
    NotFound,
    #[error(transparent)]
    Redis(#[from] ::redis::RedisError),
}

/// Per-token fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    UserId,
    UserEmail,
    ChildId,
    IsUnused,
    ExpiredAt,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::UserId,
        Field::UserEmail,
        Field::ChildId,
        Field::IsUnused,
        Field::ExpiredAt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::UserId => "user:id",
            Field::UserEmail => "user:email",
            Field::ChildId => "child:id",
            Field::IsUnused => "is-unused",
            Field::ExpiredAt => "expired-at",
        }
    }
}

/// Build the cache key of a token field.
pub fn key(prefix: &str, token_id: &str, field: Field) -> String {
    format!("{prefix}:{token_id}:{}", field.as_str())
}

/// Raw key/value operations the generation store needs from a cache.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Write all entries as one batch, each expiring at `expire_at`.
    async fn set(
        &self,
        entries: &[(String, String)],
        expire_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Whether every key in `keys` exists.
    async fn exists(&self, keys: &[String]) -> Result<bool>;

    async fn delete(&self, keys: &[String]) -> Result<()>;
}

/// Persistence of refresh token generations.
#[async_trait]
pub trait Cacher: Send + Sync {
    /// Store every field of `claims`, marked as not used.
    async fn save(&self, claims: &RefreshTokenClaims) -> Result<()>;

    /// Load a token. Fails when its `user:id` key is gone.
    async fn find(&self, token_id: &str) -> Result<RefreshTokenClaims>;

    /// Mark a token as used until it would have expired anyway.
    async fn invalidate(&self, token_id: &str) -> Result<()>;

    /// `true` only when the stored flag reads exactly zero.
    async fn is_unused(&self, token_id: &str) -> Result<bool>;

    /// Link `parent_id` to its successor.
    async fn set_child_id(&self, parent_id: &str, child_id: &str) -> Result<()>;

    /// Purge `token_id` and every descendant. Returns how many generations
    /// were removed.
    async fn delete_all_generations(&self, token_id: &str) -> Result<usize>;
}
