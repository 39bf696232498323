//! Users as seen by the token engine, and the capabilities it needs from
//! the system of record.

mod password;
mod repository;

pub use password::*;
pub use repository::*;

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::claims::{AccessClaims, UserClaims, expiry};

/// Default lifetime of access tokens.
pub const DEFAULT_ACCESS_TTL: TimeDelta = TimeDelta::minutes(15);

pub type Result<T> = std::result::Result<T, UserError>;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("argon2 error: {0}")]
    Argon2(String),
}

/// User as saved on database.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip)]
    pub password: String,
}

/// Lookup of users in the system of record.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// Password hashing capability.
pub trait PasswordHasher: Send + Sync {
    /// Produce a PHC string for `password`.
    fn hash(&self, password: &str) -> Result<String>;

    /// Whether `password` matches `hash`. Malformed hashes never match.
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Derive token claims for a user.
pub trait ClaimsMapper: Send + Sync {
    fn user_claims(&self, user: &User) -> UserClaims;

    fn access_claims(&self, user: &User, now: DateTime<Utc>) -> AccessClaims;
}

/// Claims valid from `now` for a fixed lifetime, for a fixed audience.
#[derive(Clone, Debug)]
pub struct DefaultClaimsMapper {
    audiences: BTreeSet<String>,
    access_ttl: TimeDelta,
}

impl DefaultClaimsMapper {
    pub fn new<I, S>(audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            audiences: audiences.into_iter().map(Into::into).collect(),
            access_ttl: DEFAULT_ACCESS_TTL,
        }
    }

    /// Update access token lifetime.
    pub fn with_access_ttl(mut self, access_ttl: TimeDelta) -> Self {
        self.access_ttl = access_ttl;
        self
    }
}

impl ClaimsMapper for DefaultClaimsMapper {
    fn user_claims(&self, user: &User) -> UserClaims {
        UserClaims::new(&user.id, &user.email)
    }

    fn access_claims(&self, user: &User, now: DateTime<Utc>) -> AccessClaims {
        AccessClaims::new(
            self.user_claims(user),
            self.audiences.clone(),
            now,
            now,
            expiry(now, self.access_ttl),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_claims_mapper() {
        let now = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        let user = User {
            id: "42".into(),
            email: "alice@example.com".into(),
            password: "$argon2id$...".into(),
        };
        let mapper = DefaultClaimsMapper::new(["api", "api", "web"]);
        let claims = mapper.access_claims(&user, now);

        assert_eq!(claims.user, UserClaims::new("42", "alice@example.com"));
        assert_eq!(claims.audiences.len(), 2);
        assert_eq!(claims.issued_at, now);
        assert_eq!(claims.not_before_at, now);
        assert_eq!(claims.expires_at, now + DEFAULT_ACCESS_TTL);
    }

    #[test]
    fn test_claims_mapper_sub_second_now() {
        let now = DateTime::from_timestamp(1_750_000_000, 999_999_999).unwrap();
        let claims = DefaultClaimsMapper::new(Vec::<String>::new())
            .access_claims(&User::default(), now);

        assert_eq!(claims.issued_at.timestamp_subsec_nanos(), 0);
        assert_eq!(claims.expires_at.timestamp_subsec_nanos(), 0);
    }
}
