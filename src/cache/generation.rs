//! [`Cacher`] implementation over any [`CacheBackend`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{CacheBackend, CacheError, Cacher, DEFAULT_PREFIX, Field, Result, key};
use crate::claims::{RefreshTokenClaims, UserClaims, invalid_date};

const UNUSED: &str = "0";
const USED: &str = "1";

/// Generation store.
#[derive(Clone)]
pub struct GenerationStore<B> {
    backend: B,
    prefix: String,
}

impl<B: CacheBackend> GenerationStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            prefix: DEFAULT_PREFIX.to_owned(),
        }
    }

    /// Update key prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn key(&self, token_id: &str, field: Field) -> String {
        key(&self.prefix, token_id, field)
    }

    async fn field(&self, token_id: &str, field: Field) -> Result<String> {
        Ok(self
            .backend
            .get(&self.key(token_id, field))
            .await?
            .unwrap_or_default())
    }

    async fn expiry(&self, token_id: &str) -> Result<DateTime<Utc>> {
        let expired_at = self.field(token_id, Field::ExpiredAt).await?;

        Ok(parse_timestamp(&expired_at))
    }

    async fn require(&self, token_id: &str, fields: &[Field]) -> Result<()> {
        let keys = fields
            .iter()
            .map(|field| self.key(token_id, *field))
            .collect::<Vec<_>>();

        if self.backend.exists(&keys).await? {
            Ok(())
        } else {
            Err(CacheError::NotFound)
        }
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(invalid_date)
}

#[async_trait]
impl<B: CacheBackend> Cacher for GenerationStore<B> {
    async fn save(&self, claims: &RefreshTokenClaims) -> Result<()> {
        let entries = [
            (Field::UserId, claims.user.id.clone()),
            (Field::UserEmail, claims.user.email.clone()),
            (Field::ChildId, claims.child_id.clone().unwrap_or_default()),
            (Field::IsUnused, UNUSED.to_owned()),
            (Field::ExpiredAt, claims.expires_at.timestamp().to_string()),
        ]
        .map(|(field, value)| (self.key(&claims.id, field), value));

        tracing::debug!(token_id = %claims.id, "saving refresh token generation");
        self.backend.set(&entries, claims.expires_at).await
    }

    async fn find(&self, token_id: &str) -> Result<RefreshTokenClaims> {
        let user_id = self
            .backend
            .get(&self.key(token_id, Field::UserId))
            .await?
            .ok_or(CacheError::NotFound)?;
        let email = self.field(token_id, Field::UserEmail).await?;
        let child_id = self.field(token_id, Field::ChildId).await?;

        Ok(RefreshTokenClaims {
            id: token_id.to_owned(),
            user: UserClaims::new(user_id, email),
            expires_at: self.expiry(token_id).await?,
            child_id: Some(child_id).filter(|id| !id.is_empty()),
        })
    }

    async fn invalidate(&self, token_id: &str) -> Result<()> {
        self.require(token_id, &[Field::IsUnused, Field::ExpiredAt])
            .await?;
        let expire_at = self.expiry(token_id).await?;

        self.backend
            .set(
                &[(self.key(token_id, Field::IsUnused), USED.to_owned())],
                expire_at,
            )
            .await
    }

    async fn is_unused(&self, token_id: &str) -> Result<bool> {
        let flag = self
            .backend
            .get(&self.key(token_id, Field::IsUnused))
            .await?
            .ok_or(CacheError::NotFound)?;

        // Anything but a clean zero counts as used.
        Ok(matches!(flag.parse::<i64>(), Ok(0)))
    }

    async fn set_child_id(&self, parent_id: &str, child_id: &str) -> Result<()> {
        self.require(parent_id, &[Field::ChildId, Field::ExpiredAt])
            .await?;
        let expire_at = self.expiry(parent_id).await?;

        self.backend
            .set(
                &[(self.key(parent_id, Field::ChildId), child_id.to_owned())],
                expire_at,
            )
            .await
    }

    async fn delete_all_generations(&self, token_id: &str) -> Result<usize> {
        let mut generations = vec![token_id.to_owned()];
        let mut visited = HashSet::from([token_id.to_owned()]);
        let mut current = token_id.to_owned();

        while let Some(child) = self
            .backend
            .get(&self.key(&current, Field::ChildId))
            .await?
            .filter(|child| !child.is_empty())
        {
            if !visited.insert(child.clone()) {
                tracing::warn!(%token_id, %child, "refresh token chain loops");
                break;
            }
            generations.push(child.clone());
            current = child;
        }

        let keys = generations
            .iter()
            .flat_map(|id| Field::ALL.iter().map(move |field| self.key(id, *field)))
            .collect::<Vec<_>>();
        self.backend.delete(&keys).await?;

        Ok(generations.len())
    }
}
