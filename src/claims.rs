//! Identity and timing data carried by access and refresh tokens.

use std::collections::BTreeSet;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel for absent or unreadable timestamps: the Unix epoch.
///
/// A missing date always reads as long expired, never as "now".
pub fn invalid_date() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// `now + ttl`, saturating at the latest representable date.
pub fn expiry(now: DateTime<Utc>, ttl: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Snapshot of the user a token was issued to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
}

impl UserClaims {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Claims of a signed access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessClaims {
    pub user: UserClaims,
    /// Recipients the token is intended for. May be empty.
    pub audiences: BTreeSet<String>,
    pub issued_at: DateTime<Utc>,
    pub not_before_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AccessClaims {
    /// Create claims with timestamps truncated to whole seconds, the
    /// precision they keep on the wire.
    pub fn new(
        user: UserClaims,
        audiences: BTreeSet<String>,
        issued_at: DateTime<Utc>,
        not_before_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user,
            audiences,
            issued_at: issued_at.trunc_subsecs(0),
            not_before_at: not_before_at.trunc_subsecs(0),
            expires_at: expires_at.trunc_subsecs(0),
        }
    }
}

/// One generation of a refresh token chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshTokenClaims {
    /// Opaque identifier presented by the client.
    pub id: String,
    pub user: UserClaims,
    pub expires_at: DateTime<Utc>,
    /// Successor generation, set once this one has been rotated.
    pub child_id: Option<String>,
}

impl RefreshTokenClaims {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
