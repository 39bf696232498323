//! Manage json web tokens.
//!
//! Signing and signature checks live behind [`Signer`]; cheap claim
//! extraction without any trust decision lives behind [`Parser`].

#[cfg(test)]
pub mod fake;
pub mod parser;
pub mod signer;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::claims::{AccessClaims, UserClaims};

pub use parser::JwtParser;
pub use signer::RsaSigner;

pub type Result<T> = std::result::Result<T, TokenError>;

/// Tolerated clock skew on time-bound claims, in seconds.
pub const DEFAULT_LEEWAY: u64 = 60;

/// Errors raised by token signing, validation and parsing.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token is expired or not yet valid")]
    InvalidTimeRelatedClaim,
    #[error("token cannot be decoded")]
    FailedParsing,

    #[error("invalid signing key: {0}")]
    Key(String),
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Produce and verify access tokens.
pub trait Signer: Send + Sync {
    /// Encode and sign `claims`.
    fn sign(&self, claims: &AccessClaims) -> Result<String>;

    /// Check signature then time-bound claims. Does not decode the subject.
    fn validate(&self, token: &str) -> Result<()>;
}

/// Decode access token claims without checking the signature.
pub trait Parser: Send + Sync {
    fn parse(&self, token: &str) -> Result<AccessClaims>;
}

/// Claims as laid out on the wire.
#[derive(Debug, Serialize)]
pub(crate) struct WireClaims<'a> {
    iat: i64,
    nbf: i64,
    exp: i64,
    aud: &'a BTreeSet<String>,
    user: &'a UserClaims,
}

impl<'a> From<&'a AccessClaims> for WireClaims<'a> {
    fn from(claims: &'a AccessClaims) -> Self {
        Self {
            iat: claims.issued_at.timestamp(),
            nbf: claims.not_before_at.timestamp(),
            exp: claims.expires_at.timestamp(),
            aud: &claims.audiences,
            user: &claims.user,
        }
    }
}

/// Only the claims needed for the time check.
#[derive(Debug, Deserialize)]
pub(crate) struct TimeClaims {
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
}

impl TimeClaims {
    /// Loose validity: `nbf <= now <= exp`, each side widened by `leeway`.
    /// Missing bounds fail.
    pub(crate) fn check(&self, now: i64, leeway: u64) -> Result<()> {
        let leeway = i64::try_from(leeway).unwrap_or(i64::MAX);

        match (self.nbf, self.exp) {
            (Some(nbf), Some(exp))
                if nbf.saturating_sub(leeway) <= now
                    && now <= exp.saturating_add(leeway) =>
            {
                Ok(())
            },
            _ => Err(TokenError::InvalidTimeRelatedClaim),
        }
    }
}
