//! Unsigned tokens for tests that do not care about cryptography.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};

use super::{DEFAULT_LEEWAY, Result, Signer, TimeClaims, TokenError, WireClaims};
use crate::claims::AccessClaims;
use crate::clock::Clock;

const HEADER: &str = r#"{"alg":"none","typ":"JWT"}"#;

/// `alg: none` signer. Accepts any token whose signature segment is empty.
pub struct InsecureSigner {
    clock: Arc<dyn Clock>,
}

impl InsecureSigner {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl Signer for InsecureSigner {
    fn sign(&self, claims: &AccessClaims) -> Result<String> {
        let claims = serde_json::to_vec(&WireClaims::from(claims))
            .map_err(|err| TokenError::Key(err.to_string()))?;

        Ok(format!(
            "{}.{}.",
            Base64UrlUnpadded::encode_string(HEADER.as_bytes()),
            Base64UrlUnpadded::encode_string(&claims)
        ))
    }

    fn validate(&self, token: &str) -> Result<()> {
        let Some((message, "")) = token.rsplit_once('.') else {
            return Err(TokenError::InvalidSignature);
        };
        let claims = message
            .split_once('.')
            .and_then(|(_, claims)| Base64UrlUnpadded::decode_vec(claims).ok())
            .and_then(|claims| serde_json::from_slice::<TimeClaims>(&claims).ok())
            .ok_or(TokenError::InvalidSignature)?;

        claims.check(self.clock.now().timestamp(), DEFAULT_LEEWAY)
    }
}
