//! RS512 access token signer.

use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

use super::{DEFAULT_LEEWAY, Result, Signer, TimeClaims, TokenError, WireClaims};
use crate::claims::AccessClaims;
use crate::clock::Clock;

const ALGORITHM: Algorithm = Algorithm::RS512;

/// Sign with an RSA private key, verify with the matching public key.
#[derive(Clone)]
pub struct RsaSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    key_id: Option<String>,
    leeway: u64,
    clock: Arc<dyn Clock>,
}

impl RsaSigner {
    /// Create a new [`RsaSigner`].
    ///
    /// An empty `public_key_pem` is derived from the private key.
    pub fn new(
        private_key_pem: &str,
        public_key_pem: &str,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|err| TokenError::Key(err.to_string()))?;

        let public_key_pem = if public_key_pem.trim().is_empty() {
            derive_public_key(private_key_pem)?
        } else {
            public_key_pem.to_owned()
        };
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem.as_bytes())
            .map_err(|err| TokenError::Key(err.to_string()))?;

        // Signature only; time claims are checked against our own clock.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Ok(Self {
            encoding_key,
            decoding_key,
            validation,
            key_id: None,
            leeway: DEFAULT_LEEWAY,
            clock,
        })
    }

    /// Set `kid` header on signed tokens.
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Update tolerated clock skew, in seconds.
    pub fn with_leeway(mut self, leeway: u64) -> Self {
        self.leeway = leeway;
        self
    }
}

impl Signer for RsaSigner {
    fn sign(&self, claims: &AccessClaims) -> Result<String> {
        let mut header = Header::new(ALGORITHM);
        header.kid = self.key_id.clone();

        encode(&header, &WireClaims::from(claims), &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    fn validate(&self, token: &str) -> Result<()> {
        let data = decode::<TimeClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|err| {
                tracing::debug!(error = %err, "access token rejected");
                TokenError::InvalidSignature
            })?;

        data.claims.check(self.clock.now().timestamp(), self.leeway)
    }
}

/// Compute SPKI public key PEM out of a PKCS#8 or PKCS#1 private key.
fn derive_public_key(private_key_pem: &str) -> Result<String> {
    let private_key = match RsaPrivateKey::from_pkcs8_pem(private_key_pem) {
        Ok(key) => key,
        Err(_) => RsaPrivateKey::from_pkcs1_pem(private_key_pem)
            .map_err(|err| TokenError::Key(err.to_string()))?,
    };

    RsaPublicKey::from(&private_key)
        .to_public_key_pem(LineEnding::LF)
        .map_err(|err| TokenError::Key(err.to_string()))
}
