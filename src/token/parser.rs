//! Unverified access token decoding.

use std::collections::BTreeSet;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{Parser, Result, TokenError};
use crate::claims::{AccessClaims, UserClaims, invalid_date};

type Object = Map<String, Value>;

/// Reads claims out of a compact JWT. Total over well-formed segments:
/// absent or mistyped claims are normalized, never rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct JwtParser;

impl JwtParser {
    pub fn new() -> Self {
        Self
    }
}

impl Parser for JwtParser {
    fn parse(&self, token: &str) -> Result<AccessClaims> {
        let segments = token.split('.').collect::<Vec<_>>();
        let [header, claims, _signature] = segments.as_slice() else {
            return Err(TokenError::FailedParsing);
        };

        decode_segment(header)?;
        let claims = decode_segment(claims)?;

        Ok(AccessClaims {
            user: user(claims.get("user")),
            audiences: audiences(claims.get("aud")),
            issued_at: timestamp(claims.get("iat")),
            not_before_at: timestamp(claims.get("nbf")),
            expires_at: timestamp(claims.get("exp")),
        })
    }
}

fn decode_segment(segment: &str) -> Result<Object> {
    let bytes = Base64UrlUnpadded::decode_vec(segment)
        .map_err(|_| TokenError::FailedParsing)?;

    serde_json::from_slice::<Object>(&bytes)
        .map_err(|_| TokenError::FailedParsing)
}

fn string(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_default()
}

fn user(value: Option<&Value>) -> UserClaims {
    match value.and_then(Value::as_object) {
        Some(user) => UserClaims {
            id: string(user.get("id")),
            email: string(user.get("email")),
        },
        None => UserClaims::default(),
    }
}

/// `aud` is either a single string or an array of strings.
fn audiences(value: Option<&Value>) -> BTreeSet<String> {
    match value {
        Some(Value::String(aud)) => BTreeSet::from([aud.clone()]),
        Some(Value::Array(auds)) => auds
            .iter()
            .filter_map(Value::as_str)
            .map(ToOwned::to_owned)
            .collect(),
        _ => BTreeSet::new(),
    }
}

fn timestamp(value: Option<&Value>) -> DateTime<Utc> {
    value
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_else(invalid_date)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn encode(value: Value) -> String {
        Base64UrlUnpadded::encode_string(value.to_string().as_bytes())
    }

    fn token(claims: Value) -> String {
        format!(
            "{}.{}.c2lnbmF0dXJl",
            encode(json!({ "alg": "RS512", "typ": "JWT" })),
            encode(claims)
        )
    }

    #[test]
    fn test_parse_full_claims() {
        let token = token(json!({
            "iat": 1_700_000_000,
            "nbf": 1_700_000_000,
            "exp": 1_700_000_900,
            "aud": ["b", "a"],
            "user": { "id": "7", "email": "bob@example.com" },
        }));
        let claims = JwtParser::new().parse(&token).unwrap();

        assert_eq!(claims.user, UserClaims::new("7", "bob@example.com"));
        assert_eq!(
            claims.audiences,
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
        assert_eq!(claims.issued_at.timestamp(), 1_700_000_000);
        assert_eq!(claims.expires_at.timestamp(), 1_700_000_900);
    }

    #[test]
    fn test_parse_normalizes_missing_claims() {
        let claims = JwtParser::new().parse(&token(json!({}))).unwrap();

        assert_eq!(claims.user, UserClaims::default());
        assert!(claims.audiences.is_empty());
        assert_eq!(claims.issued_at, invalid_date());
        assert_eq!(claims.not_before_at, invalid_date());
        assert_eq!(claims.expires_at, invalid_date());
    }

    #[test]
    fn test_parse_normalizes_mistyped_claims() {
        let token = token(json!({
            "iat": "yesterday",
            "exp": null,
            "aud": "single",
            "user": { "id": 12 },
        }));
        let claims = JwtParser::new().parse(&token).unwrap();

        assert_eq!(claims.user, UserClaims::default());
        assert_eq!(claims.audiences, BTreeSet::from(["single".to_string()]));
        assert_eq!(claims.issued_at, invalid_date());
        assert_eq!(claims.expires_at, invalid_date());
    }

    #[test]
    fn test_parse_malformed() {
        let parser = JwtParser::new();

        for token in [
            "",
            "only-one-segment",
            "two.segments",
            "!!!.???.sig",
            "e30.bm90LWpzb24.sig",
            "four.segments.in.token",
        ] {
            assert!(
                matches!(parser.parse(token), Err(TokenError::FailedParsing)),
                "{token} should not parse"
            );
        }
    }

    #[test]
    fn test_parse_ignores_signature() {
        let token = token(json!({ "user": { "id": "1", "email": "" } }));
        let unsigned = format!("{}.", token.rsplit_once('.').unwrap().0);

        assert_eq!(
            JwtParser::new().parse(&unsigned).unwrap().user.id,
            "1".to_string()
        );
    }
}
