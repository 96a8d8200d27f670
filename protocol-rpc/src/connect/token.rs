//  Copyright (c) Facebook, Inc. and its affiliates.
//  SPDX-License-Identifier: Apache-2.0

//! The PAIR clean room token handed to an advertiser when invited.
//!
//! It is an ES256 signed JWT. The client never verifies the signature, the
//! coordination service does when the raw token is presented as a bearer
//! credential. The claims tell which clean room to use, where the service
//! lives and which hash salt both parties share.

use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::Deserialize;

/// Only signing method the clean room issues tokens with
pub const SIGNING_METHOD: &str = "ES256";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("malformed token segment: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("malformed token claims: {0}")]
    Json(#[from] serde_json::Error),
    #[error("signing method {0} is invalid")]
    SigningMethod(String),
    #[error("token is expired")]
    Expired,
    #[error("{0} is empty")]
    MissingClaim(&'static str),
}

#[derive(Deserialize)]
struct Header {
    #[serde(default)]
    alg: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct CleanroomToken {
    /// The token as received, used as bearer credential
    #[serde(skip)]
    pub raw: String,
    /// Resource name of the clean room
    #[serde(default)]
    pub cleanroom: String,
    /// Seconds since the epoch
    #[serde(default, rename = "exp")]
    pub expiration: f64,
    /// Host of the coordination service
    #[serde(default, rename = "iss")]
    pub issuer_host: String,
    /// base64 hash salt
    #[serde(default, rename = "salt")]
    pub hash_salt: String,
}

impl CleanroomToken {
    /// Reads the claims without checking the signature
    pub fn parse(token: &str) -> Result<CleanroomToken, TokenError> {
        let token = token.trim();
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(TokenError::Malformed(
                "token contains an invalid number of segments".to_string(),
            ));
        }

        let header: Header = serde_json::from_slice(&decode_segment(segments[0])?)?;
        if header.alg != SIGNING_METHOD {
            return Err(TokenError::SigningMethod(header.alg));
        }

        let mut claims: CleanroomToken = serde_json::from_slice(&decode_segment(segments[1])?)?;
        claims.raw = token.to_string();
        Ok(claims)
    }

    /// Checks every claim is present and the token is not expired at `now`,
    /// in seconds since the epoch
    pub fn validate(&self, now: i64) -> Result<(), TokenError> {
        if self.cleanroom.is_empty() {
            return Err(TokenError::MissingClaim("cleanroom"));
        }
        if now > self.expiration as i64 {
            return Err(TokenError::Expired);
        }
        if self.issuer_host.is_empty() {
            return Err(TokenError::MissingClaim("issuer host"));
        }
        if self.hash_salt.is_empty() {
            return Err(TokenError::MissingClaim("hash salt"));
        }
        Ok(())
    }
}

impl FromStr for CleanroomToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CleanroomToken::parse(s)
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, TokenError> {
    Ok(URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(json: &str) -> String {
        URL_SAFE_NO_PAD.encode(json)
    }

    fn token(alg: &str, claims: &str) -> String {
        format!(
            "{}.{}.{}",
            segment(&format!(r#"{{"alg":"{}","typ":"JWT"}}"#, alg)),
            segment(claims),
            segment("signature")
        )
    }

    const CLAIMS: &str = r#"{"cleanroom":"cleanrooms/1234","exp":1900000000,"iss":"sandbox.example.com","salt":"c2FsdA=="}"#;

    #[test]
    fn test_parse_claims() {
        let raw = token("ES256", CLAIMS);
        let t: CleanroomToken = raw.parse().unwrap();
        assert_eq!(t.raw, raw);
        assert_eq!(t.cleanroom, "cleanrooms/1234");
        assert_eq!(t.expiration, 1900000000.0);
        assert_eq!(t.issuer_host, "sandbox.example.com");
        assert_eq!(t.hash_salt, "c2FsdA==");
        assert!(t.validate(1700000000).is_ok());
    }

    #[test]
    fn test_expired() {
        let t = CleanroomToken::parse(&token("ES256", CLAIMS)).unwrap();
        assert!(matches!(t.validate(1900000001), Err(TokenError::Expired)));
        assert!(t.validate(1900000000).is_ok());
    }

    #[test]
    fn test_missing_claims() {
        let t = CleanroomToken::parse(&token("ES256", r#"{"exp":1900000000}"#)).unwrap();
        assert!(matches!(
            t.validate(0),
            Err(TokenError::MissingClaim("cleanroom"))
        ));

        let t = CleanroomToken::parse(&token(
            "ES256",
            r#"{"cleanroom":"c","exp":1900000000,"iss":"h"}"#,
        ))
        .unwrap();
        assert!(matches!(
            t.validate(0),
            Err(TokenError::MissingClaim("hash salt"))
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            CleanroomToken::parse("not-a-token"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            CleanroomToken::parse("a.b"),
            Err(TokenError::Malformed(_))
        ));
        assert!(matches!(
            CleanroomToken::parse("%%%.%%%.%%%"),
            Err(TokenError::Base64(_))
        ));
        assert!(matches!(
            CleanroomToken::parse(&format!("{}.{}.x", segment("{}"), segment("[1]"))),
            Err(TokenError::SigningMethod(_))
        ));
        assert!(matches!(
            CleanroomToken::parse(&token("HS256", CLAIMS)),
            Err(TokenError::SigningMethod(alg)) if alg == "HS256"
        ));
    }
}
