// ABOUTME: PKCE verification binding an authorization code to the client's secret verifier
// ABOUTME: Supports the plain and S256 methods and rejects anything else
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose, Engine as _};
use sha2::{Digest, Sha256};
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Error text for an unsupported `code_challenge_method`
pub const UNKNOWN_METHOD: &str = "code_challenge_method is not understood";

/// PKCE code challenge method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeMethod {
    /// The challenge is the verifier itself
    Plain,
    /// The challenge is the unpadded base64url SHA-256 of the verifier
    S256,
}

impl ChallengeMethod {
    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }

    /// Challenge a verifier produces under this method
    #[must_use]
    pub fn challenge(self, verifier: &str) -> String {
        match self {
            Self::Plain => verifier.to_owned(),
            Self::S256 => s256_challenge(verifier),
        }
    }
}

impl FromStr for ChallengeMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "S256" => Ok(Self::S256),
            _ => Err(AppError::invalid_request(UNKNOWN_METHOD)),
        }
    }
}

/// `base64url(sha256(verifier))` without padding
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// Check a verifier against a stored challenge
///
/// # Errors
///
/// Returns an invalid request error when `method` is not `plain` or `S256`
pub fn verify(method: &str, challenge: &str, verifier: &str) -> AppResult<bool> {
    let method: ChallengeMethod = method.parse()?;
    let computed = method.challenge(verifier);

    Ok(computed.as_bytes().ct_eq(challenge.as_bytes()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_s256() {
        assert_eq!(s256_challenge(VERIFIER), CHALLENGE);
        assert!(verify("S256", CHALLENGE, VERIFIER).unwrap());
        assert!(!verify("S256", CHALLENGE, "something-else").unwrap());
    }

    #[test]
    fn test_plain() {
        assert!(verify("plain", "hello", "hello").unwrap());
        assert!(!verify("plain", "hello", "hellO").unwrap());
    }

    #[test]
    fn test_unknown_method_always_errors() {
        let err = verify("S512", CHALLENGE, VERIFIER).unwrap_err();
        assert_eq!(err.http_status(), 400);
        assert!(verify("", "x", "x").is_err());
    }
}
