// ABOUTME: Access token minting and parsing in the relmeauth_<short>_<long> format
// ABOUTME: Only the short half and a SHA-256 hash of the long half are ever stored
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::constants::secrets::{TOKEN_LONG_LEN, TOKEN_PREFIX, TOKEN_SHORT_LEN};
use crate::errors::AppResult;
use crate::models::Token;
use crate::utils::random::random_string;
use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// A freshly minted token: the string handed to the client and the record to persist
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Full bearer string, shown once
    pub access_token: String,
    /// Stored form
    pub record: Token,
}

/// Mint a token for `me` acting through `client_id`
///
/// # Errors
///
/// Returns an internal error if the system RNG fails
pub fn mint(me: &str, client_id: &str, scope: &str) -> AppResult<IssuedToken> {
    let short = random_string(TOKEN_SHORT_LEN)?;
    let long = random_string(TOKEN_LONG_LEN)?;

    Ok(IssuedToken {
        access_token: format!("{TOKEN_PREFIX}_{short}_{long}"),
        record: Token {
            short_token: short,
            long_token_hash: hash_secret(&long),
            me: me.to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            created_at: Utc::now(),
        },
    })
}

/// Split a bearer string into its short and long halves
#[must_use]
pub fn split(token: &str) -> Option<(&str, &str)> {
    let rest = token.strip_prefix(TOKEN_PREFIX)?.strip_prefix('_')?;
    let (short, long) = rest.split_once('_')?;

    (short.len() == TOKEN_SHORT_LEN && long.len() == TOKEN_LONG_LEN).then_some((short, long))
}

/// Stored hash of a token's long half
#[must_use]
pub fn hash_secret(long: &str) -> String {
    general_purpose::STANDARD_NO_PAD.encode(Sha256::digest(long.as_bytes()))
}

/// Whether the presented long half matches a stored record
#[must_use]
pub fn matches(record: &Token, long: &str) -> bool {
    hash_secret(long)
        .as_bytes()
        .ct_eq(record.long_token_hash.as_bytes())
        .into()
}
