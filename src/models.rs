// ABOUTME: Stored entities: sessions and their codes, tokens, clients, cached profiles, logins
// ABOUTME: Every expiring entity carries an expiry computed when it was written
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! Data model
//!
//! Expiry is fixed at write time (`expires_at = created_at + ttl`) and every
//! read path checks it with [`Expiring::expired`]; nothing is evicted in the
//! background.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Anything with a write-time expiry
pub trait Expiring {
    /// Instant after which the entity is no longer valid
    fn expires_at(&self) -> DateTime<Utc>;

    /// Whether the entity has outlived its window
    fn expired(&self) -> bool {
        Utc::now() > self.expires_at()
    }
}

/// What the relying party asked for when starting the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Authentication only: the code proves identity at the authorization endpoint
    Id,
    /// Authorization: the code is exchanged for an access token
    Code,
}

impl ResponseType {
    /// Wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Code => "code",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(Self::Id),
            "code" => Ok(Self::Code),
            other => Err(format!("unknown response_type: {other}")),
        }
    }
}

/// An in-flight authorization for one profile; at most one exists per `me`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Profile URL being authenticated
    pub me: String,
    /// Requested response type
    pub response_type: ResponseType,
    /// Relying party identifier
    pub client_id: String,
    /// Where the code is delivered
    pub redirect_uri: String,
    /// Space separated scopes, empty for authentication only
    pub scope: String,
    /// Opaque relying party state echoed on redirect
    pub state: String,
    /// PKCE challenge, empty when none was sent
    pub code_challenge: String,
    /// PKCE method, empty when none was sent
    pub code_challenge_method: String,
    /// Strategy chosen to vouch for `me`
    pub provider: String,
    /// Link on the profile page the strategy verifies
    pub profile_uri: String,
    /// Code attached after a successful callback
    pub code: Option<String>,
    /// Creation time, reset when a code is attached
    pub created_at: DateTime<Utc>,
    /// Session window, or code window once a code is attached
    pub expires_at: DateTime<Utc>,
}

impl Expiring for Session {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// A session whose code has been redeemed; reading it removed the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Code {
    /// The code value
    pub code: String,
    /// Profile the code vouches for
    pub me: String,
    /// Requested response type
    pub response_type: ResponseType,
    /// Relying party identifier
    pub client_id: String,
    /// Where the code was delivered
    pub redirect_uri: String,
    /// Granted scopes
    pub scope: String,
    /// PKCE challenge
    pub code_challenge: String,
    /// PKCE method
    pub code_challenge_method: String,
    /// Minting time
    pub created_at: DateTime<Utc>,
    /// Minting time plus the code window
    pub expires_at: DateTime<Utc>,
}

impl Expiring for Code {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl Session {
    /// View of the session as a redeemable code, if one has been attached
    #[must_use]
    pub fn into_code(self) -> Option<Code> {
        Some(Code {
            code: self.code?,
            me: self.me,
            response_type: self.response_type,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            scope: self.scope,
            code_challenge: self.code_challenge,
            code_challenge_method: self.code_challenge_method,
            created_at: self.created_at,
            expires_at: self.expires_at,
        })
    }
}

/// A persisted access token; only the lookup half and the hash of the secret half are stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    /// Lookup key, stored in the clear
    pub short_token: String,
    /// Hash of the secret half
    #[serde(skip_serializing)]
    pub long_token_hash: String,
    /// Profile the token acts for
    pub me: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scope: String,
    /// Issue time
    pub created_at: DateTime<Utc>,
}

/// A resolved trust decision for one `(client_id, redirect_uri)` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    /// Client identifier
    pub id: String,
    /// Trusted redirect URI
    pub redirect_uri: String,
    /// Display name, empty when the client publishes none
    pub name: String,
    /// Resolution time
    pub updated_at: DateTime<Utc>,
    /// Resolution time plus the client window
    #[serde(skip)]
    pub expires_at: DateTime<Utc>,
}

impl Expiring for Client {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// One usable way to authenticate a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Method {
    /// Strategy name
    pub provider: String,
    /// Link on the profile page the strategy verifies
    pub profile: String,
}

/// Cached discovery result for a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Profile URL
    pub me: String,
    /// Discovery time
    pub updated_at: DateTime<Utc>,
    /// Discovery time plus the profile window
    pub expires_at: DateTime<Utc>,
    /// Methods ordered by provider name
    pub methods: Vec<Method>,
}

impl Expiring for Profile {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Durable "recently authenticated" marker referenced by a cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// Opaque identifier carried in the cookie
    pub id: String,
    /// Profile that authenticated
    pub me: String,
    /// Authentication time
    pub created_at: DateTime<Utc>,
    /// Authentication time plus the login window
    pub expires_at: DateTime<Utc>,
}

impl Expiring for Login {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
