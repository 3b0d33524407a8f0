// ABOUTME: Constants grouped by domain: expiry windows, token shapes, cookie and endpoint names
// ABOUTME: Environment lookups with defaults live in env_config for the configuration layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! Constants module
//!
//! Values that several components must agree on. Anything tunable at runtime
//! goes through [`env_config`] and ends up in `ServerConfig`.

use std::env;

/// Default expiry windows, in seconds
pub mod ttl {
    /// An unfinished authorization session
    pub const SESSION_SECS: i64 = 5 * 60;
    /// A minted code, measured from minting
    pub const CODE_SECS: i64 = 60;
    /// A resolved client trust decision
    pub const CLIENT_SECS: i64 = 30 * 24 * 60 * 60;
    /// A cached rel=me discovery result
    pub const PROFILE_SECS: i64 = 7 * 24 * 60 * 60;
    /// The "recently authenticated" login marker
    pub const LOGIN_SECS: i64 = 7 * 24 * 60 * 60;
    /// Strategy redirect/callback correlation entries
    pub const STRATEGY_STATE_SECS: i64 = 60;
}

/// Shapes of generated secrets
pub mod secrets {
    /// Alphabet every random string is drawn from
    pub const ALPHABET: &[u8] =
        b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-.";
    /// Prefix of issued access tokens
    pub const TOKEN_PREFIX: &str = "relmeauth";
    /// Length of the stored lookup half of a token
    pub const TOKEN_SHORT_LEN: usize = 8;
    /// Length of the hashed half of a token
    pub const TOKEN_LONG_LEN: usize = 24;
    /// Length of authorization codes
    pub const CODE_LEN: usize = 20;
    /// Length of strategy correlation keys
    pub const STATE_LEN: usize = 64;
    /// Length of login marker identifiers
    pub const LOGIN_ID_LEN: usize = 20;
    /// Length of PGP challenges
    pub const PGP_CHALLENGE_LEN: usize = 40;
}

/// HTTP level names
pub mod http_names {
    /// Cookie carrying the login marker id
    pub const LOGIN_COOKIE: &str = "relme-auth";
    /// Name given to clients served from localhost
    pub const LOCAL_APP_NAME: &str = "Local App";
    /// Date format used for "cached at" labels
    pub const CACHED_AT_FORMAT: &str = "%-d %b";
    /// User agent sent on every outbound fetch
    pub const USER_AGENT: &str = concat!("relme-auth/", env!("CARGO_PKG_VERSION"));
}

/// Service identity used in logs
pub mod service_names {
    /// Name reported at startup
    pub const RELME_AUTH_SERVER: &str = "relme-auth-server";
}

/// Environment-based configuration
pub mod env_config {
    use super::env;

    /// Get HTTP server port from environment or default
    #[must_use]
    pub fn http_port() -> u16 {
        env::var("HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080)
    }

    /// Get bind address from environment or default
    #[must_use]
    pub fn host() -> String {
        env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_owned())
    }

    /// Get base URL from environment or default
    #[must_use]
    pub fn base_url() -> String {
        env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_owned())
    }

    /// Get database URL from environment or default
    #[must_use]
    pub fn database_url() -> String {
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./relme-auth.db".to_owned())
    }

    /// Read an integer seconds value with a fallback
    #[must_use]
    pub fn seconds(name: &str, default: i64) -> i64 {
        env::var(name)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs: &i64| *secs > 0)
            .unwrap_or(default)
    }

    /// Read a boolean flag with a fallback
    #[must_use]
    pub fn flag(name: &str, default: bool) -> bool {
        env::var(name).map_or(default, |v| {
            matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on")
        })
    }
}
