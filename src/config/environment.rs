// ABOUTME: Environment-based server configuration: listen address, storage, expiry windows, strategies
// ABOUTME: Parses environment variables into a typed ServerConfig validated once at startup
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! Environment-based configuration management

use crate::constants::{env_config, ttl};
use anyhow::{bail, Context, Result};
use chrono::Duration;
use std::env;
use std::fmt;
use tracing::info;
use url::Url;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Public deployment
    Production,
    /// Test harnesses
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Expiry windows for every stored entity
#[derive(Debug, Clone, Copy)]
pub struct ExpiryConfig {
    /// Unfinished authorization sessions
    pub session: Duration,
    /// Minted codes
    pub code: Duration,
    /// Client trust decisions
    pub client: Duration,
    /// Cached discovery results
    pub profile: Duration,
    /// Login markers
    pub login: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            session: Duration::seconds(ttl::SESSION_SECS),
            code: Duration::seconds(ttl::CODE_SECS),
            client: Duration::seconds(ttl::CLIENT_SECS),
            profile: Duration::seconds(ttl::PROFILE_SECS),
            login: Duration::seconds(ttl::LOGIN_SECS),
        }
    }
}

/// Outbound fetch limits
#[derive(Debug, Clone, Copy)]
pub struct HttpClientConfig {
    /// Per-request timeout
    pub timeout_secs: u64,
    /// Upper bound on redirect hops followed while expanding a link
    pub max_redirects: usize,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_redirects: 10,
        }
    }
}

/// GitHub OAuth application credentials
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
}

/// Which identity strategies are registered, in registration order
#[derive(Debug, Clone, Default)]
pub struct StrategyConfig {
    /// GitHub, when credentials are present
    pub github: Option<GitHubConfig>,
    /// PGP clearsign challenges
    pub enable_pgp: bool,
    /// Trust-everyone strategy for development
    pub use_true: bool,
}

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port
    pub http_port: u16,
    /// Bind address
    pub host: String,
    /// Public base URL used for callback construction
    pub base_url: Url,
    /// `SQLite` connection URL
    pub database_url: String,
    /// Deployment environment
    pub environment: Environment,
    /// Expiry windows
    pub expiry: ExpiryConfig,
    /// Outbound fetch limits
    pub http_client: HttpClientConfig,
    /// Registered strategies
    pub strategies: StrategyConfig,
    /// Mark the login cookie `Secure`
    pub secure_cookies: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if `BASE_URL` is not an absolute http(s) URL or
    /// `GITHUB_CLIENT_ID` is set without `GITHUB_CLIENT_SECRET`
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let base_url = parse_base_url(&env_config::base_url())?;

        let github = match (env::var("GITHUB_CLIENT_ID"), env::var("GITHUB_CLIENT_SECRET")) {
            (Ok(client_id), Ok(client_secret)) => Some(GitHubConfig {
                client_id,
                client_secret,
            }),
            (Ok(_), Err(_)) => bail!("GITHUB_CLIENT_ID is set but GITHUB_CLIENT_SECRET is missing"),
            _ => None,
        };

        let defaults = ExpiryConfig::default();
        let secure_default = base_url.scheme() == "https";

        Ok(Self {
            http_port: env_config::http_port(),
            host: env_config::host(),
            database_url: env_config::database_url(),
            environment: Environment::from_str_or_default(
                &env::var("ENVIRONMENT").unwrap_or_default(),
            ),
            expiry: ExpiryConfig {
                session: seconds_or("SESSION_TTL_SECS", defaults.session),
                code: seconds_or("CODE_TTL_SECS", defaults.code),
                client: seconds_or("CLIENT_TTL_SECS", defaults.client),
                profile: seconds_or("PROFILE_TTL_SECS", defaults.profile),
                login: seconds_or("LOGIN_TTL_SECS", defaults.login),
            },
            http_client: HttpClientConfig {
                timeout_secs: env_config::seconds("HTTP_TIMEOUT_SECS", 10) as u64,
                max_redirects: env_config::seconds("MAX_REDIRECTS", 10) as usize,
            },
            strategies: StrategyConfig {
                github,
                enable_pgp: env_config::flag("ENABLE_PGP", true),
                use_true: env_config::flag("USE_TRUE_STRATEGY", false),
            },
            secure_cookies: env_config::flag("SECURE_COOKIES", secure_default),
            base_url,
        })
    }

    /// Configuration suitable for tests: in-memory database, localhost base URL
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute http(s) URL
    pub fn for_testing(base_url: &str) -> Result<Self> {
        Ok(Self {
            http_port: 0,
            host: "127.0.0.1".to_owned(),
            base_url: parse_base_url(base_url)?,
            database_url: "sqlite::memory:".to_owned(),
            environment: Environment::Testing,
            expiry: ExpiryConfig::default(),
            http_client: HttpClientConfig::default(),
            strategies: StrategyConfig {
                github: None,
                enable_pgp: true,
                use_true: true,
            },
            secure_cookies: false,
        })
    }

    /// Human readable summary logged at startup
    #[must_use]
    pub fn summary(&self) -> String {
        let mut strategies = Vec::new();
        if self.strategies.github.is_some() {
            strategies.push("github");
        }
        if self.strategies.enable_pgp {
            strategies.push("pgp");
        }
        if self.strategies.use_true {
            strategies.push("true");
        }

        format!(
            "relme-auth configuration: listen={}:{} base_url={} environment={} strategies=[{}] code_ttl={}s session_ttl={}s",
            self.host,
            self.http_port,
            self.base_url,
            self.environment,
            strategies.join(","),
            self.expiry.code.num_seconds(),
            self.expiry.session.num_seconds(),
        )
    }
}

fn seconds_or(name: &str, default: Duration) -> Duration {
    Duration::seconds(env_config::seconds(name, default.num_seconds()))
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("Invalid BASE_URL: {raw}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("BASE_URL must be http or https, got {}", url.scheme());
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(Environment::from_str_or_default("prod"), Environment::Production);
        assert_eq!(Environment::from_str_or_default("TEST"), Environment::Testing);
        assert_eq!(Environment::from_str_or_default("other"), Environment::Development);
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(parse_base_url("ftp://example.com").is_err());
        assert!(parse_base_url("not a url").is_err());
        assert!(parse_base_url("https://auth.example.com").is_ok());
    }

    #[test]
    fn test_default_expiry_windows() {
        let expiry = ExpiryConfig::default();
        assert_eq!(expiry.code.num_seconds(), 60);
        assert_eq!(expiry.session.num_seconds(), 300);
        assert_eq!(expiry.login.num_days(), 7);
    }
}
