// ABOUTME: Strategy registry: the closed set of identity providers that can vouch for a profile link
// ABOUTME: Dispatches match, redirect and callback to the provider and keeps registration order
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # Identity strategies
//!
//! A strategy decides whether it can handle a link found on a profile page,
//! starts its own provider exchange (stashing the expected identity under a
//! single-use correlation key) and, on callback, returns the identity the
//! provider vouched for.
//!
//! The registry is an ordered list; [`Strategies::is_allowed`] returns the
//! first strategy that matches, so registration order breaks ties.

mod always_true;
mod github;
mod pgp;
mod store;

pub use always_true::AlwaysTrue;
pub use github::{GitHub, GitHubEndpoints};
pub use pgp::{ClearsignVerifier, GpgVerifier, Pgp};
pub use store::StrategyStore;

use crate::config::ServerConfig;
use crate::constants::ttl;
use crate::errors::AppError;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Name of the PGP strategy, which discovery treats specially
pub const PGP: &str = pgp::NAME;

/// Form fields delivered to a callback
pub type CallbackForm = HashMap<String, String>;

/// Failures reported by a strategy's callback leg
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The provider authenticated someone other than the expected identity
    #[error("the chosen provider says you are unauthorized")]
    Unauthorized,
    /// The callback does not correspond to any live redirect
    #[error("the authentication flow is unknown or has expired")]
    Unknown,
    /// The provider could not be reached or answered nonsense
    #[error("provider error: {0}")]
    Provider(String),
    /// Failure inside the server, such as RNG exhaustion
    #[error(transparent)]
    Internal(#[from] AppError),
}

impl From<StrategyError> for AppError {
    fn from(error: StrategyError) -> Self {
        match error {
            StrategyError::Unauthorized => Self::unauthorized(error.to_string()),
            StrategyError::Unknown => Self::invalid_request(error.to_string()),
            StrategyError::Provider(message) => Self::internal(message),
            StrategyError::Internal(inner) => inner,
        }
    }
}

/// One registered identity provider
pub enum Strategy {
    /// GitHub OAuth, vouching through the account's website field
    GitHub(GitHub),
    /// Clearsigned challenge checked against a published public key
    Pgp(Pgp),
    /// Development-only strategy that vouches for everyone
    AlwaysTrue(AlwaysTrue),
}

impl Strategy {
    /// Unique lowercase name, passed around as the `provider` parameter
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GitHub(_) => github::NAME,
            Self::Pgp(_) => pgp::NAME,
            Self::AlwaysTrue(_) => always_true::NAME,
        }
    }

    /// Whether this strategy can authenticate the given profile link
    #[must_use]
    pub fn matches(&self, link: &Url) -> bool {
        match self {
            Self::GitHub(_) => GitHub::matches(link),
            Self::Pgp(_) => false,
            Self::AlwaysTrue(_) => true,
        }
    }

    /// Begin the provider exchange, returning the URL to send the user to
    ///
    /// # Errors
    ///
    /// Returns an error if a correlation key cannot be generated
    pub fn redirect(&self, me: &str, profile: &str) -> Result<String, StrategyError> {
        match self {
            Self::GitHub(s) => s.redirect(me),
            Self::Pgp(s) => s.redirect(me, profile),
            Self::AlwaysTrue(s) => Ok(s.redirect(me)),
        }
    }

    /// Complete the provider exchange, returning the verified identity
    ///
    /// # Errors
    ///
    /// [`StrategyError::Unauthorized`] when the provider vouches for someone
    /// else, [`StrategyError::Unknown`] when the callback has no live redirect
    pub async fn callback(&self, form: &CallbackForm) -> Result<String, StrategyError> {
        match self {
            Self::GitHub(s) => s.callback(form).await,
            Self::Pgp(s) => s.callback(form).await,
            Self::AlwaysTrue(_) => AlwaysTrue::callback(form),
        }
    }
}

/// Ordered strategy registry
#[derive(Default)]
pub struct Strategies {
    strategies: Vec<Strategy>,
}

impl Strategies {
    /// Build a registry from an explicit list, keeping its order
    #[must_use]
    pub fn new(strategies: Vec<Strategy>) -> Self {
        Self { strategies }
    }

    /// Build the registry described by the configuration: GitHub, PGP, then the development strategy
    #[must_use]
    pub fn from_config(config: &ServerConfig, verifier: Arc<dyn ClearsignVerifier>) -> Self {
        let state_ttl = Duration::seconds(ttl::STRATEGY_STATE_SECS);
        let base_url = config.base_url.as_str().trim_end_matches('/');
        let mut strategies = Vec::new();

        if let Some(github) = &config.strategies.github {
            strategies.push(Strategy::GitHub(GitHub::new(
                github.clone(),
                GitHubEndpoints::default(),
                base_url,
                state_ttl,
            )));
        }
        if config.strategies.enable_pgp {
            strategies.push(Strategy::Pgp(Pgp::new(
                base_url,
                &config.http_client,
                verifier,
                state_ttl,
            )));
        }
        if config.strategies.use_true {
            strategies.push(Strategy::AlwaysTrue(AlwaysTrue::new(base_url)));
        }

        Self { strategies }
    }

    /// First strategy, in registration order, able to authenticate `link`
    #[must_use]
    pub fn is_allowed(&self, link: &str) -> Option<&Strategy> {
        let link = Url::parse(link).ok()?;
        self.strategies.iter().find(|s| s.matches(&link))
    }

    /// Strategy registered under `name`
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|s| s.name() == name)
    }

    /// Registered strategy names, in order
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(Strategy::name).collect()
    }
}

/// Compare two profile URLs, ignoring a trailing slash
#[must_use]
pub fn urls_equal(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}
