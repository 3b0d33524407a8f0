// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides the in-memory trust store, test configuration, server resources and a fake PGP verifier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `relme_auth`

use anyhow::{bail, Result};
use async_trait::async_trait;
use relme_auth::{
    authorization::AuthorizationRequest,
    config::ServerConfig,
    database::Database,
    models::{Method, Profile},
    server::ServerResources,
    strategy::{AlwaysTrue, ClearsignVerifier, Pgp, Strategies, Strategy},
};
use chrono::{Duration, Utc};
use std::sync::{Arc, Once};

static INIT_LOGGER: Once = Once::new();

/// Base URL the test server pretends to live at
pub const BASE_URL: &str = "http://auth.example";
/// Same-origin client: trusted without any fetch
pub const CLIENT_ID: &str = "https://app.example/";
/// Redirect URI of [`CLIENT_ID`]
pub const REDIRECT_URI: &str = "https://app.example/cb";
/// Profile used by most tests
pub const ME: &str = "https://me.example/";
/// Armored key the fake verifier accepts
pub const GOOD_KEY: &str = "good-key";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        // Check for TEST_LOG environment variable to control test logging level
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            Ok("WARN" | "ERROR") | _ => tracing::Level::WARN, // Default to WARN for quiet tests
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Standard test database setup
pub async fn create_test_database() -> Result<Database> {
    init_test_logging();
    Database::new("sqlite::memory:").await
}

/// Verifier that accepts any "signature" made with [`GOOD_KEY`] and returns the signed text unchanged
pub struct FakeVerifier;

#[async_trait]
impl ClearsignVerifier for FakeVerifier {
    async fn verify(&self, armored_key: &str, signed: &str) -> Result<String> {
        if armored_key.trim() != GOOD_KEY {
            bail!("unknown key");
        }
        Ok(signed.to_owned())
    }
}

/// Test configuration
pub fn test_config() -> ServerConfig {
    ServerConfig::for_testing(BASE_URL).expect("valid test base url")
}

/// Strategies used by most tests: PGP with the fake verifier, then the development strategy
pub fn test_strategies(config: &ServerConfig) -> Strategies {
    Strategies::new(vec![
        Strategy::Pgp(Pgp::new(
            BASE_URL,
            &config.http_client,
            Arc::new(FakeVerifier),
            Duration::seconds(60),
        )),
        Strategy::AlwaysTrue(AlwaysTrue::new(BASE_URL)),
    ])
}

/// Server resources over an in-memory database
pub async fn create_test_resources_with(config: ServerConfig) -> Result<Arc<ServerResources>> {
    let database = create_test_database().await?;
    let strategies = test_strategies(&config);
    Ok(Arc::new(ServerResources::from_parts(
        config, database, strategies,
    )))
}

/// Development-strategy link discovery verified on [`ME`]
pub const SOCIAL_PROFILE: &str = "https://social.example/me";

/// Cache a live discovery result listing `(provider, profile)` methods for `me`
pub async fn cache_methods(database: &Database, me: &str, methods: &[(&str, &str)]) -> Result<()> {
    let now = Utc::now();
    database
        .cache_profile(&Profile {
            me: me.to_owned(),
            updated_at: now,
            expires_at: now + Duration::days(7),
            methods: methods
                .iter()
                .map(|(provider, profile)| Method {
                    provider: (*provider).to_owned(),
                    profile: (*profile).to_owned(),
                })
                .collect(),
        })
        .await
}

/// Server resources with [`ME`] already discovered through the development strategy
pub async fn create_discovered_resources() -> Result<Arc<ServerResources>> {
    let resources = create_test_resources().await?;
    cache_methods(&resources.database, ME, &[("true", SOCIAL_PROFILE)]).await?;
    Ok(resources)
}

/// Server resources with the default test configuration
pub async fn create_test_resources() -> Result<Arc<ServerResources>> {
    create_test_resources_with(test_config()).await
}

/// Authorization request for [`ME`] at the same-origin test client
pub fn auth_request(response_type: &str, scope: &str) -> AuthorizationRequest {
    AuthorizationRequest {
        me: ME.to_owned(),
        client_id: CLIENT_ID.to_owned(),
        redirect_uri: REDIRECT_URI.to_owned(),
        state: "rp-state".to_owned(),
        response_type: response_type.to_owned(),
        scope: scope.to_owned(),
        ..AuthorizationRequest::default()
    }
}

/// Value of a query parameter in an absolute URL
pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}
