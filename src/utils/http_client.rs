// ABOUTME: Outbound HTTP client construction with per-fetch timeouts and redirect policies
// ABOUTME: Separates redirect-following page fetches from single-hop redirect expansion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::config::HttpClientConfig;
use crate::constants::http_names::USER_AGENT;
use reqwest::redirect::Policy;
use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Create a new HTTP client with custom configuration
///
/// Falls back to a default client if the builder cannot produce one, which
/// only happens when the TLS backend fails to initialise.
pub fn create_custom_client<F>(config_fn: F) -> Client
where
    F: FnOnce(ClientBuilder) -> ClientBuilder,
{
    let builder = ClientBuilder::new().user_agent(USER_AGENT);
    config_fn(builder).build().unwrap_or_else(|_| Client::new())
}

/// Client for fetching profile and client pages, following redirects up to the configured bound
#[must_use]
pub fn page_client(config: &HttpClientConfig) -> Client {
    let timeout = Duration::from_secs(config.timeout_secs);
    let max_redirects = config.max_redirects;
    create_custom_client(|builder| {
        builder
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::limited(max_redirects))
    })
}

/// Client that never follows redirects, used to walk redirect chains one hop at a time
#[must_use]
pub fn single_hop_client(config: &HttpClientConfig) -> Client {
    let timeout = Duration::from_secs(config.timeout_secs);
    create_custom_client(|builder| {
        builder
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
    })
}

/// Client for provider API calls and token exchanges
#[must_use]
pub fn oauth_client() -> Client {
    create_custom_client(|builder| {
        builder
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
    })
}
