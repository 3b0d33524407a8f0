// ABOUTME: Client trust resolution: decides whether a redirect_uri may receive codes for a client_id
// ABOUTME: Trusts same-origin clients directly, otherwise fetches the client's whitelist
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # Client Trust Resolver
//!
//! A `(client_id, redirect_uri)` pair is trusted when both share an origin,
//! or when the page at `client_id` whitelists the redirect URI through a
//! `Link` header or a `rel="redirect_uri"` element. Same-origin `localhost`
//! clients are named `Local App`. Every other outcome, including a failed or
//! non-2xx fetch, is a trust failure. Only successes are cached.

use crate::config::HttpClientConfig;
use crate::constants::http_names::LOCAL_APP_NAME;
use crate::database::Database;
use crate::errors::{AppError, AppResult};
use crate::microformats;
use crate::models::{Client, Expiring};
use crate::utils::http_client::page_client;
use chrono::{Duration, Utc};
use reqwest::header::LINK;
use tracing::{debug, info, warn};
use url::Url;

const BAD_REDIRECT: &str = "bad redirect_uri";

/// Resolves and caches client trust decisions
#[derive(Clone)]
pub struct ClientTrustResolver {
    database: Database,
    http: reqwest::Client,
    ttl: Duration,
}

impl ClientTrustResolver {
    /// Create a resolver caching decisions in `database` for `ttl`
    #[must_use]
    pub fn new(database: Database, http_config: &HttpClientConfig, ttl: Duration) -> Self {
        Self {
            database,
            http: page_client(http_config),
            ttl,
        }
    }

    /// Resolve trust for a pair, consulting the cache first
    ///
    /// # Errors
    ///
    /// Returns an `Untrusted` error when the redirect URI is not authorized for
    /// the client, or a database error if the cache cannot be read or written
    pub async fn resolve(&self, client_id: &str, redirect_uri: &str) -> AppResult<Client> {
        if let Some(client) = self.database.get_client(client_id, redirect_uri).await? {
            if !client.expired() {
                return Ok(client);
            }
            debug!(client_id = %client_id, "cached client trust expired");
        }

        let client = self.query(client_id, redirect_uri).await?;
        self.database.upsert_client(&client).await?;

        info!(client_id = %client_id, redirect_uri = %redirect_uri, name = %client.name, "client trusted");
        Ok(client)
    }

    async fn query(&self, client_id: &str, redirect_uri: &str) -> AppResult<Client> {
        let client_url = Url::parse(client_id).map_err(|_| AppError::untrusted(BAD_REDIRECT))?;
        let redirect_url =
            Url::parse(redirect_uri).map_err(|_| AppError::untrusted(BAD_REDIRECT))?;

        if same_origin(&client_url, &redirect_url) {
            let name = if client_url.host_str() == Some("localhost") {
                LOCAL_APP_NAME
            } else {
                client_id
            };
            return Ok(self.trusted(client_id, redirect_uri, name));
        }

        let response = self.http.get(client_url.clone()).send().await.map_err(|e| {
            warn!(client_id = %client_id, error = %e, "could not fetch client information");
            AppError::untrusted(BAD_REDIRECT)
        })?;

        if !response.status().is_success() {
            warn!(client_id = %client_id, status = %response.status(), "client information page not available");
            return Err(AppError::untrusted(BAD_REDIRECT));
        }

        // Relative targets resolve against the final URL after redirects
        let base = response.url().clone();
        let mut whitelist = microformats::link_header_targets(
            response
                .headers()
                .get_all(LINK)
                .iter()
                .filter_map(|value| value.to_str().ok()),
            "redirect_uri",
            &base,
        );

        let body = response.text().await.map_err(|e| {
            warn!(client_id = %client_id, error = %e, "could not read client information");
            AppError::untrusted(BAD_REDIRECT)
        })?;

        let name = microformats::parse_app(&body, &base)
            .map(|app| app.name)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| client_id.to_owned());
        whitelist.extend(microformats::redirect_uris(&body, &base));

        let listed = whitelist
            .iter()
            .filter_map(|candidate| Url::parse(candidate).ok())
            .any(|candidate| candidate == redirect_url);
        if !listed {
            warn!(client_id = %client_id, redirect_uri = %redirect_uri, "redirect_uri not whitelisted by client");
            return Err(AppError::untrusted(BAD_REDIRECT));
        }

        Ok(self.trusted(client_id, redirect_uri, &name))
    }

    fn trusted(&self, client_id: &str, redirect_uri: &str, name: &str) -> Client {
        let now = Utc::now();
        Client {
            id: client_id.to_owned(),
            redirect_uri: redirect_uri.to_owned(),
            name: name.to_owned(),
            updated_at: now,
            expires_at: now + self.ttl,
        }
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}
