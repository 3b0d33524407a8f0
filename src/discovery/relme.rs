// ABOUTME: rel=me fetching: candidate identity links on a profile and mutual-link verification
// ABOUTME: Expands redirect chains hop by hop with a visited set so cycles terminate
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::config::HttpClientConfig;
use crate::microformats::{self, AuthLinks};
use crate::utils::http_client::{page_client, single_hop_client};
use reqwest::header::LOCATION;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Failure to fetch a page during discovery
#[derive(Debug, Error)]
pub enum RelMeError {
    /// The link is not a fetchable URL
    #[error("invalid url {0}")]
    InvalidUrl(String),
    /// The request failed before a response arrived
    #[error("could not fetch {url}: {source}")]
    Fetch {
        /// Requested URL
        url: String,
        /// Transport error
        #[source]
        source: reqwest::Error,
    },
}

/// Page fetcher for rel=me discovery
#[derive(Clone)]
pub struct RelMe {
    client: reqwest::Client,
    single_hop: reqwest::Client,
    max_redirects: usize,
}

impl RelMe {
    /// Create a fetcher honouring the configured timeout and hop bound
    #[must_use]
    pub fn new(config: &HttpClientConfig) -> Self {
        Self {
            client: page_client(config),
            single_hop: single_hop_client(config),
            max_redirects: config.max_redirects,
        }
    }

    /// Fetch a page following redirects, returning its final URL and body
    async fn fetch(&self, page: &str) -> Result<(Url, String), RelMeError> {
        let url = parse_fetchable(page)?;
        let fetch_error = |source| RelMeError::Fetch {
            url: page.to_owned(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(fetch_error)?;
        let final_url = response.url().clone();
        let body = response.text().await.map_err(fetch_error)?;

        Ok((final_url, body))
    }

    /// All `rel="me"` links on a page
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be fetched
    pub async fn find(&self, page: &str) -> Result<Vec<String>, RelMeError> {
        let (base, body) = self.fetch(page).await?;
        Ok(microformats::rel_me_links(&body, &base))
    }

    /// Candidate identity links and pgpkey of a profile page
    ///
    /// # Errors
    ///
    /// Returns an error if the profile page cannot be fetched
    pub async fn find_auth(&self, me: &str) -> Result<AuthLinks, RelMeError> {
        let (base, body) = self.fetch(me).await?;
        Ok(microformats::auth_links(&body, &base))
    }

    /// Whether `page` has a rel=me link that leads to `target`
    ///
    /// Both sides are expanded through their redirect chains and compared
    /// after normalization, so a shortened link on a third-party profile still
    /// counts as pointing home.
    ///
    /// # Errors
    ///
    /// Returns an error if `page` itself cannot be fetched
    pub async fn links_to(&self, page: &str, target: &str) -> Result<bool, RelMeError> {
        let links = self.find(page).await?;

        let targets: HashSet<String> = self
            .expand(target)
            .await
            .iter()
            .map(|u| normalize(u))
            .collect();

        for link in links {
            for hop in self.expand(&link).await {
                if targets.contains(&normalize(&hop)) {
                    debug!(page = %page, link = %link, target = %target, "rel=me link verified");
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    /// The URL followed by every URL it redirects to, stopping at a revisit or the hop bound
    pub async fn expand(&self, start: &str) -> Vec<String> {
        let Ok(mut current) = Url::parse(start) else {
            return vec![start.to_owned()];
        };

        let mut chain = Vec::new();
        let mut visited = HashSet::new();

        loop {
            if !visited.insert(current.to_string()) {
                break;
            }
            chain.push(current.to_string());
            if chain.len() > self.max_redirects {
                break;
            }

            let Ok(response) = self.single_hop.get(current.clone()).send().await else {
                break;
            };
            if !response.status().is_redirection() {
                break;
            }

            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|location| location.to_str().ok())
                .and_then(|location| current.join(location).ok());
            match next {
                Some(next) => current = next,
                None => break,
            }
        }

        chain
    }
}

fn parse_fetchable(page: &str) -> Result<Url, RelMeError> {
    Url::parse(page)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
        .ok_or_else(|| RelMeError::InvalidUrl(page.to_owned()))
}

/// Comparison form of a URL: https scheme, no trailing slash
#[must_use]
pub fn normalize(raw: &str) -> String {
    let normalized = match Url::parse(raw) {
        Ok(mut url) => {
            if url.scheme() == "http" {
                // http to https is always a permitted scheme change
                let _ = url.set_scheme("https");
            }
            String::from(url)
        }
        Err(_) => raw.to_owned(),
    };

    normalized.trim_end_matches('/').to_owned()
}
