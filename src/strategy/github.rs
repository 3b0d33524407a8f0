// ABOUTME: GitHub OAuth strategy that vouches for a profile through the account's website field
// ABOUTME: Exchanges the callback code for a token and compares the user's blog URL to the expected identity
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::{urls_equal, CallbackForm, StrategyError, StrategyStore};
use crate::config::GitHubConfig;
use crate::utils::http_client::oauth_client;
use chrono::Duration;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

pub(super) const NAME: &str = "github";

/// GitHub endpoints; overridable so the flow can run against a local fake
#[derive(Debug, Clone)]
pub struct GitHubEndpoints {
    /// Authorization page
    pub authorize_url: String,
    /// Code exchange
    pub token_url: String,
    /// REST API root
    pub api_url: String,
}

impl Default for GitHubEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: "https://github.com/login/oauth/authorize".into(),
            token_url: "https://github.com/login/oauth/access_token".into(),
            api_url: "https://api.github.com".into(),
        }
    }
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    blog: Option<String>,
}

/// GitHub OAuth strategy
pub struct GitHub {
    credentials: GitHubConfig,
    endpoints: GitHubEndpoints,
    callback_url: String,
    store: StrategyStore<String>,
    http: reqwest::Client,
}

impl GitHub {
    /// Create the strategy; `base_url` is where this server is reachable
    #[must_use]
    pub fn new(
        credentials: GitHubConfig,
        endpoints: GitHubEndpoints,
        base_url: &str,
        state_ttl: Duration,
    ) -> Self {
        Self {
            credentials,
            endpoints,
            callback_url: format!("{base_url}/callback/{NAME}"),
            store: StrategyStore::new(state_ttl),
            http: oauth_client(),
        }
    }

    pub(super) fn matches(link: &Url) -> bool {
        link.host_str() == Some("github.com")
    }

    pub(super) fn redirect(&self, me: &str) -> Result<String, StrategyError> {
        let state = self.store.insert(me.to_owned())?;

        let mut url = Url::parse(&self.endpoints.authorize_url)
            .map_err(|e| StrategyError::Provider(format!("invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.credentials.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("response_type", "code")
            .append_pair("state", &state);

        Ok(url.into())
    }

    pub(super) async fn callback(&self, form: &CallbackForm) -> Result<String, StrategyError> {
        let expected = form
            .get("state")
            .and_then(|state| self.store.claim(state))
            .ok_or(StrategyError::Unknown)?;
        let code = form.get("code").ok_or(StrategyError::Unknown)?;

        let access_token = self.exchange_code(code).await?;
        let user: UserResponse = self
            .http
            .get(format!("{}/user", self.endpoints.api_url.trim_end_matches('/')))
            .bearer_auth(&access_token)
            .header(ACCEPT, "application/vnd.github+json")
            .header(USER_AGENT, "relme-auth")
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| StrategyError::Provider(format!("github user lookup failed: {e}")))?
            .json()
            .await
            .map_err(|e| StrategyError::Provider(format!("github user lookup unreadable: {e}")))?;

        let blog = user.blog.unwrap_or_default();
        if !urls_equal(&blog, &expected) {
            warn!(expected = %expected, blog = %blog, "github account does not link back to profile");
            return Err(StrategyError::Unauthorized);
        }

        debug!(me = %expected, "github vouched for profile");
        Ok(expected)
    }

    async fn exchange_code(&self, code: &str) -> Result<String, StrategyError> {
        let response: AccessTokenResponse = self
            .http
            .post(&self.endpoints.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.callback_url.as_str()),
            ])
            .send()
            .await
            .map_err(|e| StrategyError::Provider(format!("github token exchange failed: {e}")))?
            .json()
            .await
            .map_err(|e| StrategyError::Provider(format!("github token response unreadable: {e}")))?;

        match (response.access_token, response.error) {
            (Some(token), _) => Ok(token),
            (None, error) => Err(StrategyError::Provider(format!(
                "github token exchange refused: {}",
                error.unwrap_or_default()
            ))),
        }
    }
}
