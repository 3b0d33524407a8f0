// ABOUTME: rel=me discovery pipeline producing the ordered event stream for one profile
// ABOUTME: Serves cached profiles directly, otherwise verifies each candidate link and caches the result
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # Discovery
//!
//! A run answers one [`DiscoveryRequest`] with either a single
//! [`CachedProfile`] or a sequence of [`DiscoveryEvent`]s in a fixed order:
//! `pgp`, then `found`/`not-supported` for every candidate link, then
//! `verified`/`unverified`/`error` for the same links, then `done`.
//!
//! Events are pushed onto a bounded channel; the consumer (usually a
//! websocket writer) owns delivery. Candidate links are processed one after
//! another so the order depends only on the profile page.

mod relme;

pub use relme::{normalize, RelMe, RelMeError};

use crate::config::HttpClientConfig;
use crate::constants::http_names::CACHED_AT_FORMAT;
use crate::database::Database;
use crate::errors::AppError;
use crate::identifier::parse_profile_url;
use crate::models::{Expiring, Method, Profile};
use crate::strategy::{Strategies, PGP};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Kind of a discovery event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// The profile publishes a public key and PGP is registered
    Pgp,
    /// A candidate link some strategy can authenticate
    Found,
    /// A candidate link no strategy can authenticate
    NotSupported,
    /// The candidate links back to the profile
    Verified,
    /// The candidate does not link back to the profile
    Unverified,
    /// A page could not be fetched
    Error,
    /// Discovery finished
    Done,
}

/// Everything the authorization flow needs to continue with one method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Query string for `/auth/start`
    #[serde(rename = "Query")]
    pub query: String,
    /// Strategy name
    #[serde(rename = "StrategyName")]
    pub strategy_name: String,
    /// Link the strategy verifies
    #[serde(rename = "ProfileURL")]
    pub profile_url: String,
}

/// One step of a fresh discovery run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryEvent {
    /// Event kind
    #[serde(rename = "Type")]
    pub kind: EventKind,
    /// Link the event is about
    #[serde(rename = "Link", default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// How to continue with the link, when a strategy can handle it
    #[serde(rename = "Method", default, skip_serializing_if = "Option::is_none")]
    pub method: Option<MethodDescriptor>,
}

impl DiscoveryEvent {
    fn new(kind: EventKind, link: Option<&str>, method: Option<MethodDescriptor>) -> Self {
        Self {
            kind,
            link: link.map(str::to_owned),
            method,
        }
    }

    /// Terminal event for a failed run
    #[must_use]
    pub const fn error() -> Self {
        Self {
            kind: EventKind::Error,
            link: None,
            method: None,
        }
    }
}

/// Answer served from the profile cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedProfile {
    /// Day and month the profile was discovered
    #[serde(rename = "CachedAt")]
    pub cached_at: String,
    /// Previously verified methods
    #[serde(rename = "Methods")]
    pub methods: Vec<MethodDescriptor>,
}

/// A message delivered to a discovery listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiscoveryMessage {
    /// A step of a fresh run
    Event(DiscoveryEvent),
    /// A cache hit
    Cached(CachedProfile),
}

impl From<DiscoveryEvent> for DiscoveryMessage {
    fn from(event: DiscoveryEvent) -> Self {
        Self::Event(event)
    }
}

/// Request to discover the methods of a profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequest {
    /// Profile URL
    #[serde(rename = "Me")]
    pub me: String,
    /// Client the user is signing in to
    #[serde(rename = "ClientID", default)]
    pub client_id: String,
    /// Redirect URI of the in-flight session
    #[serde(rename = "RedirectURI", default)]
    pub redirect_uri: String,
    /// Bypass the profile cache
    #[serde(rename = "Force", default)]
    pub force: bool,
}

/// Reasons a run stops early
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The listener dropped its receiver
    #[error("discovery listener went away")]
    ListenerClosed,
    /// Reading or writing the profile cache failed
    #[error(transparent)]
    Store(#[from] AppError),
}

/// Channel a discovery run pushes its messages onto
pub type Sink = mpsc::Sender<DiscoveryMessage>;

async fn emit(sink: &Sink, message: impl Into<DiscoveryMessage>) -> Result<(), DiscoveryError> {
    sink.send(message.into())
        .await
        .map_err(|_| DiscoveryError::ListenerClosed)
}

/// The discovery and verification engine
#[derive(Clone)]
pub struct Discovery {
    relme: RelMe,
    strategies: Arc<Strategies>,
    database: Database,
    profile_ttl: Duration,
}

impl Discovery {
    /// Create an engine caching results in `database` for `profile_ttl`
    #[must_use]
    pub fn new(
        database: Database,
        strategies: Arc<Strategies>,
        http_config: &HttpClientConfig,
        profile_ttl: Duration,
    ) -> Self {
        Self {
            relme: RelMe::new(http_config),
            strategies,
            database,
            profile_ttl,
        }
    }

    /// Answer one request, pushing every message onto `sink`
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryError::ListenerClosed`] when the receiver is gone and
    /// [`DiscoveryError::Store`] when the profile cache fails. Network failures
    /// are reported as events instead.
    pub async fn run(&self, request: &DiscoveryRequest, sink: &Sink) -> Result<(), DiscoveryError> {
        let Some(me) = parse_profile_url(&request.me) else {
            debug!(me = %request.me, "discovery requested for invalid profile url");
            return emit(sink, DiscoveryEvent::error()).await;
        };

        if !request.force {
            if let Some(profile) = self.database.get_profile(&me).await.map_err(AppError::from)? {
                if !profile.expired() {
                    debug!(me = %me, "serving cached profile");
                    return emit(sink, DiscoveryMessage::Cached(self.cached(&profile, request)))
                        .await;
                }
            }
        }

        self.discover(&me, request, sink).await
    }

    /// Fresh discovery for an already normalized profile URL, bypassing the cache
    ///
    /// # Errors
    ///
    /// Same as [`Discovery::run`]
    pub async fn discover(
        &self,
        me: &str,
        request: &DiscoveryRequest,
        sink: &Sink,
    ) -> Result<(), DiscoveryError> {
        let auth = match self.relme.find_auth(me).await {
            Ok(auth) => auth,
            Err(e) => {
                warn!(me = %me, error = %e, "could not fetch profile page");
                return emit(sink, DiscoveryEvent::error()).await;
            }
        };

        let mut methods = Vec::new();

        if let Some(key) = auth.pgpkey.as_deref() {
            if self.strategies.find(PGP).is_some() {
                let method = describe(me, PGP, key, &request.redirect_uri);
                emit(sink, DiscoveryEvent::new(EventKind::Pgp, Some(key), Some(method))).await?;
                methods.push(Method {
                    provider: PGP.to_owned(),
                    profile: key.to_owned(),
                });
            }
        }

        for link in &auth.links {
            let event = match self.descriptor_for(me, link, request) {
                Some(method) => DiscoveryEvent::new(EventKind::Found, Some(link), Some(method)),
                None => DiscoveryEvent::new(EventKind::NotSupported, Some(link), None),
            };
            emit(sink, event).await?;
        }

        for link in &auth.links {
            let method = self.descriptor_for(me, link, request);
            let event = match self.relme.links_to(link, me).await {
                Ok(true) => {
                    if let Some(method) = &method {
                        methods.push(Method {
                            provider: method.strategy_name.clone(),
                            profile: link.clone(),
                        });
                    }
                    DiscoveryEvent::new(EventKind::Verified, Some(link), method)
                }
                Ok(false) => DiscoveryEvent::new(EventKind::Unverified, Some(link), method),
                Err(e) => {
                    debug!(me = %me, link = %link, error = %e, "could not fetch candidate page");
                    DiscoveryEvent::new(EventKind::Error, Some(link), None)
                }
            };
            emit(sink, event).await?;
        }

        methods.sort_by(|a, b| a.provider.cmp(&b.provider));
        let now = Utc::now();
        let profile = Profile {
            me: me.to_owned(),
            updated_at: now,
            expires_at: now + self.profile_ttl,
            methods,
        };
        self.database
            .cache_profile(&profile)
            .await
            .map_err(AppError::from)?;
        info!(me = %me, methods = profile.methods.len(), "profile discovered");

        emit(sink, DiscoveryEvent::new(EventKind::Done, None, None)).await
    }

    fn descriptor_for(
        &self,
        me: &str,
        link: &str,
        request: &DiscoveryRequest,
    ) -> Option<MethodDescriptor> {
        self.strategies
            .is_allowed(link)
            .map(|strategy| describe(me, strategy.name(), link, &request.redirect_uri))
    }

    fn cached(&self, profile: &Profile, request: &DiscoveryRequest) -> CachedProfile {
        CachedProfile {
            cached_at: profile.updated_at.format(CACHED_AT_FORMAT).to_string(),
            methods: profile
                .methods
                .iter()
                .filter(|method| self.strategies.find(&method.provider).is_some())
                .map(|method| {
                    describe(&profile.me, &method.provider, &method.profile, &request.redirect_uri)
                })
                .collect(),
        }
    }
}

/// Descriptor for continuing at `/auth/start` with one method
#[must_use]
pub fn describe(me: &str, provider: &str, profile: &str, redirect_uri: &str) -> MethodDescriptor {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("me", me)
        .append_pair("provider", provider)
        .append_pair("profile", profile)
        .append_pair("redirect_uri", redirect_uri)
        .finish();

    MethodDescriptor {
        query,
        strategy_name: provider.to_owned(),
        profile_url: profile.to_owned(),
    }
}
