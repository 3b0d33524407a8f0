// ABOUTME: Authorization state machine: sessions, provider choice, callbacks, codes and tokens
// ABOUTME: Enforces expiry, client trust, redirect matching and PKCE before any credential is issued
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # Authorization
//!
//! A session moves through `Started → ProviderChosen → Verified → Exchanged`.
//! There is at most one session per profile; starting again replaces it. A
//! code lives on the session row and redeeming it deletes the row, so a code
//! is usable exactly once and only inside its window.
//!
//! Codes minted for `response_type=id` sessions prove identity only and are
//! redeemed at the authorization endpoint. Codes for `response_type=code`
//! sessions are exchanged for an access token at the token endpoint.

pub mod pkce;
pub mod token;

use crate::client_trust::ClientTrustResolver;
use crate::config::ExpiryConfig;
use crate::constants::secrets::{CODE_LEN, LOGIN_ID_LEN};
use crate::database::{Database, NewSession};
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::identifier::{parse_client_id, parse_profile_url};
use crate::models::{Code, Expiring, Login, ResponseType, Token};
use crate::strategy::{CallbackForm, Strategies};
use crate::utils::random::random_string;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

const INVALID_CODE: &str = "The code provided was not valid";
const EXPIRED_CODE: &str = "The auth code has expired (valid for 60 seconds)";

/// Parameters of an authorization request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    /// Profile URL to authenticate, empty when the user has not entered it yet
    #[serde(default)]
    pub me: String,
    /// Relying party identifier
    #[serde(default)]
    pub client_id: String,
    /// Where the code is delivered
    #[serde(default)]
    pub redirect_uri: String,
    /// Opaque relying party state
    #[serde(default)]
    pub state: String,
    /// `id` (default) or `code`
    #[serde(default)]
    pub response_type: String,
    /// Space separated scopes
    #[serde(default)]
    pub scope: String,
    /// PKCE challenge
    #[serde(default)]
    pub code_challenge: String,
    /// PKCE method
    #[serde(default)]
    pub code_challenge_method: String,
}

/// What the chooser shows before `me` is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDescription {
    /// Client identifier
    pub client_id: String,
    /// Client display name
    pub client_name: String,
    /// Redirect URI the request carries
    pub redirect_uri: String,
    /// Requested scopes
    pub scopes: Vec<String>,
}

/// What the chooser shows once a session has started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chooser {
    /// Client identifier
    pub client_id: String,
    /// Client display name
    pub client_name: String,
    /// Normalized profile URL
    pub me: String,
    /// Requested scopes
    pub scopes: Vec<String>,
    /// A recent login for `me` lets the user continue without a provider
    pub skip: bool,
    /// Discovery endpoint
    pub websocket: String,
}

/// Result of starting an authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Started {
    /// The request has no `me` yet
    NeedsProfile(ClientDescription),
    /// A session was stored for `me`
    Session(Chooser),
}

/// Parameters of `/auth/start`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderChoice {
    /// Profile URL
    #[serde(default)]
    pub me: String,
    /// Strategy name
    #[serde(default)]
    pub provider: String,
    /// Link the strategy is expected to verify
    #[serde(default)]
    pub profile: String,
    /// Must equal the session's redirect URI
    #[serde(default)]
    pub redirect_uri: String,
}

/// Result of a successful provider callback
#[derive(Debug, Clone)]
pub struct Verified {
    /// Redirect URI carrying `code` and `state`
    pub redirect: String,
    /// Fresh login marker for the authenticated profile
    pub login: Login,
}

/// Parameters of a code verification at the authorization endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodeVerification {
    /// Code delivered to the redirect URI
    #[serde(default)]
    pub code: String,
    /// Must equal the session's client
    #[serde(default)]
    pub client_id: String,
    /// Must equal the session's redirect URI
    #[serde(default)]
    pub redirect_uri: String,
}

/// Parameters of a token request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// Only `authorization_code` is understood
    #[serde(default)]
    pub grant_type: String,
    /// Code delivered to the redirect URI
    #[serde(default)]
    pub code: String,
    /// Must equal the session's client
    #[serde(default)]
    pub client_id: String,
    /// Must equal the session's redirect URI
    #[serde(default)]
    pub redirect_uri: String,
    /// When given, must equal the session's profile
    #[serde(default)]
    pub me: Option<String>,
    /// PKCE verifier
    #[serde(default)]
    pub code_verifier: Option<String>,
}

/// Successful token response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Bearer string, returned only once
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: String,
    /// Granted scopes
    pub scope: String,
    /// Profile the token acts for
    pub me: String,
}

/// Answer of a bearer verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// Profile the token acts for
    pub me: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scope: String,
}

impl From<Token> for TokenInfo {
    fn from(token: Token) -> Self {
        Self {
            me: token.me,
            client_id: token.client_id,
            scope: token.scope,
        }
    }
}

/// The authorization protocol engine
#[derive(Clone)]
pub struct AuthorizationServer {
    database: Database,
    strategies: Arc<Strategies>,
    clients: ClientTrustResolver,
    expiry: ExpiryConfig,
    base_url: Url,
}

impl AuthorizationServer {
    /// Create the engine
    #[must_use]
    pub const fn new(
        database: Database,
        strategies: Arc<Strategies>,
        clients: ClientTrustResolver,
        expiry: ExpiryConfig,
        base_url: Url,
    ) -> Self {
        Self {
            database,
            strategies,
            clients,
            expiry,
            base_url,
        }
    }

    /// Registered strategies
    #[must_use]
    pub fn strategies(&self) -> &Strategies {
        &self.strategies
    }

    /// Validate an authorization request and store its session
    ///
    /// `login_id` is the login marker presented by the browser, if any.
    ///
    /// # Errors
    ///
    /// Returns an invalid request error for malformed parameters, an untrusted
    /// error when the client does not vouch for the redirect URI, or a storage error
    pub async fn start_session(
        &self,
        request: &AuthorizationRequest,
        login_id: Option<&str>,
    ) -> AppResult<Started> {
        let client_id = parse_client_id(&request.client_id)
            .ok_or_else(|| AppError::invalid_request("client_id is invalid"))?;
        if request.redirect_uri.is_empty() {
            return Err(AppError::invalid_request("missing parameter: redirect_uri"));
        }

        let client = self.clients.resolve(&client_id, &request.redirect_uri).await?;
        let scopes: Vec<String> = request.scope.split_whitespace().map(str::to_owned).collect();

        if request.me.is_empty() {
            return Ok(Started::NeedsProfile(ClientDescription {
                client_id: client.id,
                client_name: client.name,
                redirect_uri: request.redirect_uri.clone(),
                scopes,
            }));
        }

        if request.state.is_empty() {
            return Err(AppError::invalid_request("missing parameter: state"));
        }
        let me = parse_profile_url(&request.me)
            .ok_or_else(|| AppError::invalid_request("me is invalid"))?;

        let response_type = if request.response_type.is_empty() {
            ResponseType::Id
        } else {
            request
                .response_type
                .parse()
                .map_err(|_| AppError::invalid_request("Unknown response_type"))?
        };

        let scope = scopes.join(" ");
        let (scope, challenge, method) = match response_type {
            ResponseType::Id => (String::new(), "", ""),
            ResponseType::Code => {
                if scope.is_empty() {
                    return Err(AppError::invalid_request(
                        "scope is required for response_type=code",
                    ));
                }
                if request.code_challenge.is_empty() {
                    (scope, "", "")
                } else {
                    request
                        .code_challenge_method
                        .parse::<pkce::ChallengeMethod>()?;
                    (
                        scope,
                        request.code_challenge.as_str(),
                        request.code_challenge_method.as_str(),
                    )
                }
            }
        };

        self.database
            .create_session(
                &NewSession {
                    me: &me,
                    response_type,
                    client_id: &client_id,
                    redirect_uri: &request.redirect_uri,
                    scope: &scope,
                    state: &request.state,
                    code_challenge: challenge,
                    code_challenge_method: method,
                },
                self.expiry.session,
            )
            .await?;
        info!(me = %me, client_id = %client_id, response_type = %response_type, "authorization session started");

        let skip = match login_id {
            Some(id) => self.recent_login(id).await?.is_some_and(|login| login.me == me),
            None => false,
        };

        Ok(Started::Session(Chooser {
            client_id: client.id,
            client_name: client.name,
            me,
            scopes,
            skip,
            websocket: self.websocket_url(),
        }))
    }

    /// Hand the session over to a strategy, returning the provider URL to visit
    ///
    /// # Errors
    ///
    /// Rejected when there is no live session or the chosen method is not in the
    /// profile's live discovery result, untrusted when the redirect URI differs,
    /// invalid request when no strategy has the given name
    pub async fn choose_provider(&self, choice: &ProviderChoice) -> AppResult<String> {
        let me = parse_profile_url(&choice.me).unwrap_or_else(|| choice.me.clone());

        let session = self
            .database
            .get_session(&me)
            .await?
            .ok_or_else(|| AppError::rejected("you need to start at the start"))?;
        if session.expired() {
            return Err(AppError::rejected("auth session expired"));
        }
        if session.redirect_uri != choice.redirect_uri {
            return Err(AppError::untrusted("redirect_uri is untrustworthy"));
        }

        let strategy = self.strategies.find(&choice.provider).ok_or_else(|| {
            AppError::invalid_request(r#"No rel="me" links on your profile match a known provider"#)
        })?;

        // Only a method discovery verified for this profile may vouch for it
        let verified = self
            .database
            .get_profile(&session.me)
            .await?
            .filter(|profile| !profile.expired())
            .is_some_and(|profile| {
                profile.methods.iter().any(|method| {
                    method.provider == strategy.name() && method.profile == choice.profile
                })
            });
        if !verified {
            warn!(me = %session.me, provider = %strategy.name(), profile = %choice.profile, "chosen method was not discovered on profile");
            return Err(AppError::rejected(
                "that method has not been verified for your profile",
            ));
        }

        let redirect = strategy.redirect(&session.me, &choice.profile)?;
        self.database
            .set_session_provider(&session.me, strategy.name(), &choice.profile)
            .await?;
        debug!(me = %session.me, provider = %strategy.name(), "provider chosen");

        Ok(redirect)
    }

    /// Complete a provider exchange and issue a code for the verified profile
    ///
    /// # Errors
    ///
    /// Unauthorized when the provider vouches for someone else, rejected or
    /// expired when the profile has no live session
    pub async fn handle_callback(&self, provider: &str, form: &CallbackForm) -> AppResult<Verified> {
        let strategy = self
            .strategies
            .find(provider)
            .ok_or_else(|| AppError::not_found(format!("provider {provider}")))?;

        let me = strategy.callback(form).await.map_err(|e| {
            warn!(provider = %provider, error = %e, "provider callback failed");
            AppError::from(e)
        })?;

        let redirect = self.issue_code(&me).await?;
        let login_id = random_string(LOGIN_ID_LEN)?;
        let login = self
            .database
            .save_login(&login_id, &me, self.expiry.login)
            .await?;

        Ok(Verified { redirect, login })
    }

    /// Issue a code using a recent login instead of a provider round trip
    ///
    /// # Errors
    ///
    /// Unauthorized without a live login marker, rejected or expired without a live session
    pub async fn continue_login(&self, login_id: Option<&str>) -> AppResult<String> {
        let login = match login_id {
            Some(id) => self.recent_login(id).await?,
            None => None,
        }
        .ok_or_else(|| AppError::unauthorized("no recent login to continue with"))?;

        self.issue_code(&login.me).await
    }

    async fn issue_code(&self, me: &str) -> AppResult<String> {
        let session = self
            .database
            .get_session(me)
            .await?
            .ok_or_else(|| AppError::rejected("no authorization session for this profile"))?;
        if session.expired() {
            return Err(AppError::expired("auth session expired"));
        }

        // Trust decisions are cached, so this is normally a single lookup
        self.clients
            .resolve(&session.client_id, &session.redirect_uri)
            .await?;

        let code = random_string(CODE_LEN)?;
        self.database
            .create_code(&session.me, &code, self.expiry.code)
            .await?;

        let mut redirect = Url::parse(&session.redirect_uri)
            .map_err(|e| AppError::internal(format!("stored redirect_uri is invalid: {e}")))?;
        redirect
            .query_pairs_mut()
            .append_pair("code", &code)
            .append_pair("state", &session.state);

        info!(me = %session.me, client_id = %session.client_id, "code issued");
        Ok(redirect.into())
    }

    /// Redeem an identity-only code, returning the profile it vouches for
    ///
    /// # Errors
    ///
    /// Not found for unknown, already used or token-bound codes, expired after
    /// the code window, rejected when the client or redirect URI differ
    pub async fn verify_code(&self, request: &CodeVerification) -> AppResult<String> {
        if request.code.is_empty() {
            return Err(AppError::invalid_request("Missing 'code' parameter"));
        }

        let code = self.redeem(&request.code, ResponseType::Id).await?;
        check_client(&code, &request.client_id, &request.redirect_uri)?;

        info!(me = %code.me, client_id = %code.client_id, "identity code verified");
        Ok(code.me)
    }

    /// Exchange an authorization code for an access token
    ///
    /// # Errors
    ///
    /// Invalid request for an unknown grant type or challenge method, not found
    /// for unknown or used codes, expired after the code window, rejected for
    /// any parameter or PKCE mismatch and for scopeless codes
    pub async fn exchange_code(&self, request: &TokenRequest) -> AppResult<TokenResponse> {
        if request.grant_type != "authorization_code" {
            return Err(AppError::invalid_request("The grant_type is not understood"));
        }
        if request.code.is_empty() {
            return Err(AppError::new(ErrorCode::NotFound, INVALID_CODE));
        }

        let code = self.redeem(&request.code, ResponseType::Code).await?;
        check_client(&code, &request.client_id, &request.redirect_uri)?;

        if let Some(me) = request.me.as_deref().filter(|me| !me.is_empty()) {
            if parse_profile_url(me).as_deref() != Some(code.me.as_str()) {
                return Err(AppError::rejected("The 'me' parameter did not match"));
            }
        }

        let verifier = request.code_verifier.as_deref().filter(|v| !v.is_empty());
        if code.code_challenge.is_empty() {
            if verifier.is_some() {
                return Err(AppError::rejected(
                    "Provided 'code_verifier' but initial request did not contain a challenge",
                ));
            }
        } else if !pkce::verify(
            &code.code_challenge_method,
            &code.code_challenge,
            verifier.unwrap_or_default(),
        )? {
            warn!(client_id = %code.client_id, "code_verifier does not match challenge");
            return Err(AppError::rejected(
                "Provided 'code_verifier' does not match initial challenge",
            ));
        }

        if code.scope.is_empty() {
            return Err(AppError::rejected(
                "Scopeless code must be exchanged using authorization endpoint",
            ));
        }

        let issued = token::mint(&code.me, &code.client_id, &code.scope)?;
        self.database.create_token(&issued.record).await?;
        info!(me = %code.me, client_id = %code.client_id, scope = %code.scope, "access token issued");

        Ok(TokenResponse {
            access_token: issued.access_token,
            token_type: "Bearer".to_owned(),
            scope: issued.record.scope,
            me: issued.record.me,
        })
    }

    async fn redeem(&self, value: &str, expected: ResponseType) -> AppResult<Code> {
        let code = self
            .database
            .take_code(value, expected)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::NotFound, INVALID_CODE))?;

        if code.expired() {
            return Err(AppError::expired(EXPIRED_CODE));
        }
        Ok(code)
    }

    /// Resolve a bearer token presented as a full `Authorization` header value
    ///
    /// # Errors
    ///
    /// Unauthorized unless the header carries a live token whose secret half matches
    pub async fn verify_token(&self, authorization: Option<&str>) -> AppResult<Token> {
        let unauthorized = || AppError::unauthorized("invalid bearer token");

        let mut parts = authorization.unwrap_or_default().split_whitespace();
        let bearer = match (parts.next(), parts.next(), parts.next()) {
            (Some("Bearer"), Some(bearer), None) => bearer,
            _ => return Err(unauthorized()),
        };

        self.lookup(bearer).await?.ok_or_else(unauthorized)
    }

    async fn lookup(&self, bearer: &str) -> AppResult<Option<Token>> {
        let Some((short, long)) = token::split(bearer) else {
            return Ok(None);
        };

        Ok(self
            .database
            .get_token(short)
            .await?
            .filter(|record| token::matches(record, long)))
    }

    /// Revoke the token with the given bearer string; unknown tokens are ignored
    ///
    /// # Errors
    ///
    /// Returns a storage error if the lookup or delete fails
    pub async fn revoke_token(&self, bearer: &str) -> AppResult<bool> {
        let Some(record) = self.lookup(bearer).await? else {
            debug!("revocation requested for unknown token");
            return Ok(false);
        };

        let revoked = self.database.revoke_token(&record.short_token).await?;
        info!(me = %record.me, client_id = %record.client_id, "access token revoked");
        Ok(revoked)
    }

    /// Revoke every token a client holds for a profile
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete fails
    pub async fn revoke_client(&self, me: &str, client_id: &str) -> AppResult<u64> {
        let revoked = self.database.revoke_client_tokens(me, client_id).await?;
        info!(me = %me, client_id = %client_id, revoked, "client tokens revoked");
        Ok(revoked)
    }

    /// Tokens issued for a profile
    ///
    /// # Errors
    ///
    /// Returns a storage error if the query fails
    pub async fn list_tokens(&self, me: &str) -> AppResult<Vec<Token>> {
        Ok(self.database.list_tokens(me).await?)
    }

    /// Delete everything stored for a profile
    ///
    /// # Errors
    ///
    /// Returns a storage error if the transaction fails
    pub async fn forget(&self, me: &str) -> AppResult<()> {
        Ok(self.database.forget(me).await?)
    }

    async fn recent_login(&self, id: &str) -> AppResult<Option<Login>> {
        Ok(self
            .database
            .get_login(id)
            .await?
            .filter(|login| !login.expired()))
    }

    fn websocket_url(&self) -> String {
        let mut url = self.base_url.clone();
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        // Every special scheme can switch to its websocket counterpart
        let _ = url.set_scheme(scheme);
        url.set_path("/ws");
        url.set_query(None);
        url.into()
    }
}

fn check_client(code: &Code, client_id: &str, redirect_uri: &str) -> AppResult<()> {
    if parse_client_id(client_id).as_deref() != Some(code.client_id.as_str()) {
        return Err(AppError::rejected("The 'client_id' parameter did not match"));
    }
    if code.redirect_uri != redirect_uri {
        return Err(AppError::rejected("The 'redirect_uri' parameter did not match"));
    }
    Ok(())
}
