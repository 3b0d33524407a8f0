// ABOUTME: Route module organization for the relme-auth HTTP surface
// ABOUTME: Shared request context and the login cookie helpers used by the authorization routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! Route module for the authorization server
//!
//! Each domain module owns its route definitions and thin handlers that
//! delegate to [`AuthorizationServer`] or the discovery manager.

/// Authorization endpoint, provider kickoff and continue-with-login
pub mod authorization;
/// Provider callbacks, one route per registered strategy
pub mod callback;
/// Health check route
pub mod health;
/// PGP challenge page
pub mod pgp;
/// Token exchange, verification and revocation
pub mod token;
/// WebSocket discovery endpoint
pub mod websocket;

pub use authorization::AuthorizationRoutes;
pub use callback::CallbackRoutes;
pub use health::HealthRoutes;
pub use pgp::PgpRoutes;
pub use token::TokenRoutes;
pub use websocket::WebSocketRoutes;

use crate::authorization::AuthorizationServer;
use crate::constants::http_names::LOGIN_COOKIE;
use crate::models::Login;
use axum::http::{header::COOKIE, HeaderMap};
use std::sync::Arc;

/// How the login cookie is written
#[derive(Debug, Clone, Copy)]
pub struct CookieSettings {
    /// Add the `Secure` attribute
    pub secure: bool,
    /// Cookie lifetime in seconds
    pub max_age: i64,
}

/// State shared by the authorization and callback routes
#[derive(Clone)]
pub struct AuthContext {
    /// Authorization engine
    pub server: Arc<AuthorizationServer>,
    /// Login cookie settings
    pub cookies: CookieSettings,
}

/// `Set-Cookie` value remembering a login
#[must_use]
pub fn login_cookie(login: &Login, settings: CookieSettings) -> String {
    let secure = if settings.secure { "; Secure" } else { "" };
    format!(
        "{LOGIN_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}{secure}",
        login.id, settings.max_age
    )
}

/// Login marker id carried by the request, if any
#[must_use]
pub fn login_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .find_map(|cookie| {
            cookie
                .trim()
                .strip_prefix(LOGIN_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
        })
}
