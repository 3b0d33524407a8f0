// ABOUTME: Token endpoint routes: code exchange, revocation and bearer verification
// ABOUTME: POST exchanges or revokes depending on the action field, GET verifies the bearer header
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use crate::authorization::{AuthorizationServer, TokenInfo, TokenRequest, TokenResponse};
use crate::errors::AppResult;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Token routes implementation
pub struct TokenRoutes;

impl TokenRoutes {
    /// Create `/token`
    pub fn routes(server: Arc<AuthorizationServer>) -> Router {
        Router::new()
            .route("/token", get(Self::handle_verify).post(Self::handle_token))
            .with_state(server)
    }

    async fn handle_token(
        State(server): State<Arc<AuthorizationServer>>,
        Form(mut form): Form<HashMap<String, String>>,
    ) -> AppResult<Response> {
        if form.get("action").map(String::as_str) == Some("revoke") {
            if let Some(token) = form.get("token").filter(|t| !t.is_empty()) {
                server.revoke_token(token).await?;
            }
            return Ok(StatusCode::OK.into_response());
        }

        let request = TokenRequest {
            grant_type: form.remove("grant_type").unwrap_or_default(),
            code: form.remove("code").unwrap_or_default(),
            client_id: form.remove("client_id").unwrap_or_default(),
            redirect_uri: form.remove("redirect_uri").unwrap_or_default(),
            me: form.remove("me"),
            code_verifier: form.remove("code_verifier"),
        };
        let response: TokenResponse = server.exchange_code(&request).await?;

        Ok(Json(response).into_response())
    }

    async fn handle_verify(
        State(server): State<Arc<AuthorizationServer>>,
        headers: HeaderMap,
    ) -> AppResult<Json<TokenInfo>> {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        let token = server.verify_token(authorization).await?;

        Ok(Json(TokenInfo::from(token)))
    }
}
