// ABOUTME: Authorization endpoint routes: chooser, code verification, provider kickoff, continue
// ABOUTME: Thin axum handlers delegating to the authorization engine
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::{login_id, AuthContext};
use crate::authorization::{AuthorizationRequest, CodeVerification, ProviderChoice, Started};
use crate::errors::AppResult;
use axum::{
    extract::{Query, State},
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Form, Json, Router,
};
use serde_json::json;

/// Authorization routes implementation
pub struct AuthorizationRoutes;

impl AuthorizationRoutes {
    /// Create `/auth`, `/auth/start` and `/callback/continue`
    pub fn routes(context: AuthContext) -> Router {
        Router::new()
            .route(
                "/auth",
                get(Self::handle_choose).post(Self::handle_verify_code),
            )
            .route("/auth/start", get(Self::handle_start))
            .route("/callback/continue", get(Self::handle_continue))
            .with_state(context)
    }

    /// Start a session and describe the choices for the user
    async fn handle_choose(
        State(context): State<AuthContext>,
        headers: HeaderMap,
        Query(request): Query<AuthorizationRequest>,
    ) -> AppResult<Response> {
        let login = login_id(&headers);
        let started = context
            .server
            .start_session(&request, login.as_deref())
            .await?;

        Ok(match started {
            Started::NeedsProfile(client) => Json(client).into_response(),
            Started::Session(chooser) => Json(chooser).into_response(),
        })
    }

    /// Redeem an identity code
    async fn handle_verify_code(
        State(context): State<AuthContext>,
        Form(request): Form<CodeVerification>,
    ) -> AppResult<Json<serde_json::Value>> {
        let me = context.server.verify_code(&request).await?;
        Ok(Json(json!({ "me": me })))
    }

    /// Send the user to the chosen provider
    async fn handle_start(
        State(context): State<AuthContext>,
        Query(choice): Query<ProviderChoice>,
    ) -> AppResult<Response> {
        let redirect = context.server.choose_provider(&choice).await?;
        Ok(found(redirect))
    }

    /// Issue a code from a recent login
    async fn handle_continue(
        State(context): State<AuthContext>,
        headers: HeaderMap,
    ) -> AppResult<Response> {
        let login = login_id(&headers);
        let redirect = context.server.continue_login(login.as_deref()).await?;
        Ok(found(redirect))
    }
}

/// `302 Found` to `location`
pub(super) fn found(location: String) -> Response {
    (StatusCode::FOUND, [(LOCATION, location)]).into_response()
}
