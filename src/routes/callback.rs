// ABOUTME: Provider callback routes, one per registered strategy
// ABOUTME: Completes the provider exchange, redirects with the code and sets the login cookie
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use super::{login_cookie, AuthContext};
use crate::errors::AppResult;
use crate::strategy::CallbackForm;
use axum::{
    extract::{Query, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Form, Router,
};

/// Callback routes implementation
pub struct CallbackRoutes;

impl CallbackRoutes {
    /// Create `/callback/{name}` for every registered strategy
    ///
    /// Providers answer with a GET redirect (OAuth) or a form POST (PGP), so
    /// both methods are accepted.
    pub fn routes(context: AuthContext) -> Router {
        let mut router = Router::new();

        for provider in context.server.strategies().names() {
            router = router.route(
                &format!("/callback/{provider}"),
                get(move |state: State<AuthContext>, Query(form): Query<CallbackForm>| {
                    Self::handle_callback(state, provider, form)
                })
                .post(
                    move |state: State<AuthContext>, Form(form): Form<CallbackForm>| {
                        Self::handle_callback(state, provider, form)
                    },
                ),
            );
        }

        router.with_state(context)
    }

    async fn handle_callback(
        State(context): State<AuthContext>,
        provider: &'static str,
        form: CallbackForm,
    ) -> AppResult<Response> {
        let verified = context.server.handle_callback(provider, &form).await?;

        Ok((
            StatusCode::FOUND,
            [
                (LOCATION, verified.redirect),
                (SET_COOKIE, login_cookie(&verified.login, context.cookies)),
            ],
        )
            .into_response())
    }
}
