// ABOUTME: PGP challenge page asking the user to clearsign a challenge with their key
// ABOUTME: The signed text is posted back to the PGP callback together with the state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

use axum::{extract::Query, response::Html, routing::get, Router};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Deserialize;

/// Query of `/pgp/authorize`
#[derive(Debug, Deserialize)]
pub struct ChallengeQuery {
    /// This server, acting as the client of the challenge
    #[serde(default)]
    pub client_id: String,
    /// Correlation key of the pending challenge
    #[serde(default)]
    pub state: String,
    /// Text to clearsign
    #[serde(default)]
    pub challenge: String,
}

/// PGP routes implementation
pub struct PgpRoutes;

impl PgpRoutes {
    /// Create `/pgp/authorize`
    pub fn routes() -> Router {
        Router::new().route("/pgp/authorize", get(Self::handle_authorize))
    }

    async fn handle_authorize(Query(query): Query<ChallengeQuery>) -> Html<String> {
        Html(format!(
            r#"<!DOCTYPE html>
<html>
<head><title>Sign in with PGP</title></head>
<body>
  <p>Clearsign the challenge below for {client} with the key linked from your profile:</p>
  <pre>{challenge}</pre>
  <p><code>echo -n "{challenge}" | gpg --clearsign</code></p>
  <form action="/callback/pgp" method="post">
    <input type="hidden" name="state" value="{state}">
    <textarea name="signed" rows="12" cols="72"></textarea>
    <button type="submit">Sign in</button>
  </form>
</body>
</html>"#,
            client = encode_text(&query.client_id),
            challenge = encode_text(&query.challenge),
            state = encode_double_quoted_attribute(&query.state),
        ))
    }
}
