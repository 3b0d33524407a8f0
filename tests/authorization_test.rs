// ABOUTME: Integration tests for the authorization engine: sessions, codes, PKCE and bearer tokens
// ABOUTME: Drives full logins through the development strategy over an in-memory trust store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use common::{
    auth_request, cache_methods, query_param, CLIENT_ID, GOOD_KEY, ME, REDIRECT_URI,
    SOCIAL_PROFILE,
};
use relme_auth::{
    authorization::{
        pkce::ChallengeMethod, AuthorizationRequest, AuthorizationServer, CodeVerification,
        ProviderChoice, Started, TokenRequest,
    },
    errors::ErrorCode,
    models::{Method, Profile},
    strategy::CallbackForm,
};
use std::sync::Arc;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const VERIFIER: &str = "dBjftJeZ4CVP-mJ92ZoO2ojebdjBF0Hu-EvtFuh9vCs";

async fn server() -> Arc<AuthorizationServer> {
    common::create_discovered_resources()
        .await
        .unwrap()
        .authorization
        .clone()
}

async fn server_with_code_ttl(ttl: Duration) -> Arc<AuthorizationServer> {
    let mut config = common::test_config();
    config.expiry.code = ttl;
    let resources = common::create_test_resources_with(config).await.unwrap();
    cache_methods(&resources.database, ME, &[("true", SOCIAL_PROFILE)])
        .await
        .unwrap();
    resources.authorization.clone()
}

/// Run the whole browser leg with the "true" strategy and return the client redirect
async fn authenticate(server: &AuthorizationServer, request: &AuthorizationRequest) -> String {
    let started = server.start_session(request, None).await.unwrap();
    assert!(matches!(started, Started::Session(_)));

    let provider_url = server
        .choose_provider(&ProviderChoice {
            me: request.me.clone(),
            provider: "true".into(),
            profile: SOCIAL_PROFILE.into(),
            redirect_uri: request.redirect_uri.clone(),
        })
        .await
        .unwrap();
    let expected = query_param(&provider_url, "expected").unwrap();

    let form = CallbackForm::from([("expected".to_owned(), expected)]);
    server.handle_callback("true", &form).await.unwrap().redirect
}

fn token_request(code: &str) -> TokenRequest {
    TokenRequest {
        grant_type: "authorization_code".into(),
        code: code.into(),
        client_id: CLIENT_ID.into(),
        redirect_uri: REDIRECT_URI.into(),
        ..TokenRequest::default()
    }
}

fn verification(code: &str) -> CodeVerification {
    CodeVerification {
        code: code.into(),
        client_id: CLIENT_ID.into(),
        redirect_uri: REDIRECT_URI.into(),
    }
}

#[tokio::test]
async fn test_exchange_before_any_code_is_not_found() {
    let server = server().await;

    let err = server.exchange_code(&token_request("nope")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn test_identity_flow_redirects_with_code_and_state() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("id", "")).await;
    assert!(redirect.starts_with("https://app.example/cb?"));
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("rp-state"));

    let code = query_param(&redirect, "code").unwrap();
    assert_eq!(code.len(), 20);

    let me = server.verify_code(&verification(&code)).await.unwrap();
    assert_eq!(me, ME);
}

#[tokio::test]
async fn test_codes_are_single_use() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("id", "")).await;
    let code = query_param(&redirect, "code").unwrap();

    server.verify_code(&verification(&code)).await.unwrap();
    let err = server.verify_code(&verification(&code)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let server = server_with_code_ttl(Duration::seconds(-1)).await;

    let redirect = authenticate(&server, &auth_request("id", "")).await;
    let code = query_param(&redirect, "code").unwrap();

    let err = server.verify_code(&verification(&code)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Expired);
    assert_eq!(err.http_status(), 400);
}

#[tokio::test]
async fn test_token_flow_issues_bearer_token() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create  update")).await;
    let code = query_param(&redirect, "code").unwrap();

    let response = server.exchange_code(&token_request(&code)).await.unwrap();
    assert_eq!(response.token_type, "Bearer");
    assert_eq!(response.scope, "create update");
    assert_eq!(response.me, ME);
    assert!(response.access_token.starts_with("relmeauth_"));

    let header = format!("Bearer {}", response.access_token);
    let token = server.verify_token(Some(&header)).await.unwrap();
    assert_eq!(token.me, ME);
    assert_eq!(token.client_id, CLIENT_ID);
    assert_eq!(token.scope, "create update");
}

#[tokio::test]
async fn test_identity_code_cannot_be_exchanged_for_token() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("id", "")).await;
    let code = query_param(&redirect, "code").unwrap();

    let err = server.exchange_code(&token_request(&code)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    // The failed exchange leaves the code redeemable where it belongs
    let me = server.verify_code(&verification(&code)).await.unwrap();
    assert_eq!(me, ME);
}

#[tokio::test]
async fn test_token_code_cannot_be_verified_at_authorization_endpoint() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create")).await;
    let code = query_param(&redirect, "code").unwrap();

    let err = server.verify_code(&verification(&code)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);

    let response = server.exchange_code(&token_request(&code)).await.unwrap();
    assert_eq!(response.me, ME);
    assert_eq!(response.scope, "create");
}

#[tokio::test]
async fn test_pkce_s256_round_trip() {
    let server = server().await;

    let mut request = auth_request("code", "create");
    request.code_challenge = ChallengeMethod::S256.challenge(VERIFIER);
    request.code_challenge_method = "S256".into();

    let redirect = authenticate(&server, &request).await;
    let code = query_param(&redirect, "code").unwrap();

    let mut exchange = token_request(&code);
    exchange.code_verifier = Some(VERIFIER.into());
    assert!(server.exchange_code(&exchange).await.is_ok());
}

#[tokio::test]
async fn test_pkce_wrong_verifier_is_rejected() {
    let server = server().await;

    let mut request = auth_request("code", "create");
    request.code_challenge = "plain-challenge".into();
    request.code_challenge_method = "plain".into();

    let redirect = authenticate(&server, &request).await;
    let code = query_param(&redirect, "code").unwrap();

    let mut exchange = token_request(&code);
    exchange.code_verifier = Some("something-else".into());
    let err = server.exchange_code(&exchange).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Rejected);
    assert_eq!(
        err.message,
        "Provided 'code_verifier' does not match initial challenge"
    );
}

#[tokio::test]
async fn test_pkce_missing_verifier_is_rejected() {
    let server = server().await;

    let mut request = auth_request("code", "create");
    request.code_challenge = ChallengeMethod::S256.challenge(VERIFIER);
    request.code_challenge_method = "S256".into();

    let redirect = authenticate(&server, &request).await;
    let code = query_param(&redirect, "code").unwrap();

    let err = server.exchange_code(&token_request(&code)).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Rejected);
}

#[tokio::test]
async fn test_verifier_without_challenge_is_rejected() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create")).await;
    let code = query_param(&redirect, "code").unwrap();

    let mut exchange = token_request(&code);
    exchange.code_verifier = Some(VERIFIER.into());
    let err = server.exchange_code(&exchange).await.unwrap_err();
    assert_eq!(
        err.message,
        "Provided 'code_verifier' but initial request did not contain a challenge"
    );
}

#[tokio::test]
async fn test_unknown_challenge_method_fails_at_start() {
    let server = server().await;

    let mut request = auth_request("code", "create");
    request.code_challenge = "abc".into();
    request.code_challenge_method = "S512".into();

    let err = server.start_session(&request, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);
    assert_eq!(err.message, "code_challenge_method is not understood");
}

#[tokio::test]
async fn test_client_and_redirect_mismatches_are_rejected() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create")).await;
    let code = query_param(&redirect, "code").unwrap();
    let mut exchange = token_request(&code);
    exchange.client_id = "https://other.example/".into();
    let err = server.exchange_code(&exchange).await.unwrap_err();
    assert_eq!(err.message, "The 'client_id' parameter did not match");

    let redirect = authenticate(&server, &auth_request("id", "")).await;
    let code = query_param(&redirect, "code").unwrap();
    let mut check = verification(&code);
    check.redirect_uri = "https://app.example/elsewhere".into();
    let err = server.verify_code(&check).await.unwrap_err();
    assert_eq!(err.message, "The 'redirect_uri' parameter did not match");
}

#[tokio::test]
async fn test_me_parameter_must_match() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create")).await;
    let code = query_param(&redirect, "code").unwrap();

    let mut exchange = token_request(&code);
    exchange.me = Some("https://someone-else.example/".into());
    let err = server.exchange_code(&exchange).await.unwrap_err();
    assert_eq!(err.message, "The 'me' parameter did not match");
}

#[tokio::test]
async fn test_start_session_validation() {
    let server = server().await;

    let mut request = auth_request("code", "");
    let err = server.start_session(&request, None).await.unwrap_err();
    assert_eq!(err.message, "scope is required for response_type=code");

    request.response_type = "token".into();
    let err = server.start_session(&request, None).await.unwrap_err();
    assert_eq!(err.message, "Unknown response_type");

    let mut request = auth_request("id", "");
    request.state = String::new();
    let err = server.start_session(&request, None).await.unwrap_err();
    assert_eq!(err.message, "missing parameter: state");

    let mut request = auth_request("id", "");
    request.me = "https://me.example:8080/".into();
    let err = server.start_session(&request, None).await.unwrap_err();
    assert_eq!(err.message, "me is invalid");

    let mut request = auth_request("id", "");
    request.client_id = "ftp://app.example/".into();
    let err = server.start_session(&request, None).await.unwrap_err();
    assert_eq!(err.message, "client_id is invalid");
}

#[tokio::test]
async fn test_start_without_me_describes_client() {
    let server = server().await;

    let mut request = auth_request("id", "profile email");
    request.me = String::new();

    match server.start_session(&request, None).await.unwrap() {
        Started::NeedsProfile(client) => {
            assert_eq!(client.client_id, CLIENT_ID);
            assert_eq!(client.redirect_uri, REDIRECT_URI);
            assert_eq!(client.scopes, vec!["profile", "email"]);
        }
        Started::Session(_) => panic!("expected a client description"),
    }
}

#[tokio::test]
async fn test_chooser_points_at_websocket() {
    let server = server().await;

    match server
        .start_session(&auth_request("id", ""), None)
        .await
        .unwrap()
    {
        Started::Session(chooser) => {
            assert_eq!(chooser.me, ME);
            assert_eq!(chooser.websocket, "ws://auth.example/ws");
            assert!(!chooser.skip);
        }
        Started::NeedsProfile(_) => panic!("expected a chooser"),
    }
}

#[tokio::test]
async fn test_choose_provider_errors() {
    let server = server().await;

    let choice = ProviderChoice {
        me: ME.into(),
        provider: "true".into(),
        profile: SOCIAL_PROFILE.into(),
        redirect_uri: REDIRECT_URI.into(),
    };
    let err = server.choose_provider(&choice).await.unwrap_err();
    assert_eq!(err.message, "you need to start at the start");

    server
        .start_session(&auth_request("id", ""), None)
        .await
        .unwrap();

    let mut wrong_redirect = choice.clone();
    wrong_redirect.redirect_uri = "https://evil.example/cb".into();
    let err = server.choose_provider(&wrong_redirect).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Untrusted);

    let mut unknown = choice;
    unknown.provider = "myspace".into();
    let err = server.choose_provider(&unknown).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_callback_for_unregistered_provider_is_not_found() {
    let server = server().await;

    let err = server
        .handle_callback("github", &CallbackForm::new())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
}

#[tokio::test]
async fn test_recent_login_skips_and_continues() {
    let server = server().await;

    let started = server
        .start_session(&auth_request("id", ""), None)
        .await
        .unwrap();
    assert!(matches!(started, Started::Session(_)));
    server
        .choose_provider(&ProviderChoice {
            me: ME.into(),
            provider: "true".into(),
            profile: SOCIAL_PROFILE.into(),
            redirect_uri: REDIRECT_URI.into(),
        })
        .await
        .unwrap();
    let form = CallbackForm::from([("expected".to_owned(), ME.to_owned())]);
    let verified = server.handle_callback("true", &form).await.unwrap();
    let login_id = verified.login.id.clone();

    // A second request by the same browser may skip the provider
    let mut request = auth_request("id", "");
    request.state = "second".into();
    match server
        .start_session(&request, Some(&login_id))
        .await
        .unwrap()
    {
        Started::Session(chooser) => assert!(chooser.skip),
        Started::NeedsProfile(_) => panic!("expected a chooser"),
    }

    let redirect = server.continue_login(Some(&login_id)).await.unwrap();
    assert_eq!(query_param(&redirect, "state").as_deref(), Some("second"));

    let err = server.continue_login(None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Unauthorized);
    let err = server.continue_login(Some("unknown")).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Unauthorized);
}

#[tokio::test]
async fn test_tampered_and_malformed_bearer_tokens() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create")).await;
    let code = query_param(&redirect, "code").unwrap();
    let response = server.exchange_code(&token_request(&code)).await.unwrap();

    let mut tampered = response.access_token.clone();
    let last = tampered.pop().unwrap();
    tampered.push(if last == 'a' { 'b' } else { 'a' });
    let header = format!("Bearer {tampered}");
    assert!(server.verify_token(Some(&header)).await.is_err());

    assert!(server.verify_token(None).await.is_err());
    assert!(server
        .verify_token(Some(&response.access_token))
        .await
        .is_err());
    let header = format!("Bearer {} extra", response.access_token);
    assert!(server.verify_token(Some(&header)).await.is_err());
}

#[tokio::test]
async fn test_revocation() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create")).await;
    let code = query_param(&redirect, "code").unwrap();
    let first = server.exchange_code(&token_request(&code)).await.unwrap();

    let redirect = authenticate(&server, &auth_request("code", "update")).await;
    let code = query_param(&redirect, "code").unwrap();
    let second = server.exchange_code(&token_request(&code)).await.unwrap();

    assert_eq!(server.list_tokens(ME).await.unwrap().len(), 2);

    assert!(!server.revoke_token("relmeauth_garbage").await.unwrap());
    assert!(server.revoke_token(&first.access_token).await.unwrap());
    let header = format!("Bearer {}", first.access_token);
    assert!(server.verify_token(Some(&header)).await.is_err());

    assert_eq!(server.revoke_client(ME, CLIENT_ID).await.unwrap(), 1);
    let header = format!("Bearer {}", second.access_token);
    assert!(server.verify_token(Some(&header)).await.is_err());
    assert!(server.list_tokens(ME).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_forget_removes_tokens_and_sessions() {
    let server = server().await;

    let redirect = authenticate(&server, &auth_request("code", "create")).await;
    let code = query_param(&redirect, "code").unwrap();
    let response = server.exchange_code(&token_request(&code)).await.unwrap();

    server
        .start_session(&auth_request("id", ""), None)
        .await
        .unwrap();
    server.forget(ME).await.unwrap();

    let header = format!("Bearer {}", response.access_token);
    assert!(server.verify_token(Some(&header)).await.is_err());

    let err = server
        .choose_provider(&ProviderChoice {
            me: ME.into(),
            provider: "true".into(),
            profile: String::new(),
            redirect_uri: REDIRECT_URI.into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.message, "you need to start at the start");
}

/// Serve [`GOOD_KEY`] at `/key.asc` and `/other.asc`
async fn key_server() -> MockServer {
    let keys = MockServer::start().await;
    for key_path in ["/key.asc", "/other.asc"] {
        Mock::given(method("GET"))
            .and(path(key_path))
            .respond_with(ResponseTemplate::new(200).set_body_string(GOOD_KEY))
            .mount(&keys)
            .await;
    }
    keys
}

fn pgp_choice(key_url: &str) -> ProviderChoice {
    ProviderChoice {
        me: ME.into(),
        provider: "pgp".into(),
        profile: key_url.into(),
        redirect_uri: REDIRECT_URI.into(),
    }
}

#[tokio::test]
async fn test_key_not_published_by_profile_cannot_vouch_for_it() {
    let keys = key_server().await;
    let key_url = format!("{}/key.asc", keys.uri());
    let resources = common::create_test_resources().await.unwrap();
    cache_methods(&resources.database, ME, &[("pgp", key_url.as_str())])
        .await
        .unwrap();
    let server = resources.authorization.clone();

    server
        .start_session(&auth_request("id", ""), None)
        .await
        .unwrap();

    let err = server
        .choose_provider(&pgp_choice(&format!("{}/other.asc", keys.uri())))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Rejected);
    assert_eq!(
        err.message,
        "that method has not been verified for your profile"
    );

    // The published key still works
    let redirect = server.choose_provider(&pgp_choice(&key_url)).await.unwrap();
    let state = query_param(&redirect, "state").unwrap();
    let challenge = query_param(&redirect, "challenge").unwrap();
    let form = CallbackForm::from([
        ("state".to_owned(), state),
        ("signed".to_owned(), format!("{challenge}\n")),
    ]);
    let verified = server.handle_callback("pgp", &form).await.unwrap();
    assert!(query_param(&verified.redirect, "code").is_some());
}

#[tokio::test]
async fn test_choose_provider_requires_discovered_method() {
    let keys = key_server().await;
    let resources = common::create_test_resources().await.unwrap();
    let server = resources.authorization.clone();

    server
        .start_session(&auth_request("id", ""), None)
        .await
        .unwrap();

    // Nothing discovered yet
    let err = server
        .choose_provider(&pgp_choice(&format!("{}/key.asc", keys.uri())))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Rejected);

    // A link verified for one strategy does not carry over to another
    cache_methods(&resources.database, ME, &[("true", SOCIAL_PROFILE)])
        .await
        .unwrap();
    let err = server
        .choose_provider(&pgp_choice(SOCIAL_PROFILE))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Rejected);

    let mut other_link = pgp_choice("https://social.example/someone-else");
    other_link.provider = "true".into();
    let err = server.choose_provider(&other_link).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::Rejected);
}

#[tokio::test]
async fn test_expired_discovery_cannot_vouch_for_profile() {
    let resources = common::create_test_resources().await.unwrap();
    let now = Utc::now();
    resources
        .database
        .cache_profile(&Profile {
            me: ME.into(),
            updated_at: now - Duration::days(8),
            expires_at: now - Duration::days(1),
            methods: vec![Method {
                provider: "true".into(),
                profile: SOCIAL_PROFILE.into(),
            }],
        })
        .await
        .unwrap();
    let server = resources.authorization.clone();

    server
        .start_session(&auth_request("id", ""), None)
        .await
        .unwrap();
    let err = server
        .choose_provider(&ProviderChoice {
            me: ME.into(),
            provider: "true".into(),
            profile: SOCIAL_PROFILE.into(),
            redirect_uri: REDIRECT_URI.into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Rejected);
}
