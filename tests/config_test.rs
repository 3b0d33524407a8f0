// ABOUTME: Tests for environment-driven server configuration
// ABOUTME: Runs serially because every case mutates process environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

use relme_auth::config::{Environment, ServerConfig};
use serial_test::serial;
use std::env;

const VARS: &[&str] = &[
    "BASE_URL",
    "HTTP_PORT",
    "HOST",
    "DATABASE_URL",
    "ENVIRONMENT",
    "GITHUB_CLIENT_ID",
    "GITHUB_CLIENT_SECRET",
    "ENABLE_PGP",
    "USE_TRUE_STRATEGY",
    "SECURE_COOKIES",
    "CODE_TTL_SECS",
    "MAX_REDIRECTS",
];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults() {
    clear_env();

    let config = ServerConfig::from_env().unwrap();
    assert_eq!(config.http_port, 8080);
    assert_eq!(config.host, "127.0.0.1");
    assert_eq!(config.base_url.as_str(), "http://localhost:8080/");
    assert_eq!(config.environment, Environment::Development);
    assert!(config.strategies.github.is_none());
    assert!(config.strategies.enable_pgp);
    assert!(!config.strategies.use_true);
    assert!(!config.secure_cookies);
    assert_eq!(config.expiry.code.num_seconds(), 60);
    assert_eq!(config.http_client.max_redirects, 10);
}

#[test]
#[serial]
fn test_overrides() {
    clear_env();
    env::set_var("BASE_URL", "https://auth.example.com");
    env::set_var("HTTP_PORT", "9000");
    env::set_var("ENVIRONMENT", "production");
    env::set_var("GITHUB_CLIENT_ID", "id");
    env::set_var("GITHUB_CLIENT_SECRET", "secret");
    env::set_var("ENABLE_PGP", "false");
    env::set_var("USE_TRUE_STRATEGY", "true");
    env::set_var("CODE_TTL_SECS", "30");
    env::set_var("MAX_REDIRECTS", "3");

    let config = ServerConfig::from_env().unwrap();
    clear_env();

    assert_eq!(config.http_port, 9000);
    assert!(config.environment.is_production());
    assert_eq!(config.strategies.github.unwrap().client_id, "id");
    assert!(!config.strategies.enable_pgp);
    assert!(config.strategies.use_true);
    // https base URLs default to secure cookies
    assert!(config.secure_cookies);
    assert_eq!(config.expiry.code.num_seconds(), 30);
    assert_eq!(config.http_client.max_redirects, 3);
}

#[test]
#[serial]
fn test_github_id_without_secret_is_rejected() {
    clear_env();
    env::set_var("GITHUB_CLIENT_ID", "id");

    let result = ServerConfig::from_env();
    clear_env();

    assert!(result.is_err());
}

#[test]
#[serial]
fn test_invalid_base_url_is_rejected() {
    clear_env();
    env::set_var("BASE_URL", "ftp://auth.example.com");

    let result = ServerConfig::from_env();
    clear_env();

    assert!(result.is_err());
}

#[test]
fn test_summary_names_strategies() {
    let config = ServerConfig::for_testing("http://auth.example").unwrap();
    let summary = config.summary();
    assert!(summary.contains("strategies=[pgp,true]"));
    assert!(summary.contains("code_ttl=60s"));
}
