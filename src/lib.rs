// ABOUTME: Main library entry point for the relme-auth authorization server
// ABOUTME: rel=me discovery, provider strategies, and an IndieAuth code and token flow with PKCE
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

#![deny(unsafe_code)]

//! # relme-auth
//!
//! A user proves ownership of a personal URL by signing in with a third-party
//! provider that the URL links to with `rel="me"`, and that links back. Once
//! verified, the server issues short-lived authorization codes and access
//! tokens to relying-party clients.
//!
//! ## Architecture
//!
//! - **Trust store** ([`database`]): sessions, codes, tokens, clients, profiles, logins
//! - **Client trust** ([`client_trust`]): which redirect URIs a client vouches for
//! - **Discovery** ([`discovery`]): rel=me verification streamed as ordered events
//! - **Strategies** ([`strategy`]): GitHub, PGP and a development strategy
//! - **Authorization** ([`authorization`]): the session, code and token state machine
//! - **Event streaming** ([`websocket`]): discovery over a websocket
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use relme_auth::config::environment::ServerConfig;
//! use relme_auth::server::{RelmeAuthServer, ServerResources};
//! use relme_auth::strategy::GpgVerifier;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let resources = ServerResources::new(config, Arc::new(GpgVerifier::default())).await?;
//!     RelmeAuthServer::new(Arc::new(resources)).run().await
//! }
//! ```

/// Session, code and token state machine with PKCE
pub mod authorization;

/// Client redirect trust resolution
pub mod client_trust;

/// Configuration management
pub mod config;

/// Application constants
pub mod constants;

/// SQLite trust store
pub mod database;

/// rel=me discovery and verification
pub mod discovery;

/// Unified error handling
pub mod errors;

/// Profile and client identifier normalization
pub mod identifier;

/// Structured logging setup
pub mod logging;

/// HTML and `Link` header parsing
pub mod microformats;

/// Stored entities
pub mod models;

/// HTTP routes
pub mod routes;

/// Router assembly and serve loop
pub mod server;

/// Identity provider strategies
pub mod strategy;

/// Shared helpers
pub mod utils;

/// WebSocket discovery connections
pub mod websocket;
