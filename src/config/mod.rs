// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Re-exports the environment-driven ServerConfig and its sections
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

/// Environment and server configuration
pub mod environment;

pub use environment::{
    Environment, ExpiryConfig, GitHubConfig, HttpClientConfig, ServerConfig, StrategyConfig,
};
