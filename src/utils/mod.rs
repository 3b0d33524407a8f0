// ABOUTME: Utility modules for common functionality across the server
// ABOUTME: Contains HTTP client construction and secure random string generation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

/// HTTP client configuration and helpers
pub mod http_client;
/// Cryptographically secure random strings
pub mod random;
