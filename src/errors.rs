// ABOUTME: Unified error taxonomy for the authorization server with HTTP status mapping
// ABOUTME: Renders every failure as an OAuth-style {error, error_description} JSON body
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 relme-auth contributors

//! # Unified Error Handling
//!
//! Every component that can fail a request (session handling, code exchange,
//! client trust, token verification) reports an [`AppError`]. The error code
//! decides the HTTP status and the OAuth error kind; the message becomes the
//! `error_description` unless the failure is internal, in which case it is
//! logged and replaced by a generic string.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::error;

/// Standard error codes used throughout the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed or missing parameters, unknown grant type, unknown challenge method
    #[serde(rename = "INVALID_REQUEST")]
    InvalidRequest,
    /// Provider reported an identity mismatch, or a bearer token is missing or bad
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    /// Unknown code, session or token
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    /// Session or code outlived its window
    #[serde(rename = "EXPIRED")]
    Expired,
    /// Client redirect not whitelisted
    #[serde(rename = "UNTRUSTED")]
    Untrusted,
    /// Session state does not allow the requested transition
    #[serde(rename = "REJECTED")]
    Rejected,
    /// Unexpected failure inside the server
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    /// Storage failure
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::InvalidRequest | Self::Expired | Self::Untrusted | Self::Rejected => 400,
            Self::Unauthorized => 401,
            Self::NotFound => 404,
            Self::InternalError | Self::DatabaseError => 500,
        }
    }

    /// OAuth-style error kind reported in the `error` field
    #[must_use]
    pub const fn oauth_kind(self) -> &'static str {
        match self {
            Self::InvalidRequest | Self::Rejected => "invalid_request",
            Self::Unauthorized => "unauthorized",
            Self::NotFound | Self::Expired => "invalid_grant",
            Self::Untrusted => "untrusted_client",
            Self::InternalError | Self::DatabaseError => "server_error",
        }
    }

    /// Get a user-friendly description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidRequest => "The request was malformed",
            Self::Unauthorized => "The chosen provider says you are unauthorized",
            Self::NotFound => "The requested resource was not found",
            Self::Expired => "The authorization window has expired",
            Self::Untrusted => "The redirect_uri is not trusted for this client",
            Self::Rejected => "The authorization session does not allow this step",
            Self::InternalError => "Something went wrong",
            Self::DatabaseError => "Something went wrong",
        }
    }

    /// Whether the detailed message must stay out of responses
    #[must_use]
    pub const fn is_internal(self) -> bool {
        matches!(self, Self::InternalError | Self::DatabaseError)
    }
}

/// Unified error type for the server
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Malformed request
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Identity mismatch or bad bearer token
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, format!("{} not found", resource.into()))
    }

    /// Window elapsed
    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Expired, message)
    }

    /// Client trust failure
    pub fn untrusted(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Untrusted, message)
    }

    /// Invalid state transition
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Rejected, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// OAuth error kind
    pub error: String,
    /// Human readable explanation
    pub error_description: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        let error_description = if error.code.is_internal() {
            error.code.description().to_owned()
        } else {
            error.message.clone()
        };

        Self {
            error: error.code.oauth_kind().to_owned(),
            error_description,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.code.is_internal() {
            error!(code = ?self.code, message = %self.message, source = ?self.source, "request failed");
        }

        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

/// Conversion from `anyhow::Error` to `AppError`
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(ErrorCode::InternalError, format!("{error:#}"))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::database(error.to_string()).with_source(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::InvalidRequest.http_status(), 400);
        assert_eq!(ErrorCode::Untrusted.http_status(), 400);
        assert_eq!(ErrorCode::Unauthorized.http_status(), 401);
        assert_eq!(ErrorCode::NotFound.http_status(), 404);
        assert_eq!(ErrorCode::DatabaseError.http_status(), 500);
    }

    #[test]
    fn test_internal_message_not_leaked() {
        let error = AppError::database("disk I/O error at /var/lib/relme.db");
        let body = ErrorResponse::from(&error);

        assert_eq!(body.error, "server_error");
        assert!(!body.error_description.contains("/var/lib"));
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AppError::invalid_request("The grant_type is not understood");
        let json = serde_json::to_value(ErrorResponse::from(&error)).unwrap();

        assert_eq!(json["error"], "invalid_request");
        assert_eq!(json["error_description"], "The grant_type is not understood");
    }
}
