// SPDX-License-Identifier: AGPL-3.0-or-later

//! Authentication and identity-resolution errors.
//!
//! Everything except the "no credential presented" outcome (modelled as
//! `Ok(None)` at the call sites, not as an error) surfaces to the host
//! framework as a rejected request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Error type for token verification and identity resolution.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No credential was presented to an endpoint that requires one.
    #[error("no credentials were provided")]
    MissingCredentials,

    /// Token could not be parsed into header, payload, and signature.
    #[error("token is malformed")]
    MalformedToken,

    /// No configured key validated the token's signature.
    #[error("token signature is invalid")]
    SignatureInvalid,

    /// Token has expired.
    #[error("token has expired")]
    TokenExpired,

    /// Token audience does not match the expected audience.
    #[error("token audience is invalid")]
    InvalidAudience,

    /// A JWKS entry matched the token's key id but declared a different
    /// algorithm. Never downgraded to a static-key fallback.
    #[error("key set entry algorithm does not match token header")]
    AlgorithmMismatch,

    /// The JWKS document could not be fetched or parsed.
    #[error("failed to fetch key set: {0}")]
    KeySetUnavailable(String),

    /// Verified claims carry no usable subject identifier.
    #[error("token claims carry no subject identifier")]
    MissingSubject,

    /// The permission endpoint failed or returned a non-success status.
    #[error("authorization service unavailable: {0}")]
    AuthorizationUnavailable(String),

    /// The crate is misconfigured (for example, no verification keys).
    #[error("authentication misconfigured: {0}")]
    ConfigurationError(String),

    /// A service secret was presented but does not match.
    #[error("service token does not match")]
    Unauthorized,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::MalformedToken => "malformed_token",
            AuthError::SignatureInvalid => "invalid_signature",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidAudience => "invalid_audience",
            AuthError::AlgorithmMismatch => "algorithm_mismatch",
            AuthError::KeySetUnavailable(_) => "key_set_unavailable",
            AuthError::MissingSubject => "missing_subject",
            AuthError::AuthorizationUnavailable(_) => "authorization_unavailable",
            AuthError::ConfigurationError(_) => "configuration_error",
            AuthError::Unauthorized => "unauthorized",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::MalformedToken
            | AuthError::SignatureInvalid
            | AuthError::TokenExpired
            | AuthError::InvalidAudience
            | AuthError::AlgorithmMismatch
            | AuthError::MissingSubject
            | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::KeySetUnavailable(_)
            | AuthError::AuthorizationUnavailable(_)
            | AuthError::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
