//! Crate-level error taxonomy.
//!
//! Protocol- and patch-level failures (malformed lines, version desync,
//! delta decode failure) are handled entirely inside the engine and never
//! surface as a Rust `Err` — they manifest to the client as a raw-reset
//! fragment per the propagation policy. `SyncError` covers only what
//! legitimately escapes to the HTTP layer: configuration failure at
//! startup and transport-level gating.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Errors that can escape the sync engine to the HTTP boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// The request's client address did not match `CONNECTION_ORIGIN`.
    #[error("connection refused from disallowed origin")]
    OriginRejected,

    /// `REQUIRED_COOKIE` is configured but missing or malformed.
    #[error("required cookie not found")]
    CookieMissing,

    /// The `q` form field was absent from the request body.
    #[error("'q' parameter not found in request body")]
    MissingPayload,
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match self {
            SyncError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SyncError::OriginRejected => StatusCode::FORBIDDEN,
            SyncError::CookieMissing => StatusCode::GONE,
            SyncError::MissingPayload => StatusCode::BAD_REQUEST,
        };
        (status, format!("{self}\n")).into_response()
    }
}
