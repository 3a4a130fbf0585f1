// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 The Parley Authors

//! Error types for Parley
//!
//! Transport failures live in [`ApiError`]; everything a caller can act on
//! (missing configuration, answering a prompt that is not pending, a second
//! send while one is streaming) is a top-level [`ParleyError`] variant.

use thiserror::Error;

/// Main error type for Parley operations
#[derive(Error, Debug)]
pub enum ParleyError {
    /// Transport errors (non-2xx, network failure, empty body)
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Missing endpoint or app identifier
    #[error("Configuration error: {0}")]
    Config(String),

    /// A payload that had to be understood could not be
    #[error("Decode error: {0}")]
    Decode(String),

    /// Answering a prompt or follow-up that is not currently active
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Another send is still streaming on this session
    #[error("A send is already in flight for this session")]
    SendInFlight,

    /// Key-value persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Speech collaborator errors
    #[error("Speech error: {0}")]
    Speech(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// API-specific error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from the service
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// Service returned a non-success status
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Success status but no body to stream
    #[error("Streaming response is empty")]
    EmptyBody,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

impl ParleyError {
    /// Whether this error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(self, ParleyError::Api(_) | ParleyError::Http(_))
    }

    /// Text suitable for showing in place of an answer.
    ///
    /// Server errors show the body the service returned, since that is what
    /// the user needs to see.
    pub fn display_text(&self) -> String {
        match self {
            ParleyError::Api(ApiError::ServerError { message, .. }) => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for Parley operations
pub type Result<T> = std::result::Result<T, ParleyError>;
