//! Error types for the DigitalOcean gateway.

use thiserror::Error;

/// Errors raised by the DigitalOcean gateway.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DigitalOceanError {
    /// Raised when the gateway is constructed without a usable token.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request spec fails validation before it is sent.
    #[error("invalid droplet request: {0}")]
    Validation(String),
    /// Raised when the API answers with a non-success status.
    #[error("DigitalOcean API error {status} ({id}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error identifier from the response body, or `unknown`.
        id: String,
        /// Human readable message from the response body, or the raw body.
        message: String,
    },
    /// Raised when the request never produced a response.
    #[error("DigitalOcean request failed: {0}")]
    Http(String),
    /// Raised when a success response body cannot be decoded.
    #[error("failed to decode DigitalOcean response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for DigitalOceanError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value.to_string())
    }
}

impl From<crate::gateway::SpecError> for DigitalOceanError {
    fn from(value: crate::gateway::SpecError) -> Self {
        Self::Validation(value.to_string())
    }
}
