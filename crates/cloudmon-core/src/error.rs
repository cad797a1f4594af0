//! Error types for cloudmon.
//!
//! This module defines all error types that can occur while authenticating
//! against the identity service and talking to the monitoring API.

use serde::Deserialize;
use std::fmt;

/// Maximum number of body characters kept on errors for diagnostics.
pub const BODY_EXCERPT_LEN: usize = 512;

/// The main error type for cloudmon operations.
#[derive(Debug, thiserror::Error)]
pub enum CloudmonError {
    /// The auth endpoint rejected the credentials or answered with a status
    /// other than 200.
    ///
    /// `status` is `None` for a plain 401 rejection and carries the HTTP
    /// status code when the failure was an unexpected status. `body` is an
    /// excerpt of whatever the auth endpoint answered.
    #[error("Invalid credentials: {reason}")]
    InvalidCredentials {
        reason: String,
        status: Option<u16>,
        body: String,
    },

    /// A response body failed to parse under its declared content type, or a
    /// required header/field was missing.
    #[error("Malformed response: {message}")]
    MalformedResponse { message: String, body: String },

    /// A status outside the accepted set of the operation.
    #[error("Unexpected status code: {status}")]
    UnexpectedStatus { status: u16, body: String },

    /// A structured 400 response from the API.
    #[error("Validation error: {0}")]
    Validation(ValidationError),

    /// The service catalog has no usable endpoint for the named service.
    #[error("No endpoint available for service '{0}'")]
    EndpointNotFound(String),

    /// A URL could not be parsed or decomposed.
    #[error("Invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Transport-level failure reported by a non-reqwest transport.
    #[error("Transport error: {0}")]
    Transport(String),

    /// HTTP client errors (wraps reqwest errors)
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// JSON serialization errors (wraps serde_json errors)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid configuration value
    #[error("Invalid configuration for '{field}': {message}")]
    InvalidConfig { field: String, message: String },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CloudmonError {
    /// Create a config error with a message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create an invalid config error
    pub fn invalid_config<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Credentials rejected outright (HTTP 401).
    pub fn rejected_credentials(body: &str) -> Self {
        Self::InvalidCredentials {
            reason: "credentials rejected by auth endpoint".to_string(),
            status: None,
            body: excerpt(body),
        }
    }

    /// Auth endpoint answered with a status that is neither 200 nor 401.
    pub fn unexpected_auth_status(status: u16, body: &str) -> Self {
        Self::InvalidCredentials {
            reason: format!("unexpected status {} from auth endpoint", status),
            status: Some(status),
            body: excerpt(body),
        }
    }

    /// Create a malformed response error, keeping an excerpt of the body.
    pub fn malformed<S: Into<String>>(message: S, body: &str) -> Self {
        Self::MalformedResponse {
            message: message.into(),
            body: excerpt(body),
        }
    }

    /// Create an unexpected status error, keeping an excerpt of the body.
    pub fn unexpected_status(status: u16, body: &str) -> Self {
        Self::UnexpectedStatus {
            status,
            body: excerpt(body),
        }
    }

    /// Create an invalid URL error
    pub fn invalid_url<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: message.into(),
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::InvalidCredentials { status, .. } => *status,
            Self::UnexpectedStatus { status, .. } => Some(*status),
            Self::Validation(_) => Some(400),
            Self::HttpClient(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Raw body excerpt carried by the error, if any.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::MalformedResponse { body, .. }
            | Self::UnexpectedStatus { body, .. }
            | Self::InvalidCredentials { body, .. } => Some(body.as_str()),
            _ => None,
        }
    }

    /// Check if this error is an authentication failure.
    ///
    /// Rejections and unexpected auth statuses are the same kind, so callers
    /// can handle both uniformly.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::InvalidCredentials { .. })
    }
}

/// Structured body of a 400 response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ValidationError {
    /// HTTP-ish code echoed by the API (usually 400)
    #[serde(default)]
    pub code: Option<u16>,

    /// Error type, e.g. `badRequest` or `validationError`
    #[serde(rename = "type", default)]
    pub kind: Option<String>,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Field-level details (a string or a structured object)
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ValidationError {
    /// Try to interpret a 400 body as a structured validation error.
    ///
    /// Returns `None` when the body is not a JSON object with at least a
    /// `message` or `type` key.
    pub fn from_body(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let obj = value.as_object()?;
        if !obj.contains_key("message") && !obj.contains_key("type") {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "{}: {}", kind, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        match &self.details {
            Some(serde_json::Value::String(details)) => write!(f, " ({})", details)?,
            Some(serde_json::Value::Null) | None => {}
            Some(details) => write!(f, " ({})", details)?,
        }
        Ok(())
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_LEN).collect()
}

/// Result type alias for cloudmon operations
pub type Result<T> = std::result::Result<T, CloudmonError>;
