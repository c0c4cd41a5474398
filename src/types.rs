//! Shared error and result types

use hyper::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::origin::FetchError;

/// Crate-wide result alias
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Errors surfaced by the relay to its HTTP callers.
///
/// Every variant maps to a stable status code and a JSON body of the form
/// `{ "error": ..., "details": ... }`.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Required query parameter is absent or empty
    #[error("Missing parameter: {0}")]
    MissingParameter(&'static str),

    /// Query parameter is present but unusable (bad URL, unsupported scheme)
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// `source` does not name a registered source
    #[error("Unknown source: {0}")]
    SourceNotFound(String),

    /// Origin did not answer within the class timeout
    #[error("Origin timed out after {0} ms")]
    Timeout(u64),

    /// DNS failure, connection refused or similar
    #[error("Origin unreachable: {0}")]
    NetworkUnreachable(String),

    /// Origin answered with a status other than 2xx/304
    #[error("Origin returned HTTP {status}")]
    OriginHttpError { status: u16 },

    /// Transport broke after the connection was established
    #[error("Origin transfer failed: {0}")]
    Transfer(String),

    /// Payload rejected by the asset class policy
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// HTTP status for this error.
    ///
    /// Origin 4xx statuses pass through; origin 5xx are normalized to 500 so an
    /// upstream failure never looks like a client mistake.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::MissingParameter(_)
            | RelayError::InvalidParameter { .. }
            | RelayError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            RelayError::SourceNotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            RelayError::NetworkUnreachable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::OriginHttpError { status } if (400..500).contains(status) => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::OriginHttpError { status } if *status >= 500 => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            RelayError::OriginHttpError { .. } | RelayError::Transfer(_) => StatusCode::BAD_GATEWAY,
            RelayError::Internal(_) | RelayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, stable error label used as the `error` field
    pub fn label(&self) -> &'static str {
        match self {
            RelayError::MissingParameter(_) => "Missing parameter",
            RelayError::InvalidParameter { .. } => "Invalid parameter",
            RelayError::SourceNotFound(_) => "Source not found",
            RelayError::Timeout(_) => "Origin timeout",
            RelayError::NetworkUnreachable(_) => "Origin unreachable",
            RelayError::OriginHttpError { .. } => "Origin error",
            RelayError::Transfer(_) => "Origin transfer failed",
            RelayError::ValidationFailed(_) => "Validation failed",
            RelayError::Internal(_) | RelayError::Io(_) => "Internal server error",
        }
    }

    /// Whether a client should retry the request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Timeout(_) | RelayError::NetworkUnreachable(_) | RelayError::Transfer(_)
        )
    }

    /// JSON body for this error
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error: self.label().to_string(),
            details: Some(self.to_string()),
        }
    }
}

impl From<FetchError> for RelayError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::InvalidUrl(reason) => RelayError::InvalidParameter { name: "url", reason },
            FetchError::Timeout(ms) => RelayError::Timeout(ms),
            FetchError::Unreachable(msg) => RelayError::NetworkUnreachable(msg),
            FetchError::Status(status) => RelayError::OriginHttpError { status },
            FetchError::TooLarge { limit, actual } => RelayError::ValidationFailed(format!(
                "payload of {actual} bytes exceeds limit of {limit} bytes"
            )),
            FetchError::Transport(msg) => RelayError::Transfer(msg),
        }
    }
}

/// JSON error response body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}
