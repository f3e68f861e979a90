use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::feed::FeedError;
use crate::ipc::IpcError;

// -----------------------------------------------------------------------------
// ----- GatewayError ----------------------------------------------------------

/// Every outcome a call can fail with. Each variant maps to a distinct status
/// code so callers can branch on it.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("node unavailable: {0}")]
    Unavailable(String),

    #[error("node transport error: {0}")]
    Transport(#[from] IpcError),

    #[error("could not decode node reply: {source}")]
    Decode {
        source: serde_json::Error,
        raw: Bytes,
    },

    /// The node answered `{"error": "..."}`. Carries the node's text verbatim.
    #[error("{0}")]
    Application(String),

    #[error("missing metadata")]
    MissingMetadata,

    #[error("invalid token")]
    Unauthenticated,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown method '{0}'")]
    UnknownMethod(String),

    #[error("live feed error: {0}")]
    Feed(#[from] FeedError),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Unavailable(_) | GatewayError::Transport(_) => "unavailable",
            GatewayError::Decode { .. } => "internal",
            GatewayError::Application(_) => "application",
            GatewayError::MissingMetadata | GatewayError::InvalidArgument(_) => {
                "invalid_argument"
            }
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::UnknownMethod(_) => "unimplemented",
            GatewayError::Feed(_) => "unavailable",
        }
    }

    /// Raw node payload kept for diagnostics when decoding failed.
    pub fn raw_payload(&self) -> Option<&[u8]> {
        match self {
            GatewayError::Decode { raw, .. } => Some(raw.as_ref()),
            _ => None,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse ---------------------------------------------------------

/// Error body sent back to RPC callers.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Static -------------------------------------------------

impl ErrorResponse {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("internal", message)
    }

    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::new("invalid_argument", message)
    }
}

// -----------------------------------------------------------------------------
// ----- ErrorResponse: Builder ------------------------------------------------

impl ErrorResponse {
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<&GatewayError> for ErrorResponse {
    fn from(err: &GatewayError) -> Self {
        let response = ErrorResponse::new(err.code(), err.to_string());

        match err.raw_payload() {
            Some(raw) => response.with_detail(String::from_utf8_lossy(raw)),
            None => response,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
