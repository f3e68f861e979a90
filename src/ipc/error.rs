use std::fmt;

use thiserror::Error;

// -----------------------------------------------------------------------------
// ----- ErrorCategory ---------------------------------------------------------

/// Network errors mean the node process is likely gone (restart or crash) and
/// trigger a full pool rebuild. Protocol errors only break the one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Protocol,
    Config,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Network => f.write_str("network"),
            ErrorCategory::Protocol => f.write_str("protocol"),
            ErrorCategory::Config => f.write_str("config"),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- IpcError --------------------------------------------------------------

#[derive(Debug, Error)]
#[error("{category} error: {message}")]
pub struct IpcError {
    category: ErrorCategory,
    message: String,
}

impl IpcError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Network,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Protocol,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Config,
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn is_network(&self) -> bool {
        self.category == ErrorCategory::Network
    }
}

impl From<std::io::Error> for IpcError {
    fn from(err: std::io::Error) -> Self {
        IpcError::network(err.to_string())
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
