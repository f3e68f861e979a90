//! Bearer-token gate in front of every call.

use std::collections::HashSet;
use std::path::Path;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::errors::GatewayError;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// Metadata key carrying the token.
pub const AUTH_METADATA_KEY: &str = "auth-token-bin";

const RSA_FAMILY: [Algorithm; 6] = [
    Algorithm::RS256,
    Algorithm::RS384,
    Algorithm::RS512,
    Algorithm::PS256,
    Algorithm::PS384,
    Algorithm::PS512,
];

// -----------------------------------------------------------------------------
// ----- AuthGate --------------------------------------------------------------

#[derive(Clone)]
pub enum AuthGate {
    Disabled,
    Enabled { public_key: DecodingKey },
}

// -----------------------------------------------------------------------------
// ----- AuthGate: Static ------------------------------------------------------

impl AuthGate {
    pub fn disabled() -> Self {
        AuthGate::Disabled
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, AuthError> {
        let public_key = DecodingKey::from_rsa_pem(pem).map_err(AuthError::Key)?;
        Ok(AuthGate::Enabled { public_key })
    }

    pub async fn from_file(path: &Path) -> Result<Self, AuthError> {
        let pem = tokio::fs::read(path).await.map_err(|e| AuthError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_pem(&pem)
    }
}

// -----------------------------------------------------------------------------
// ----- AuthGate: Public ------------------------------------------------------

impl AuthGate {
    pub fn is_enabled(&self) -> bool {
        matches!(self, AuthGate::Enabled { .. })
    }

    /// Runs before any handler. A disabled gate lets everything through.
    pub fn check(&self, token: Option<&SecretString>) -> Result<(), GatewayError> {
        let AuthGate::Enabled { public_key } = self else {
            return Ok(());
        };

        let token = token.ok_or(GatewayError::MissingMetadata)?;

        verify(token.expose_secret(), public_key).map_err(|err| {
            warn!("error validating token: {err}");
            GatewayError::Unauthenticated
        })
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthGate::Disabled => f.write_str("AuthGate::Disabled"),
            AuthGate::Enabled { .. } => f.write_str("AuthGate::Enabled"),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- authorize -------------------------------------------------------------

/// Check `token` against a PEM encoded RSA public key.
pub fn authorize(token: &[u8], public_key_pem: &[u8]) -> bool {
    let Ok(token) = std::str::from_utf8(token) else {
        return false;
    };

    let key = match DecodingKey::from_rsa_pem(public_key_pem) {
        Ok(key) => key,
        Err(e) => {
            warn!("unusable public key: {e}");
            return false;
        }
    };

    match verify(token, &key) {
        Ok(()) => true,
        Err(e) => {
            warn!("error validating token: {e}");
            false
        }
    }
}

fn verify(token: &str, key: &DecodingKey) -> Result<(), AuthError> {
    let header = decode_header(token).map_err(AuthError::Token)?;

    if !RSA_FAMILY.contains(&header.alg) {
        return Err(AuthError::UnexpectedAlgorithm(header.alg));
    }

    let mut validation = Validation::new(header.alg);
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;

    decode::<Value>(token, key, &validation).map_err(AuthError::Token)?;
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unexpected signing method: {0:?}")]
    UnexpectedAlgorithm(Algorithm),

    #[error("invalid token: {0}")]
    Token(#[source] jsonwebtoken::errors::Error),

    #[error("invalid public key: {0}")]
    Key(#[source] jsonwebtoken::errors::Error),

    #[error("read error for {path:?}: {source}")]
    Io {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
