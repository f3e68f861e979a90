use std::{fmt, path::PathBuf, str::FromStr};

use url::Url;

use super::IpcError;

// -----------------------------------------------------------------------------
// ----- Endpoint --------------------------------------------------------------

/// Where the node's IPC server listens: `local:///tmp/nano` for a Unix domain
/// socket or `tcp://host:port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Local(PathBuf),
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    pub fn parse(raw: &str) -> Result<Self, IpcError> {
        let url = Url::parse(raw)
            .map_err(|e| IpcError::config(format!("invalid endpoint '{raw}': {e}")))?;

        match url.scheme() {
            "local" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(IpcError::config(format!("endpoint '{raw}' has no socket path")));
                }
                Ok(Endpoint::Local(PathBuf::from(path)))
            }

            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| IpcError::config(format!("endpoint '{raw}' has no host")))?;
                let port = url
                    .port()
                    .ok_or_else(|| IpcError::config(format!("endpoint '{raw}' has no port")))?;
                Ok(Endpoint::Tcp {
                    host: host.trim_start_matches('[').trim_end_matches(']').to_string(),
                    port,
                })
            }

            other => Err(IpcError::config(format!(
                "unsupported endpoint scheme '{other}' (expected local or tcp)"
            ))),
        }
    }
}

impl FromStr for Endpoint {
    type Err = IpcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Endpoint::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Local(path) => write!(f, "local://{}", path.display()),
            Endpoint::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
