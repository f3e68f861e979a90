use thiserror::Error;
use tokio_tungstenite::tungstenite;

// -----------------------------------------------------------------------------
// ----- FeedError -------------------------------------------------------------

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        source: tungstenite::Error,
    },

    #[error("failed to send subscribe request: {0}")]
    Handshake(#[source] tungstenite::Error),

    #[error("read failed: {0}")]
    Read(#[source] tungstenite::Error),

    #[error("connection closed by peer: {0}")]
    ClosedByPeer(String),

    #[error("feed terminated: {0}")]
    Terminated(String),
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
