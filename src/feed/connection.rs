use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, Stream, StreamExt};
use futures::SinkExt;
use parking_lot::Mutex;
use serde_json::{Map, Value, json};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::{ConfirmationEvent, DispatchStats, FeedError, SubscriptionRegistry};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

/// How long `close` waits for the read loop to see the close handshake
/// before tearing the connection down.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// -----------------------------------------------------------------------------
// ----- Types -----------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Receiver side of the feed's state, for components that only need to know
/// whether the feed is still alive.
pub type FeedStatus = watch::Receiver<FeedState>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedState {
    Connecting,
    Connected,
    Closing,
    Closed,
    Failed(String),
}

impl FeedState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedState::Closed | FeedState::Failed(_))
    }
}

// -----------------------------------------------------------------------------
// ----- LiveFeed --------------------------------------------------------------

/// The single WebSocket connection to the node's confirmation feed.
///
/// There is no reconnect: a read error outside a requested close is fatal and
/// surfaces through [`LiveFeed::terminated`]. Whoever runs the gateway is
/// expected to restart it.
#[derive(Debug)]
pub struct LiveFeed {
    registry: Arc<SubscriptionRegistry>,
    state: Arc<watch::Sender<FeedState>>,
    writer: tokio::sync::Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

// -----------------------------------------------------------------------------
// ----- LiveFeed: Static ------------------------------------------------------

impl LiveFeed {
    pub async fn connect(
        url: &str,
        handshake: String,
        registry: Arc<SubscriptionRegistry>,
    ) -> Result<Self, FeedError> {
        let (state, _) = watch::channel(FeedState::Connecting);
        let state = Arc::new(state);

        info!("connecting to live feed at {url}");
        let (socket, _response) =
            tokio_tungstenite::connect_async(url)
                .await
                .map_err(|source| FeedError::Connect {
                    url: url.to_string(),
                    source,
                })?;

        let (mut sink, stream) = socket.split();

        info!("live feed request: {handshake}");
        sink.send(Message::text(handshake))
            .await
            .map_err(FeedError::Handshake)?;

        state.send_replace(FeedState::Connected);

        let reader = tokio::spawn(read_loop(stream, registry.clone(), state.clone()));

        Ok(Self {
            registry,
            state,
            writer: tokio::sync::Mutex::new(Some(sink)),
            reader: Mutex::new(Some(reader)),
        })
    }
}

// -----------------------------------------------------------------------------
// ----- LiveFeed: Public ------------------------------------------------------

impl LiveFeed {
    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    pub fn state(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> FeedStatus {
        self.state.subscribe()
    }

    /// Resolves once the read loop has stopped. `Ok` only for a requested
    /// close.
    pub async fn terminated(&self) -> Result<(), FeedError> {
        wait_terminated(self.status()).await
    }

    /// Send a close frame, give the read loop [`CLOSE_TIMEOUT`] to observe
    /// the handshake, then drop the connection whatever happened.
    pub async fn close(&self) {
        info!("closing live feed");
        let deadline = Instant::now() + CLOSE_TIMEOUT;

        let begun = self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = FeedState::Closing;
            true
        });

        let mut writer = self.writer.lock().await;

        if begun {
            if let Some(sink) = writer.as_mut() {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                };
                match tokio::time::timeout_at(deadline, sink.send(Message::Close(Some(frame)))).await
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!("write close: {e}"),
                    Err(_) => warn!("write close timed out"),
                }
            }

            let mut status = self.status();
            let observed = tokio::time::timeout_at(deadline, async {
                status.wait_for(FeedState::is_terminal).await.is_ok()
            })
            .await;

            if observed.is_err() {
                warn!(
                    "live feed did not finish closing within {}, forcing",
                    humantime::format_duration(CLOSE_TIMEOUT)
                );
            }
        }

        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        writer.take();

        self.state.send_if_modified(|state| {
            if state.is_terminal() {
                return false;
            }
            *state = FeedState::Closed;
            true
        });
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Read loop -------------------------------------------------------------

/// Decode every inbound frame and fan it out. Runs until the stream errors,
/// ends or a requested close completes, then records the outcome in `state`.
pub async fn read_loop<S>(
    mut stream: S,
    registry: Arc<SubscriptionRegistry>,
    state: Arc<watch::Sender<FeedState>>,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    debug!("starting live feed read loop");

    let closing = |state: &watch::Sender<FeedState>| *state.borrow() == FeedState::Closing;

    let outcome = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_frame(&registry, text.as_str().as_bytes());
            }

            Some(Ok(Message::Binary(data))) => {
                handle_frame(&registry, &data);
            }

            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}

            Some(Ok(Message::Close(frame))) => {
                if closing(&state) {
                    break Ok(());
                }
                break Err(FeedError::ClosedByPeer(format!("{frame:?}")));
            }

            Some(Err(err)) => {
                let after_close = matches!(
                    err,
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed
                );
                if after_close && closing(&state) {
                    break Ok(());
                }
                break Err(FeedError::Read(err));
            }

            None => {
                if closing(&state) {
                    break Ok(());
                }
                break Err(FeedError::ClosedByPeer("stream ended".to_string()));
            }
        }
    };

    match outcome {
        Ok(()) => {
            info!("live feed closed");
            state.send_replace(FeedState::Closed);
        }
        Err(err) => {
            error!("live feed read: {err}");
            state.send_replace(FeedState::Failed(err.to_string()));
        }
    }
}

/// Decode one frame and dispatch it. Undecodable frames are logged and
/// skipped.
pub fn handle_frame(registry: &SubscriptionRegistry, frame: &[u8]) -> Option<DispatchStats> {
    match ConfirmationEvent::decode(frame) {
        Ok(event) => Some(registry.dispatch(&Arc::new(event))),
        Err(e) => {
            error!("error unmarshaling live feed message: {e}");
            None
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Helpers ---------------------------------------------------------------

pub async fn wait_terminated(mut status: FeedStatus) -> Result<(), FeedError> {
    let state = match status.wait_for(FeedState::is_terminal).await {
        Ok(state) => state.clone(),
        Err(_) => return Err(FeedError::Terminated("feed dropped".to_string())),
    };

    match state {
        FeedState::Failed(reason) => Err(FeedError::Terminated(reason)),
        _ => Ok(()),
    }
}

/// Subscribe request sent right after connecting.
pub fn subscribe_handshake(local_accounts_only: bool, accounts: &[String]) -> String {
    let mut request = json!({
        "action": "subscribe",
        "topic": "confirmation",
        "ack": "false",
    });

    let mut options = Map::new();
    if local_accounts_only {
        options.insert("all_local_accounts".to_string(), Value::from("true"));
    }
    if !accounts.is_empty() {
        options.insert("accounts".to_string(), Value::from(accounts.to_vec()));
    }
    if !options.is_empty() {
        request["options"] = Value::Object(options);
    }

    request.to_string()
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
