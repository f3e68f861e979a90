use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tracing::debug;

use super::{Endpoint, IpcError, frame};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SCRATCH_CAPACITY_HINT: usize = 8192;

// -----------------------------------------------------------------------------
// ----- SessionState ----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    Broken,
}

// -----------------------------------------------------------------------------
// ----- TransportSession ------------------------------------------------------

/// One physical connection to the node. Requests are serialized through an
/// async mutex so at most one exchange is in flight per session.
#[derive(Debug)]
pub struct TransportSession {
    endpoint: Endpoint,
    io_timeout: Option<Duration>,
    state: Mutex<SessionState>,
    conn: tokio::sync::Mutex<Option<SessionConn>>,
}

// -----------------------------------------------------------------------------
// ----- TransportSession: Static ----------------------------------------------

impl TransportSession {
    pub fn new(endpoint: Endpoint, io_timeout: Option<Duration>) -> Self {
        Self {
            endpoint,
            io_timeout,
            state: Mutex::new(SessionState::Disconnected),
            conn: tokio::sync::Mutex::new(None),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- TransportSession: Public ----------------------------------------------

impl TransportSession {
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn connect(&self) -> Result<(), IpcError> {
        let dial = IpcStream::connect(&self.endpoint);
        let stream = match self.io_timeout {
            Some(limit) => tokio::time::timeout(limit, dial).await.map_err(|_| {
                IpcError::network(format!(
                    "dial {} timed out after {}",
                    self.endpoint,
                    humantime::format_duration(limit)
                ))
            })??,
            None => dial.await?,
        };

        *self.conn.lock().await = Some(SessionConn {
            stream,
            buffer: BytesMut::with_capacity(SCRATCH_CAPACITY_HINT),
        });
        *self.state.lock() = SessionState::Connected;

        debug!("connected session to {}", self.endpoint);
        Ok(())
    }

    /// Send one JSON action and wait for its reply.
    ///
    /// Any failure leaves the stream at an unknown position, so the connection
    /// is dropped and the session marked broken. It is never repaired in place.
    pub async fn request(&self, payload: &[u8]) -> Result<Bytes, IpcError> {
        let mut guard = self.conn.lock().await;

        let Some(conn) = guard.as_mut() else {
            return Err(match self.state() {
                SessionState::Broken => IpcError::network("session is broken"),
                _ => IpcError::network("session is not connected"),
            });
        };

        let result = match self.io_timeout {
            Some(limit) => tokio::time::timeout(limit, conn.exchange(payload))
                .await
                .unwrap_or_else(|_| {
                    Err(IpcError::network(format!(
                        "no reply within {}",
                        humantime::format_duration(limit)
                    )))
                }),
            None => conn.exchange(payload).await,
        };

        if result.is_err() {
            *guard = None;
            *self.state.lock() = SessionState::Broken;
        }

        result
    }

    /// Never waits on an exchange in flight. A busy connection is released
    /// with the last handle to the session instead.
    pub async fn close(&self) {
        *self.state.lock() = SessionState::Disconnected;

        let Ok(mut guard) = self.conn.try_lock() else {
            debug!("session to {} closed while busy", self.endpoint);
            return;
        };
        if let Some(mut conn) = guard.take() {
            let _ = conn.stream.shutdown().await;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: SessionConn -------------------------------------------------

#[derive(Debug)]
struct SessionConn {
    stream: IpcStream,
    buffer: BytesMut,
}

impl SessionConn {
    async fn exchange(&mut self, payload: &[u8]) -> Result<Bytes, IpcError> {
        let request = frame::encode_request(payload);
        self.stream.write_all(&request).await?;

        loop {
            if let Some(total) = frame::peek_reply(&self.buffer)? {
                let mut reply = self.buffer.split_to(total);
                reply.advance(frame::LEN_PREFIX);
                return Ok(reply.freeze());
            }

            self.buffer.reserve(SCRATCH_CAPACITY_HINT);
            let n = self.stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(IpcError::network("node closed the connection"));
            }
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Internal: IpcStream ---------------------------------------------------

#[derive(Debug)]
enum IpcStream {
    #[cfg(unix)]
    Local(UnixStream),
    Tcp(TcpStream),
}

impl IpcStream {
    async fn connect(endpoint: &Endpoint) -> Result<Self, IpcError> {
        match endpoint {
            #[cfg(unix)]
            Endpoint::Local(path) => {
                let stream = UnixStream::connect(path).await.map_err(|e| {
                    IpcError::network(format!("failed to connect to {endpoint}: {e}"))
                })?;
                Ok(IpcStream::Local(stream))
            }

            #[cfg(not(unix))]
            Endpoint::Local(_) => Err(IpcError::config(
                "local sockets are not supported on this platform",
            )),

            Endpoint::Tcp { host, port } => {
                let stream = TcpStream::connect((host.as_str(), *port))
                    .await
                    .map_err(|e| {
                        IpcError::network(format!("failed to connect to {endpoint}: {e}"))
                    })?;
                stream.set_nodelay(true)?;
                Ok(IpcStream::Tcp(stream))
            }
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            IpcStream::Local(stream) => stream.write_all(data).await,
            IpcStream::Tcp(stream) => stream.write_all(data).await,
        }
    }

    async fn read_buf(&mut self, buf: &mut BytesMut) -> std::io::Result<usize> {
        match self {
            #[cfg(unix)]
            IpcStream::Local(stream) => stream.read_buf(buf).await,
            IpcStream::Tcp(stream) => stream.read_buf(buf).await,
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            #[cfg(unix)]
            IpcStream::Local(stream) => stream.shutdown().await,
            IpcStream::Tcp(stream) => stream.shutdown().await,
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn echo_node() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::new();
            loop {
                if let Ok(Some(total)) = frame::peek_request(&buf) {
                    let request = buf.split_to(total);
                    let payload = &request[frame::PREAMBLE.len() + frame::LEN_PREFIX..];
                    let reply = frame::encode_reply(payload);
                    stream.write_all(&reply).await.unwrap();
                    continue;
                }
                if stream.read_buf(&mut buf).await.unwrap() == 0 {
                    return;
                }
            }
        });

        port
    }

    #[tokio::test]
    async fn request_round_trips_through_node() {
        let port = echo_node().await;
        let endpoint = Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        };

        let session = TransportSession::new(endpoint, Some(Duration::from_secs(5)));
        assert_eq!(session.state(), SessionState::Disconnected);

        session.connect().await.unwrap();
        assert_eq!(session.state(), SessionState::Connected);

        let reply = session.request(br#"{"action":"version"}"#).await.unwrap();
        assert_eq!(&reply[..], br#"{"action":"version"}"#);

        session.close().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn request_without_connection_is_a_network_error() {
        let session = TransportSession::new(Endpoint::Local("/nonexistent".into()), None);
        let err = session.request(b"{}").await.unwrap_err();
        assert!(err.is_network());
    }

    #[tokio::test]
    async fn node_hangup_breaks_the_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let session = TransportSession::new(
            Endpoint::Tcp {
                host: "127.0.0.1".to_string(),
                port,
            },
            Some(Duration::from_secs(5)),
        );
        session.connect().await.unwrap();

        let err = session.request(b"{}").await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(session.state(), SessionState::Broken);

        let err = session.request(b"{}").await.unwrap_err();
        assert!(err.is_network());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
