use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use super::{Endpoint, SessionState, TransportSession};
use crate::errors::GatewayError;

// -----------------------------------------------------------------------------
// ----- SessionPool -----------------------------------------------------------

/// Fixed-size set of node sessions handed out round robin.
///
/// A network failure on any session is taken as a node-level event (restart or
/// crash), so the whole pool is torn down and redialed on the next `acquire`.
/// A pool that could not dial every session runs degraded and keeps retrying.
#[derive(Debug)]
pub struct SessionPool {
    endpoint: Endpoint,
    size: usize,
    io_timeout: Option<Duration>,
    sessions: RwLock<Vec<Arc<TransportSession>>>,
    next: AtomicUsize,
    needs_reconnect: AtomicBool,
    dials: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub endpoint: String,
    pub size: usize,
    pub live: usize,
    pub needs_reconnect: bool,
    pub dials: u64,
}

// -----------------------------------------------------------------------------
// ----- SessionPool: Static ---------------------------------------------------

impl SessionPool {
    /// Dial `size` sessions. Never fails: a short pool is flagged for
    /// reconnect and served degraded until a rebuild succeeds.
    pub async fn initialize(endpoint: Endpoint, size: usize, io_timeout: Option<Duration>) -> Self {
        let pool = Self {
            endpoint,
            size: size.max(1),
            io_timeout,
            sessions: RwLock::new(Vec::new()),
            next: AtomicUsize::new(0),
            needs_reconnect: AtomicBool::new(false),
            dials: AtomicU64::new(0),
        };

        {
            let mut sessions = pool.sessions.write().await;
            pool.dial_all(&mut sessions).await;
        }

        pool
    }
}

// -----------------------------------------------------------------------------
// ----- SessionPool: Public ---------------------------------------------------

impl SessionPool {
    /// Next usable session in round-robin order, rebuilding the pool first
    /// when a previous failure asked for it.
    ///
    /// Sessions broken by a protocol error are skipped; once every session is
    /// broken the pool is rebuilt. Two concurrent callers may land on the same
    /// session; the session's own lock makes the second one wait for the first
    /// exchange to finish.
    pub async fn acquire(&self) -> Result<Arc<TransportSession>, GatewayError> {
        for _ in 0..2 {
            if self.needs_reconnect.load(Ordering::Acquire) {
                let mut sessions = self.sessions.write().await;

                // Another caller may have rebuilt while we waited for the lock.
                if self.needs_reconnect.load(Ordering::Acquire) {
                    self.rebuild(&mut sessions).await;
                }
            }

            let sessions = self.sessions.read().await;
            if sessions.is_empty() {
                break;
            }

            let start = self.next.fetch_add(1, Ordering::Relaxed);
            let usable = (0..sessions.len())
                .map(|offset| &sessions[(start + offset) % sessions.len()])
                .find(|session| session.state() != SessionState::Broken);

            if let Some(session) = usable {
                return Ok(session.clone());
            }

            warn!("every node session is broken, scheduling pool rebuild");
            self.needs_reconnect.store(true, Ordering::Release);
        }

        Err(GatewayError::Unavailable(format!(
            "no session connected to {}",
            self.endpoint
        )))
    }

    /// Run one exchange on `session`. A network failure schedules a full
    /// rebuild for the next `acquire`; the failing call still gets the error.
    pub async fn execute(
        &self,
        session: &TransportSession,
        payload: &[u8],
    ) -> Result<Bytes, GatewayError> {
        match session.request(payload).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                if err.is_network() {
                    warn!("node session failed, scheduling pool rebuild: {err}");
                    self.needs_reconnect.store(true, Ordering::Release);
                }
                Err(GatewayError::Transport(err))
            }
        }
    }

    pub async fn stats(&self) -> PoolStats {
        let live = self.sessions.read().await.len();

        PoolStats {
            endpoint: self.endpoint.to_string(),
            size: self.size,
            live,
            needs_reconnect: self.needs_reconnect.load(Ordering::Acquire),
            dials: self.dials.load(Ordering::Relaxed),
        }
    }

    pub async fn close(&self) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.drain(..) {
            session.close().await;
        }
    }
}

// -----------------------------------------------------------------------------
// ----- SessionPool: Private --------------------------------------------------

impl SessionPool {
    async fn rebuild(&self, sessions: &mut Vec<Arc<TransportSession>>) {
        info!(
            "rebuilding node session pool for {} ({} sessions)",
            self.endpoint, self.size
        );

        for session in sessions.drain(..) {
            session.close().await;
        }
        self.next.store(0, Ordering::Relaxed);

        self.dial_all(sessions).await;

        if !self.needs_reconnect.load(Ordering::Acquire) {
            info!("reconnected to node at {}", self.endpoint);
        }
    }

    /// Dial sequentially and stop at the first failure.
    async fn dial_all(&self, sessions: &mut Vec<Arc<TransportSession>>) {
        while sessions.len() < self.size {
            let session = TransportSession::new(self.endpoint.clone(), self.io_timeout);
            self.dials.fetch_add(1, Ordering::Relaxed);

            if let Err(err) = session.connect().await {
                error!("{err}");
                break;
            }

            sessions.push(Arc::new(session));
        }

        let short = sessions.len() < self.size;
        if short {
            info!(
                "node pool degraded ({}/{} sessions), reconnection attempt required",
                sessions.len(),
                self.size
            );
        }
        self.needs_reconnect.store(short, Ordering::Release);
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{ErrorCategory, frame};
    use bytes::BytesMut;
    use serde_json::{Value, json};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Node on loopback TCP. Answers `{"connection": n}` in dial order, except
    /// `garbage` (oversized length header), `silence` (no reply ever) and
    /// `hangup` (drops the connection).
    async fn scripted_node() -> Endpoint {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            for index in 0.. {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(serve_conn(stream, index));
            }
        });

        Endpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        }
    }

    async fn serve_conn(mut stream: TcpStream, index: u64) {
        let mut buf = BytesMut::new();
        loop {
            while let Ok(Some(total)) = frame::peek_request(&buf) {
                let request = buf.split_to(total);
                let action: Value =
                    serde_json::from_slice(&request[frame::PREAMBLE.len() + frame::LEN_PREFIX..])
                        .unwrap();

                let reply = match action["action"].as_str() {
                    Some("garbage") => vec![0xFF; 4],
                    Some("silence") => continue,
                    Some("hangup") => return,
                    _ => frame::encode_reply(json!({"connection": index}).to_string().as_bytes())
                        .to_vec(),
                };
                if stream.write_all(&reply).await.is_err() {
                    return;
                }
            }

            match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            }
        }
    }

    async fn send(pool: &SessionPool, action: &str) -> Result<u64, GatewayError> {
        let session = pool.acquire().await?;
        let payload = json!({"action": action}).to_string();
        let reply = pool.execute(&session, payload.as_bytes()).await?;
        let reply: Value = serde_json::from_slice(&reply).unwrap();
        Ok(reply["connection"].as_u64().unwrap())
    }

    #[tokio::test]
    async fn protocol_broken_session_leaves_the_rotation() {
        let pool = SessionPool::initialize(scripted_node().await, 2, None).await;

        let err = send(&pool, "garbage").await.unwrap_err();
        match err {
            GatewayError::Transport(ref e) => assert_eq!(e.category(), ErrorCategory::Protocol),
            other => panic!("expected a protocol error, got {other}"),
        }

        // Not a node-level failure: no rebuild, the healthy session serves.
        assert!(!pool.stats().await.needs_reconnect);
        for _ in 0..4 {
            assert_eq!(send(&pool, "version").await.unwrap(), 1);
        }
        assert_eq!(pool.stats().await.dials, 2);
    }

    #[tokio::test]
    async fn pool_of_broken_sessions_is_rebuilt() {
        let pool = SessionPool::initialize(scripted_node().await, 1, None).await;

        send(&pool, "garbage").await.unwrap_err();
        assert!(!pool.stats().await.needs_reconnect);

        assert_eq!(send(&pool, "version").await.unwrap(), 1);
        assert_eq!(pool.stats().await.dials, 2);
    }

    #[tokio::test]
    async fn rebuild_does_not_wait_for_a_hung_exchange() {
        let pool = Arc::new(SessionPool::initialize(scripted_node().await, 2, None).await);

        let hung = {
            let pool = pool.clone();
            tokio::spawn(async move { send(&pool, "silence").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = send(&pool, "hangup").await.unwrap_err();
        assert!(matches!(err, GatewayError::Transport(ref e) if e.is_network()));
        assert!(pool.stats().await.needs_reconnect);

        let connection = tokio::time::timeout(Duration::from_secs(2), send(&pool, "version"))
            .await
            .expect("acquire blocked behind an exchange in flight")
            .unwrap();
        assert!(connection >= 2);
        assert_eq!(pool.stats().await.live, 2);

        hung.abort();
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
