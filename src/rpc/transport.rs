use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use super::connection::FrontendConnection;
use super::service::NodeService;
use crate::translator::NodeClient;

// -----------------------------------------------------------------------------
// ----- FrontendTransport -----------------------------------------------------

#[derive(Debug)]
pub enum FrontendTransport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl FrontendTransport {
    /// Wrap an accepted socket, running the TLS handshake first when an
    /// acceptor is configured.
    pub async fn accept(stream: TcpStream, tls: Option<&TlsAcceptor>) -> std::io::Result<Self> {
        let _ = stream.set_nodelay(true);

        match tls {
            Some(acceptor) => {
                let tls_stream = acceptor.accept(stream).await?;
                Ok(FrontendTransport::Tls(Box::new(tls_stream)))
            }
            None => Ok(FrontendTransport::Plain(stream)),
        }
    }

    pub async fn serve<C: NodeClient>(
        self,
        peer: SocketAddr,
        service: Arc<NodeService<C>>,
    ) -> std::io::Result<()> {
        match self {
            FrontendTransport::Plain(stream) => {
                FrontendConnection::new(stream, peer, service).serve().await
            }
            FrontendTransport::Tls(stream) => {
                FrontendConnection::new(*stream, peer, service).serve().await
            }
        }
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
