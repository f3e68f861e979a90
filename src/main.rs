use std::sync::Arc;

use tokio::net::{TcpListener, TcpSocket};
use tokio::signal;
use tokio_rustls::TlsAcceptor;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use nanogate::auth::AuthGate;
use nanogate::config::AuthSettings;
use nanogate::feed::subscribe_handshake;
use nanogate::{
    Config, FrontendTransport, LiveFeed, NodeService, ProtocolTranslator, SessionPool,
    SubscriptionRegistry, tls,
};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "nanogate";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> std::io::Result<()> {
    setup().await;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() {
    // This has to be the first thing we do, because it initializes the config
    Config::init().await;

    init_tracing();
}

fn init_tracing() {
    let config = Config::snapshot();
    let filter = EnvFilter::try_new(config.log_level.as_str())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> std::io::Result<()> {
    let config = Config::snapshot();
    let gateway = config.gateway;

    let auth = match &gateway.auth {
        AuthSettings::Disabled => AuthGate::disabled(),
        AuthSettings::Enabled { public_key } => AuthGate::from_file(public_key)
            .await
            .unwrap_or_else(|e| panic!("failed to load auth public key: {e}")),
    };

    let tls_acceptor =
        tls::acceptor(gateway.tls.as_ref()).unwrap_or_else(|e| panic!("tls setup failed: {e}"));

    let pool = Arc::new(
        SessionPool::initialize(
            gateway.node.endpoint.clone(),
            gateway.node.pool_size,
            gateway.node.io_timeout,
        )
        .await,
    );

    let registry = Arc::new(SubscriptionRegistry::new());
    let handshake = subscribe_handshake(gateway.feed.local_accounts_only, &gateway.feed.accounts);
    let feed = LiveFeed::connect(&gateway.feed.url, handshake, registry.clone())
        .await
        .map_err(|e| {
            error!("{e}");
            std::io::Error::other(e)
        })?;

    let service = Arc::new(NodeService::new(
        ProtocolTranslator::new(pool.clone()),
        registry,
        feed.status(),
        auth,
    ));

    let listener = bind(config.listen_addr)?;
    info!(
        "{} listening on {} ({}, auth {})",
        APP_NAME,
        config.listen_addr,
        if tls_acceptor.is_some() { "tls" } else { "plaintext" },
        if service.auth().is_enabled() { "enabled" } else { "disabled" },
    );

    let outcome = loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("{} shutting down", APP_NAME);
                break Ok(());
            }

            terminated = feed.terminated() => {
                match terminated {
                    Ok(()) => break Ok(()),
                    Err(e) => {
                        error!("live feed lost, exiting: {e}");
                        break Err(std::io::Error::other(e));
                    }
                }
            }

            accept_res = listener.accept() => {
                let (stream, peer) = match accept_res {
                    Ok(v) => v,
                    Err(e) => { error!("accept error: {e}"); continue; }
                };

                spawn_connection(stream, peer, tls_acceptor.clone(), service.clone());
            }
        }
    };

    feed.close().await;
    pool.close().await;

    outcome
}

fn bind(addr: std::net::SocketAddr) -> std::io::Result<TcpListener> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };

    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    socket.listen(1024)
}

fn spawn_connection(
    stream: tokio::net::TcpStream,
    peer: std::net::SocketAddr,
    tls_acceptor: Option<TlsAcceptor>,
    service: Arc<NodeService<SessionPool>>,
) {
    tokio::spawn(async move {
        let transport = match FrontendTransport::accept(stream, tls_acceptor.as_ref()).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!("tls handshake with {peer} failed: {e}");
                return;
            }
        };

        if let Err(e) = transport.serve(peer, service).await {
            error!("client {peer} error: {e}");
        }
    });
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
