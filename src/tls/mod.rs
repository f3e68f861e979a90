use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};

use crate::config::TlsSettings;

// -----------------------------------------------------------------------------
// ----- TLS: Exported ---------------------------------------------------------

/// Acceptor for the RPC listener, or `None` when no TLS material is
/// configured. Broken material is an error, never a silent plaintext fallback.
pub fn acceptor(settings: Option<&TlsSettings>) -> Result<Option<TlsAcceptor>, String> {
    let Some(settings) = settings else {
        return Ok(None);
    };

    let certs = load_certs(&settings.cert)?;
    let key = load_key(&settings.key)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| format!("invalid tls key/cert pair: {e}"))?;

    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

// -----------------------------------------------------------------------------
// ----- TLS: Private helpers --------------------------------------------------

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, String> {
    let file =
        File::open(path).map_err(|e| format!("failed to open tls cert {}: {e}", path.display()))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("failed to read tls cert {}: {e}", path.display()))?;

    if certs.is_empty() {
        return Err(format!("no certificates found in {}", path.display()));
    }

    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, String> {
    let file =
        File::open(path).map_err(|e| format!("failed to open tls key {}: {e}", path.display()))?;
    let mut reader = BufReader::new(file);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| format!("failed to read tls key {}: {e}", path.display()))?
        .ok_or_else(|| format!("no private key found in {}", path.display()))?;

    Ok(key)
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
