//! TLS client connections for `https:` URLs.

use crate::error::{HttpError, HttpResult};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, OnceLock};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

/// Client configuration trusting the platform's native roots.
pub fn client_config() -> HttpResult<ClientConfig> {
    let mut root_store = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs()
        .map_err(|e| HttpError::Tls(format!("Failed to load native certificates: {e}")))?;
    let (added, ignored) = root_store.add_parsable_certificates(native);
    tracing::debug!(added, ignored, "Loaded native root certificates");

    let mut config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

static SHARED_CONFIG: OnceLock<Arc<ClientConfig>> = OnceLock::new();

/// The process-wide client configuration, built on first use.
///
/// A failed load is not cached, so a later call retries it.
pub fn shared_client_config() -> HttpResult<Arc<ClientConfig>> {
    if let Some(config) = SHARED_CONFIG.get() {
        return Ok(config.clone());
    }
    let config = Arc::new(client_config()?);
    Ok(SHARED_CONFIG.get_or_init(|| config).clone())
}

/// Run the client handshake over an established TCP stream.
pub async fn connect(
    stream: TcpStream,
    host: &str,
    config: Arc<ClientConfig>,
) -> HttpResult<TlsStream<TcpStream>> {
    let domain = ServerName::try_from(host.to_string())
        .map_err(|e| HttpError::Tls(format!("Invalid server name: {e}")))?;
    let connector = TlsConnector::from(config);
    let stream = connector
        .connect(domain, stream)
        .await
        .map_err(|e| HttpError::Tls(format!("Handshake failed: {e}")))?;
    Ok(stream)
}
