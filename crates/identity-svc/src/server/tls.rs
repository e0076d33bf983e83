//! TLS listener setup using rustls.
//!
//! The certificate chain and private key are read from the PEM files named in
//! the configuration, and every accepted TCP connection is wrapped in a TLS
//! stream before being handed to hyper.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, warn};

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and private key bytes.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse TLS certificate chain")?;
    if certs.is_empty() {
        anyhow::bail!("no certificate found in PEM data");
    }

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
        .context("failed to read TLS private key")?
        .context("no private key found in PEM data")?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("failed to build rustls ServerConfig")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

/// Load the certificate chain and key from disk.
///
/// # Errors
///
/// Returns an error if either file cannot be read or parsed.
pub async fn load_server_config(cert_path: &str, key_path: &str) -> Result<Arc<ServerConfig>> {
    let cert_pem = tokio::fs::read(cert_path)
        .await
        .with_context(|| format!("failed to read TLS certificate from {cert_path}"))?;
    let key_pem = tokio::fs::read(key_path)
        .await
        .with_context(|| format!("failed to read TLS private key from {key_path}"))?;
    build_server_config(&cert_pem, &key_pem)
}

/// Accept TLS connections on `listener` forever, serving `router` on each.
///
/// A failed handshake or connection only affects that connection.
///
/// # Errors
///
/// Returns an error if the listener itself fails to accept.
pub async fn serve(listener: TcpListener, router: Router, config: Arc<ServerConfig>) -> Result<()> {
    let acceptor = TlsAcceptor::from(config);

    loop {
        let (tcp, peer) = listener.accept().await.context("TCP accept failed")?;
        let acceptor = acceptor.clone();
        let service = TowerToHyperService::new(router.clone());

        tokio::spawn(async move {
            let tls = match acceptor.accept(tcp).await {
                Ok(stream) => stream,
                Err(e) => {
                    debug!(peer = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            };

            if let Err(e) = auto::Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(tls), service)
                .await
            {
                warn!(peer = %peer, error = %e, "connection error");
            }
        });
    }
}
