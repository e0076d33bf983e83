//! `identity-svc` — service binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise the telemetry pipeline (JSON logs, optional OTLP export).
//! 3. Build the field cipher from the configured key.
//! 4. Open the identity database and run migrations.
//! 5. Build the Axum router and serve it over TLS or plain TCP.

mod auth;
mod config;
mod crypto;
mod identity;
mod server;
mod store;
mod telemetry;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use auth::HmacTokenVerifier;
use config::Config;
use crypto::FieldCipher;
use identity::IdentityReconciler;
use server::state::AppState;
use store::{Database, SqliteIdentityStore};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        tls = cfg.tls_paths().is_some(),
        "identity-svc starting"
    );

    // -----------------------------------------------------------------------
    // 3. Field cipher
    // -----------------------------------------------------------------------
    let cipher = FieldCipher::new(&cfg.field_key()?).context("failed to build field cipher")?;
    let verifier = HmacTokenVerifier::new(cfg.token_signing_secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid TOKEN_SIGNING_SECRET: {e}"))?;

    // -----------------------------------------------------------------------
    // 4. Identity database
    // -----------------------------------------------------------------------
    let db = Database::open(Path::new(&cfg.database_path))
        .with_context(|| format!("failed to open identity database at {}", cfg.database_path))?;
    let store = SqliteIdentityStore::new(Arc::new(db));
    info!(path = %cfg.database_path, "identity database ready");

    // -----------------------------------------------------------------------
    // 5. HTTP server
    // -----------------------------------------------------------------------
    let state = AppState::new(
        Arc::new(verifier),
        IdentityReconciler::new(cipher, Arc::new(store)),
    );
    let router = server::router::build(state);

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], cfg.listen_port).into();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %addr, "listening");

    match cfg.tls_paths() {
        Some((cert, key)) => {
            let tls = server::tls::load_server_config(cert, key).await?;
            server::tls::serve(listener, router, tls).await?;
        }
        None => axum::serve(listener, router).await?,
    }

    Ok(())
}
