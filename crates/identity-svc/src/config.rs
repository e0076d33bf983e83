//! Configuration loading and validation for the identity service.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::crypto::FieldKey;

/// Validated service configuration.
#[derive(Clone, Deserialize)]
pub struct Config {
    /// Base64-encoded 32-byte key for PII field encryption. **Required.**
    pub field_encryption_key: String,

    /// Shared secret used to verify identity provider tokens. **Required.**
    pub token_signing_secret: String,

    /// Path of the SQLite identity database.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Port the HTTP(S) server listens on.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// PEM-encoded TLS certificate chain. TLS is enabled when this and
    /// `tls_key_path` are both set.
    #[serde(default)]
    pub tls_cert_path: Option<String>,

    /// PEM-encoded TLS private key.
    #[serde(default)]
    pub tls_key_path: Option<String>,

    /// OTLP endpoint for span export. Spans stay local when unset.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_database_path() -> String {
    "identity.db".into()
}
fn default_listen_port() -> u16 {
    5000
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Parse the field encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is not base64 or not 32 bytes.
    pub fn field_key(&self) -> Result<FieldKey> {
        FieldKey::from_base64(&self.field_encryption_key)
            .context("FIELD_ENCRYPTION_KEY is invalid")
    }

    /// Certificate and key paths when TLS is configured.
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.field_encryption_key, "FIELD_ENCRYPTION_KEY")?;
        ensure_non_empty(&self.token_signing_secret, "TOKEN_SIGNING_SECRET")?;
        ensure_non_empty(&self.database_path, "DATABASE_PATH")?;
        self.field_key()?;

        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            anyhow::bail!("TLS_CERT_PATH and TLS_KEY_PATH must be set together");
        }
        if let Some(endpoint) = &self.otel_exporter_otlp_endpoint {
            ensure_non_empty(endpoint, "OTEL_EXPORTER_OTLP_ENDPOINT")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("field_encryption_key", &"[REDACTED]")
            .field("token_signing_secret", &"[REDACTED]")
            .field("database_path", &self.database_path)
            .field("listen_port", &self.listen_port)
            .field("tls_cert_path", &self.tls_cert_path)
            .field("tls_key_path", &self.tls_key_path)
            .field("otel_exporter_otlp_endpoint", &self.otel_exporter_otlp_endpoint)
            .field("log_level", &self.log_level)
            .finish()
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
