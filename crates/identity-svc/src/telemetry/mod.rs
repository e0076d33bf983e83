//! Tracing setup: structured JSON logs, plus OTLP span export when configured.
//!
//! # Telemetry invariants
//!
//! - **No PII, tokens, ciphertext, or key material** in any span attribute or
//!   log field. Subject ids and provider names are the only identity data logged.
//! - Log level is configurable via `LOG_LEVEL` (default: `info`); `RUST_LOG`
//!   takes precedence.

pub mod init;

pub use init::init_telemetry;
