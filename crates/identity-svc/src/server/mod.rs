//! Axum HTTP(S) server, routing, and middleware.
//!
//! # Responsibilities
//! - Define the Axum router with all routes and shared middleware
//!   (request tracing, timeout enforcement, response compression).
//! - Inject shared application state (`AppState`) into handlers.
//! - Serve over plain TCP, or over rustls when TLS is configured.

pub mod handlers;
pub mod router;
pub mod state;
pub mod tls;
