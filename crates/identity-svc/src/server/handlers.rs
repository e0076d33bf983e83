//! Axum request handlers for all service endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use common::protocol::{ErrorResponse, HealthResponse, ListedIdentity, LoginRequest, LoginResponse};
use common::ServiceError;
use tracing::{error, warn};

use super::state::AppState;
use crate::identity::{PersistenceError, ReconcileError};

/// `POST /api/auth/login` — verify an identity token and upsert its subject.
///
/// Login and signup are the same call: the subject's row is created on first
/// sight and replaced with the latest claim afterwards.
pub async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let claim = match state.verifier.verify(&req.token) {
        Ok(claim) => claim,
        Err(e) => {
            warn!(reason = %e, "identity token rejected");
            return error_response(ServiceError::Unauthorized("Invalid token".into()));
        }
    };

    match state.reconciler.reconcile(claim).await {
        Ok(user) => {
            let body = LoginResponse {
                message: "User logged in successfully".into(),
                user,
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            log_reconcile_failure(&e);
            error_response(e.into())
        }
    }
}

/// `GET /api/users` — every stored identity, decrypted.
///
/// A row whose fields no longer decrypt is still returned, with those fields
/// set to `null` and named in `corrupted_fields`.
pub async fn list_users(State(state): State<AppState>) -> Response {
    match state.reconciler.list_all().await {
        Ok(listing) => {
            let users: Vec<ListedIdentity> = listing.collect();
            (StatusCode::OK, Json(users)).into_response()
        }
        Err(e) => {
            log_reconcile_failure(&e);
            error_response(e.into())
        }
    }
}

/// `GET /health` — liveness and readiness check.
///
/// Returns `200 OK` when the identity database answers a ping.
/// Returns `503 Service Unavailable` otherwise.
pub async fn health(State(state): State<AppState>) -> Response {
    let database_ready = state.reconciler.store_ready().await;

    let (status_code, status_str) = if database_ready {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    let body = HealthResponse {
        status: status_str.into(),
        database_ready,
    };
    (status_code, Json(body)).into_response()
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

fn error_response(err: ServiceError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = ErrorResponse::new(err.code(), err.to_string());
    (status, Json(body)).into_response()
}

fn log_reconcile_failure(e: &ReconcileError) {
    match e {
        ReconcileError::InvalidClaim(_) => warn!(error = %e, "claim rejected"),
        ReconcileError::Persistence(p @ PersistenceError::CorruptedRecord { .. }) => {
            if let Some((field, kind)) = p.corruption() {
                error!(
                    field = %field,
                    kind = %kind,
                    "stored identity could not be decrypted; key may have rotated"
                );
            }
        }
        ReconcileError::Persistence(_) => error!(error = %e, "identity storage failed"),
        ReconcileError::Cipher(_) => error!(error = %e, "identity reconciliation failed"),
    }
}
