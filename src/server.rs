//! HTTP host
//!
//! `POST /events` feeds one envelope per request into the [`EventHandler`];
//! `GET /healthz` reports liveness. An optional shared secret authenticates
//! callers with an HMAC-SHA256 body signature.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::ValidatorError;
use crate::handler::EventHandler;

/// Header carrying `sha256=<hex hmac>` of the request body
pub const SIGNATURE_HEADER: &str = "X-Signature-256";

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<EventHandler>,
    pub webhook_secret: Option<Vec<u8>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(handle_event))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn handle_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok());
        match signature {
            Some(signature) if verify_signature(secret, &body, signature) => {}
            _ => {
                warn!("Event signature verification failed.");
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "invalid signature"})),
                );
            }
        }
    }

    match state.handler.handle_slice(&body).await {
        Ok(outcome) => (StatusCode::OK, Json(json!({"status": outcome.status()}))),
        Err(err) => {
            let status = status_for(&err);
            error!(status = status.as_u16(), "Failed to handle event: {err:#}");
            (status, Json(json!({"error": err.to_string()})))
        }
    }
}

fn status_for(err: &ValidatorError) -> StatusCode {
    if err.is_decode() {
        return StatusCode::BAD_REQUEST;
    }
    match err {
        ValidatorError::Upstream(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn verify_signature(secret: &[u8], body: &[u8], signature: &str) -> bool {
    let Some(signature_hex) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(signature_hex) else {
        return false;
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
