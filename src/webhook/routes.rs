//! Webhook HTTP surface — verification handshake and event ingress.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::payload::{Delivery, Envelope, classify};
use crate::conversation::ConversationEngine;

/// The acknowledgment the provider expects for every accepted delivery.
/// Anything other than a prompt 2xx triggers retries from their side.
const ACK: &str = "EVENT_RECEIVED";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    pub verify_token: String,
}

/// Build the Axum router for the webhook endpoint.
pub fn webhook_routes(engine: Arc<ConversationEngine>, verify_token: String) -> Router {
    let state = AppState {
        engine,
        verify_token,
    };

    Router::new()
        .route("/webhook", get(verify).post(ingress))
        .with_state(state)
}

// ── Verification (GET) ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Echo the challenge when the subscribe handshake checks out.
///
/// Returns `None` when the mode or token is wrong — the caller responds 403.
fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    verify_token: &str,
) -> Option<String> {
    if mode? == "subscribe" && token? == verify_token {
        Some(challenge.unwrap_or_default().to_string())
    } else {
        None
    }
}

async fn verify(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    match verify_subscription(
        params.mode.as_deref(),
        params.verify_token.as_deref(),
        params.challenge.as_deref(),
        &state.verify_token,
    ) {
        Some(challenge) => {
            info!("Webhook verification succeeded");
            (StatusCode::OK, challenge).into_response()
        }
        None => {
            warn!("Webhook verification rejected");
            (
                StatusCode::FORBIDDEN,
                Json(serde_json::json!({ "error": "Forbidden" })),
            )
                .into_response()
        }
    }
}

// ── Ingress (POST) ──────────────────────────────────────────────────────

/// Handle an inbound delivery. The body is parsed defensively and the turn
/// runs to completion before the acknowledgment; read receipts are spawned
/// off the request path. The response is the fixed acknowledgment no
/// matter what happened inside.
///
/// The body is taken as raw bytes: a `String` extractor would reject
/// non-UTF-8 payloads with a 400 before this handler runs, and any non-2xx
/// makes the provider retry the delivery.
async fn ingress(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
    let envelope: Envelope = serde_json::from_slice(&body).unwrap_or_default();

    match classify(envelope) {
        Delivery::Ack => {
            debug!("Delivery acknowledged without processing");
        }
        Delivery::Turn(turn) => {
            if let Err(e) = state.engine.handle_turn(turn).await {
                warn!(error = %e, "Turn failed");
            }
        }
    }

    (StatusCode::OK, ACK)
}
