//! Slack Events API receiver.
//!
//! Message events are acknowledged immediately and archived on a blocking
//! task, so Slack never redelivers because of a slow clone or push.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tower_http::trace::TraceLayer;

use crate::models::{Envelope, InnerEvent};
use crate::pipeline::Pipeline;

const SIGNATURE_HEADER: &str = "x-slack-signature";
const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const MAX_CLOCK_SKEW_SECS: u64 = 60 * 5;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/slack/events", post(slack_events))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "pipeline": state.pipeline.stats().snapshot(),
    }))
}

async fn slack_events(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    if let Some(secret) = state.pipeline.config().slack.signing_secret.as_deref() {
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = verify_signature(secret, &headers, &body, now) {
            tracing::warn!(error = %e, "rejecting unsigned request");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "request body is not JSON");
            return (StatusCode::BAD_REQUEST, "invalid event envelope").into_response();
        }
    };
    let envelope = match Envelope::deserialize(&payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "invalid event envelope");
            return (StatusCode::BAD_REQUEST, "invalid event envelope").into_response();
        }
    };

    match envelope {
        Envelope::UrlVerification { challenge } => {
            tracing::info!("answering url verification");
            Json(serde_json::json!({ "challenge": challenge })).into_response()
        }
        Envelope::EventCallback {
            event: InnerEvent::Message(message),
        } => {
            let pipeline = state.pipeline.clone();
            tokio::task::spawn_blocking(move || pipeline.handle(&payload, &message));
            StatusCode::OK.into_response()
        }
        Envelope::EventCallback {
            event: InnerEvent::Other,
        }
        | Envelope::Other => {
            tracing::debug!("ignoring non-message event");
            StatusCode::OK.into_response()
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing or unreadable {0} header")]
    MissingHeader(&'static str),

    #[error("request timestamp outside the accepted window")]
    Stale,

    #[error("signature mismatch")]
    Mismatch,
}

/// Check Slack's `v0` request signature over `v0:<timestamp>:<body>`.
pub fn verify_signature(
    secret: &str,
    headers: &HeaderMap,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let timestamp = header_str(headers, TIMESTAMP_HEADER)?;
    let signature = header_str(headers, SIGNATURE_HEADER)?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MissingHeader(TIMESTAMP_HEADER))?;
    if now.abs_diff(ts) > MAX_CLOCK_SKEW_SECS {
        return Err(SignatureError::Stale);
    }

    let expected = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or(SignatureError::Mismatch)?;

    signing_mac(secret, timestamp, body)
        .verify_slice(&expected)
        .map_err(|_| SignatureError::Mismatch)
}

/// `v0=<hex>` signature for a body, as Slack computes it.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mac = signing_mac(secret, timestamp, body);
    format!("v0={}", hex::encode(mac.finalize().into_bytes()))
}

fn signing_mac(secret: &str, timestamp: &str, body: &[u8]) -> Hmac<Sha256> {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    mac
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}
