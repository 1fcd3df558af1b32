//! HTTP endpoints of the facilitator.
//!
//! Protocol-critical: `POST /verify` and `POST /settle`. Discovery:
//! `GET /supported`, plus `GET` descriptions of the POST endpoints and a
//! `/health` alias. All bodies are JSON.
//!
//! Protocol rejections (invalid signature, unsupported scheme, ...) come
//! back as `200` with `valid: false` / `success: false`; only
//! infrastructure failures produce a 5xx.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router, response::IntoResponse};
use serde_json::json;
use std::fmt::Display;
use tracing::instrument;

use pay402::facilitator::Facilitator;
use pay402::proto;

/// Builds the facilitator's route set over any [`Facilitator`] state.
pub fn routes<A>() -> Router<A>
where
    A: Facilitator + Clone + Send + Sync + 'static,
    A::Error: Display,
{
    Router::new()
        .route("/", get(get_root))
        .route("/verify", get(get_verify_info))
        .route("/verify", post(post_verify::<A>))
        .route("/settle", get(get_settle_info))
        .route("/settle", post(post_settle::<A>))
        .route("/supported", get(get_supported::<A>))
        .route("/health", get(get_health::<A>))
}

/// `GET /`: a liveness greeting.
#[instrument(skip_all)]
async fn get_root() -> impl IntoResponse {
    let pkg_name = env!("CARGO_PKG_NAME");
    (StatusCode::OK, format!("Hello from {pkg_name}!"))
}

/// `GET /verify`: machine-readable description of `POST /verify`.
#[instrument(skip_all)]
async fn get_verify_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /settle`: machine-readable description of `POST /settle`.
#[instrument(skip_all)]
async fn get_settle_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "paymentPayload": "PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /supported`: the payment kinds this facilitator can process.
#[instrument(skip_all)]
async fn get_supported<A>(State(facilitator): State<A>) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: Display,
{
    match facilitator.supported().await {
        Ok(supported) => (StatusCode::OK, Json(json!(supported))).into_response(),
        Err(error) => internal_error(&error),
    }
}

/// `GET /health`: alias of `/supported` that exercises the full dispatch.
#[instrument(skip_all)]
async fn get_health<A>(state: State<A>) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: Display,
{
    get_supported(state).await
}

/// `POST /verify`: check a payment payload against requirements.
#[instrument(skip_all)]
async fn post_verify<A>(
    State(facilitator): State<A>,
    Json(body): Json<proto::VerifyRequest>,
) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: Display,
{
    match facilitator.verify(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(%error, "verification failed at the infrastructure level");
            internal_error(&error)
        }
    }
}

/// `POST /settle`: execute a verified payment on-chain.
#[instrument(skip_all)]
async fn post_settle<A>(
    State(facilitator): State<A>,
    Json(body): Json<proto::SettleRequest>,
) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: Display,
{
    match facilitator.settle(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(%error, "settlement failed at the infrastructure level");
            internal_error(&error)
        }
    }
}

fn internal_error<E: Display>(error: &E) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal_error", "detail": error.to_string() })),
    )
        .into_response()
}
