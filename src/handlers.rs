//! HTTP endpoints implemented by the facilitator.
//!
//! These are the server-side handlers for processing client-submitted x402
//! payments: the protocol-critical endpoints (`/verify`, `/settle`) and the
//! discovery endpoints (`/supported`, `/health`, `/transaction/{signature}`).
//!
//! Each endpoint consumes and produces the structured JSON payloads defined
//! in [`crate::types`], compatible with the x402 client SDKs. Payment
//! verdicts, including rejections, are returned with status 200; 400 is
//! reserved for malformed requests and 500 for internal failures.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::facilitator::Facilitator;
use crate::facilitator_local::FacilitatorLocalError;
use crate::network::Network;
use crate::timestamp::UnixMillis;
use crate::types::{ErrorResponse, SettleRequest, VerifyRequest};

pub fn routes<A>() -> Router<A>
where
    A: Facilitator + Clone + Send + Sync + 'static,
    A::Error: IntoResponse,
{
    Router::new()
        .route("/", get(get_root))
        .route("/health", get(get_health))
        .route("/supported", get(get_supported::<A>))
        .route("/verify", get(get_verify_info))
        .route("/verify", post(post_verify::<A>))
        .route("/settle", get(get_settle_info))
        .route("/settle", post(post_settle::<A>))
        .route("/transaction/{signature}", get(get_transaction_status::<A>))
}

/// `GET /`: Returns a simple greeting message from the facilitator.
#[instrument(skip_all)]
pub async fn get_root() -> impl IntoResponse {
    let pkg_name = env!("CARGO_PKG_NAME");
    (StatusCode::OK, format!("Hello from {pkg_name}!"))
}

/// `GET /health`: Liveness probe.
#[instrument(skip_all)]
pub async fn get_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "timestamp": UnixMillis::now() }))
}

/// `GET /verify`: Returns a machine-readable description of the `/verify`
/// endpoint, for discoverability and debugging tools.
#[instrument(skip_all)]
pub async fn get_verify_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/verify",
        "description": "POST to verify x402 payments",
        "body": {
            "x402Version": 1,
            "paymentHeader": "base64 PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /settle`: Returns a machine-readable description of the `/settle`
/// endpoint.
#[instrument(skip_all)]
pub async fn get_settle_info() -> impl IntoResponse {
    Json(json!({
        "endpoint": "/settle",
        "description": "POST to settle x402 payments",
        "body": {
            "x402Version": 1,
            "paymentHeader": "base64 PaymentPayload",
            "paymentRequirements": "PaymentRequirements",
        }
    }))
}

/// `GET /supported`: Lists the payment schemes and networks this facilitator
/// accepts, as the Cartesian product of known schemes and configured
/// networks.
#[instrument(skip_all)]
pub async fn get_supported<A>(State(facilitator): State<A>) -> impl IntoResponse
where
    A: Facilitator,
    A::Error: IntoResponse,
{
    match facilitator.supported().await {
        Ok(supported) => (StatusCode::OK, Json(supported)).into_response(),
        Err(error) => error.into_response(),
    }
}

/// `POST /verify`: Facilitator-side verification of a proposed x402 payment.
///
/// Checks whether the payment header satisfies the declared requirements:
/// header decoding, scheme and network match, signature and address shape,
/// amount sufficiency, and payload freshness. The verdict is carried in the
/// body; rejected payments still answer 200.
#[instrument(skip_all)]
pub async fn post_verify<A>(
    State(facilitator): State<A>,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> Response
where
    A: Facilitator,
    A::Error: IntoResponse,
{
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match facilitator.verify(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "Verification failed");
            error.into_response()
        }
    }
}

/// `POST /settle`: Facilitator-side execution of a valid x402 payment
/// on-chain.
///
/// Re-verifies, then submits the payment to the cluster, taking the
/// idempotent path when the signature already landed. Typically called after
/// a successful `/verify`.
#[instrument(skip_all)]
pub async fn post_settle<A>(
    State(facilitator): State<A>,
    body: Result<Json<SettleRequest>, JsonRejection>,
) -> Response
where
    A: Facilitator,
    A::Error: IntoResponse,
{
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match facilitator.settle(&body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "Settlement failed");
            error.into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionStatusQuery {
    network: Network,
}

/// `GET /transaction/{signature}?network=…`: Confirmation status of a
/// previously settled transaction on the given network.
#[instrument(skip_all, fields(signature = %signature))]
pub async fn get_transaction_status<A>(
    State(facilitator): State<A>,
    Path(signature): Path<String>,
    query: Result<Query<TransactionStatusQuery>, QueryRejection>,
) -> Response
where
    A: Facilitator,
    A::Error: IntoResponse,
{
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => return bad_request(rejection.body_text()),
    };
    match facilitator.transaction_status(query.network, &signature).await {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "Transaction status query failed");
            error.into_response()
        }
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse { error: message }),
    )
        .into_response()
}

impl IntoResponse for FacilitatorLocalError {
    fn into_response(self) -> Response {
        let status = match &self {
            FacilitatorLocalError::UnsupportedNetwork(_)
            | FacilitatorLocalError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            FacilitatorLocalError::Chain(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
