//! Solana x402 facilitator HTTP entrypoint.
//!
//! This binary launches an Axum-based HTTP server exposing the x402 protocol
//! interface for payment verification and settlement on Solana networks.
//!
//! Endpoints:
//! - `GET /health` – Liveness probe
//! - `GET /supported` – Supported payment kinds (scheme and network pairs)
//! - `POST /verify` – Verify a payment header against requirements
//! - `POST /settle` – Settle an accepted payment on-chain
//! - `GET /transaction/{signature}` – Confirmation status of a settlement
//!
//! Environment:
//! - `.env` values loaded at startup
//! - `HOST`, `PORT` control the binding address
//! - `SOLANA_MAINNET_RPC`, `SOLANA_DEVNET_RPC`, `SOLANA_TESTNET_RPC`
//!   override the default public RPC endpoints
//! - `LOG_LEVEL` controls the tracing filter
//! - `OTEL_*` variables enable OpenTelemetry export

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use dotenvy::dotenv;
use std::sync::Arc;
use tower_http::cors;
use tower_http::trace::TraceLayer;

use x402_solana::chain::SolanaRpc;
use x402_solana::config::Config;
use x402_solana::facilitator_local::FacilitatorLocal;
use x402_solana::handlers;
use x402_solana::sig_down::SigDown;
use x402_solana::telemetry::Telemetry;

/// Request body size limit.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let _telemetry = Telemetry::new()
        .with_name(env!("CARGO_PKG_NAME"))
        .with_version(env!("CARGO_PKG_VERSION"))
        .register();

    let config = Config::from_env()?;
    let adapters = SolanaRpc::from_config(&config);
    let facilitator = FacilitatorLocal::new(adapters);
    let state = Arc::new(facilitator);

    let app = Router::new()
        .merge(handlers::routes().with_state(state))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES));

    let addr = config.socket_addr();
    tracing::info!("Starting facilitator at http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let sig_down = SigDown::try_new()?;
    let cancellation_token = sig_down.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancellation_token.cancelled().await })
        .await?;

    Ok(())
}
