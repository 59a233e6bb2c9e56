//! Facilitator implementation backed by per-network scheme engines.
//!
//! [`FacilitatorLocal`] owns the fixed `scheme → network → engine` registry
//! built at startup, routes each request to the right engine, and resolves
//! SPL mint decimals through a process-wide cache seeded with the known USDC
//! deployments.
//!
//! Payment rejections never surface as errors here: they are folded into the
//! response bodies, and the HTTP layer returns them with status 200. The
//! error type is reserved for malformed status queries and RPC faults.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::instrument;

use crate::chain::{ChainError, SolanaRpc, SolanaRpcOps};
use crate::facilitator::{ErrorReason, Facilitator};
use crate::network::{Network, UsdcDeployment};
use crate::scheme::{SplEngine, TransferEngine};
use crate::types::{
    PaymentPayload, Scheme, SchemePayload, SettleRequest, SettleResponse, SupportedPaymentKind,
    SupportedResponse, TransactionStatusResponse, ValidRequirement, VerifyRequest, VerifyResponse,
    X402Version,
};

/// Decimals assumed when a mint cannot be resolved.
const FALLBACK_DECIMALS: u8 = 9;

/// Internal failures of [`FacilitatorLocal`]. Payment rejections are not
/// errors; see the module docs.
#[derive(Debug, thiserror::Error)]
pub enum FacilitatorLocalError {
    /// The requested network has no registered engines.
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(Network),
    /// The transaction signature of a status query did not parse.
    #[error("Invalid transaction signature: {0}")]
    InvalidSignature(String),
    /// The chain adapter failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Both engines of one network, sharing a single RPC adapter.
struct NetworkEngines<P> {
    adapter: Arc<P>,
    transfer: TransferEngine<Arc<P>>,
    spl: SplEngine<Arc<P>>,
}

/// A concrete [`Facilitator`] that verifies and settles payments against the
/// chain through per-network adapters.
///
/// Generic over the adapter so tests can substitute an in-memory chain; the
/// default is the real [`SolanaRpc`].
pub struct FacilitatorLocal<P = SolanaRpc> {
    networks: HashMap<Network, NetworkEngines<P>>,
    decimals_cache: DashMap<(Network, Pubkey), u8>,
}

/// A request that passed routing: engines selected, requirement validated,
/// header decoded.
struct RoutedPayment<'a, P> {
    engines: &'a NetworkEngines<P>,
    requirement: ValidRequirement,
    payload: PaymentPayload,
}

impl<P> FacilitatorLocal<P>
where
    P: SolanaRpcOps + Send + Sync,
{
    /// Builds the engine registry from one adapter per network and seeds the
    /// decimals cache with the known USDC deployments. The registry is fixed
    /// for the lifetime of the process.
    pub fn new(adapters: HashMap<Network, P>) -> Self {
        let mut networks = HashMap::new();
        for (network, adapter) in adapters {
            let adapter = Arc::new(adapter);
            networks.insert(
                network,
                NetworkEngines {
                    transfer: TransferEngine::new(Arc::clone(&adapter), network),
                    spl: SplEngine::new(Arc::clone(&adapter), network),
                    adapter,
                },
            );
        }
        let decimals_cache = DashMap::new();
        for usdc in UsdcDeployment::known() {
            decimals_cache.insert((usdc.network, usdc.mint), usdc.decimals);
        }
        Self {
            networks,
            decimals_cache,
        }
    }

    fn engines(&self, network: Network) -> Option<&NetworkEngines<P>> {
        self.networks.get(&network)
    }

    /// Resolves the decimal precision of a mint: cache first, then the chain,
    /// then a warned fallback. Entries are never evicted.
    async fn resolve_decimals(&self, network: Network, mint: &Pubkey, adapter: &Arc<P>) -> u8 {
        if let Some(decimals) = self.decimals_cache.get(&(network, *mint)) {
            return *decimals;
        }
        match adapter.get_mint_info(mint).await {
            Ok(info) => {
                self.decimals_cache.insert((network, *mint), info.decimals);
                info.decimals
            }
            Err(error) => {
                tracing::warn!(
                    %mint,
                    %network,
                    %error,
                    "Mint lookup failed, assuming {FALLBACK_DECIMALS} decimals"
                );
                FALLBACK_DECIMALS
            }
        }
    }

    /// Shared routing for `/verify` and `/settle`: version gate, requirement
    /// validation, header decode, scheme/network match, engine lookup.
    fn route<'a>(&'a self, request: &VerifyRequest) -> Result<RoutedPayment<'a, P>, ErrorReason> {
        X402Version::try_from(request.x402_version)
            .map_err(|_| ErrorReason::UnsupportedX402Version)?;
        let requirement = request.payment_requirements.validate()?;
        let payload = request.payment_header.decode().map_err(ErrorReason::from)?;
        if payload.scheme != requirement.scheme {
            return Err(ErrorReason::SchemeMismatch);
        }
        if payload.network != requirement.network {
            return Err(ErrorReason::NetworkMismatch);
        }
        let engines = self
            .engines(requirement.network)
            .ok_or(ErrorReason::UnsupportedNetwork)?;
        Ok(RoutedPayment {
            engines,
            requirement,
            payload,
        })
    }
}

impl<P> Facilitator for FacilitatorLocal<P>
where
    P: SolanaRpcOps + Send + Sync,
{
    type Error = FacilitatorLocalError;

    #[instrument(skip_all)]
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, Self::Error> {
        let routed = match self.route(request) {
            Ok(routed) => routed,
            Err(reason) => return Ok(VerifyResponse::invalid(reason)),
        };
        let outcome = match &routed.payload.payload {
            SchemePayload::Transfer(payload) => routed
                .engines
                .transfer
                .verify(payload, &routed.requirement)
                .map(|_| ()),
            SchemePayload::Spl(payload) => match routed.requirement.mint() {
                Some(mint) => {
                    let mint = *mint;
                    let decimals = self
                        .resolve_decimals(routed.requirement.network, &mint, &routed.engines.adapter)
                        .await;
                    routed
                        .engines
                        .spl
                        .verify(payload, &routed.requirement, decimals)
                        .map(|_| ())
                }
                None => Err(ErrorReason::InvalidAssetScheme),
            },
        };
        Ok(match outcome {
            Ok(()) => VerifyResponse::valid(),
            Err(reason) => {
                tracing::debug!(code = reason.code(), "Payment verification rejected");
                VerifyResponse::invalid(reason)
            }
        })
    }

    #[instrument(skip_all)]
    async fn settle(&self, request: &SettleRequest) -> Result<SettleResponse, Self::Error> {
        let routed = match self.route(request) {
            Ok(routed) => routed,
            Err(reason) => return Ok(SettleResponse::failed(reason, None, None)),
        };
        let network = routed.requirement.network;
        let result = match &routed.payload.payload {
            SchemePayload::Transfer(payload) => {
                routed
                    .engines
                    .transfer
                    .settle(payload, &routed.requirement)
                    .await
            }
            SchemePayload::Spl(payload) => match routed.requirement.mint() {
                Some(mint) => {
                    let mint = *mint;
                    let decimals = self
                        .resolve_decimals(network, &mint, &routed.engines.adapter)
                        .await;
                    routed
                        .engines
                        .spl
                        .settle(payload, &routed.requirement, decimals)
                        .await
                }
                None => Err(ErrorReason::InvalidAssetScheme.into()),
            },
        };
        Ok(match result {
            Ok(settlement) => {
                tracing::info!(signature = %settlement.signature, %network, "Payment settled");
                SettleResponse::settled(
                    settlement.signature.to_string(),
                    network,
                    settlement.confirmations,
                )
            }
            Err(failure) => {
                tracing::warn!(code = failure.reason.code(), %network, "Settlement failed");
                SettleResponse::failed(
                    failure.reason,
                    failure.tx_hash.map(|signature| signature.to_string()),
                    Some(network),
                )
            }
        })
    }

    async fn supported(&self) -> Result<SupportedResponse, Self::Error> {
        let mut networks: Vec<Network> = self.networks.keys().copied().collect();
        networks.sort_by_key(|network| network.as_str());
        let mut kinds = Vec::with_capacity(networks.len() * 2);
        for network in networks {
            for scheme in [Scheme::Transfer, Scheme::Spl] {
                kinds.push(SupportedPaymentKind { scheme, network });
            }
        }
        Ok(SupportedResponse { kinds })
    }

    #[instrument(skip_all, fields(%network))]
    async fn transaction_status(
        &self,
        network: Network,
        signature: &str,
    ) -> Result<TransactionStatusResponse, Self::Error> {
        let engines = self
            .engines(network)
            .ok_or(FacilitatorLocalError::UnsupportedNetwork(network))?;
        let signature = Signature::from_str(signature)
            .map_err(|_| FacilitatorLocalError::InvalidSignature(signature.to_string()))?;
        match engines.adapter.get_signature_status(&signature).await? {
            Some(status) => Ok(TransactionStatusResponse {
                confirmed: status.confirmed && status.err.is_none(),
                confirmations: status.confirmations,
                error: status.err,
            }),
            None => Ok(TransactionStatusResponse {
                confirmed: false,
                confirmations: None,
                error: Some("Transaction not found".to_string()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::MockChain;
    use crate::timestamp::UnixMillis;
    use crate::types::{
        PaymentHeader, PaymentRequirements, SOL_ASSET, SplPayload, TransferPayload,
    };
    use spl_associated_token_account::get_associated_token_address;
    use std::sync::atomic::Ordering;

    /// USDC devnet mint, pre-seeded in the decimals cache.
    const USDC_DEVNET: &str = "4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU";

    fn facilitator(chain: MockChain) -> FacilitatorLocal<MockChain> {
        let mut adapters = HashMap::new();
        adapters.insert(Network::Devnet, chain);
        FacilitatorLocal::new(adapters)
    }

    fn sol_requirements(pay_to: Pubkey) -> PaymentRequirements {
        PaymentRequirements {
            scheme: Scheme::Transfer,
            network: Network::Devnet,
            max_amount_required: "0.01".to_string(),
            resource: "/api/premium".to_string(),
            description: String::new(),
            mime_type: "application/json".to_string(),
            output_schema: None,
            pay_to: pay_to.to_string(),
            max_timeout_seconds: 60,
            asset: SOL_ASSET.to_string(),
            extra: None,
        }
    }

    fn sol_header(amount: &str) -> PaymentHeader {
        let payload = PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Transfer,
            network: Network::Devnet,
            payload: SchemePayload::Transfer(TransferPayload {
                from: Pubkey::new_unique().to_string(),
                signature: Signature::new_unique().to_string(),
                amount: amount.to_string(),
                timestamp: UnixMillis::now(),
                nonce: None,
            }),
        };
        PaymentHeader::encode(&payload).unwrap()
    }

    fn verify_request(header: PaymentHeader, requirements: PaymentRequirements) -> VerifyRequest {
        VerifyRequest {
            x402_version: 1,
            payment_header: header,
            payment_requirements: requirements,
        }
    }

    #[tokio::test]
    async fn happy_sol_verify_and_settle() {
        let facilitator = facilitator(MockChain::default());
        let request = verify_request(sol_header("10000000"), sol_requirements(Pubkey::new_unique()));

        let verify = facilitator.verify(&request).await.unwrap();
        assert!(verify.is_valid);
        assert!(verify.invalid_reason.is_none());

        let settle = facilitator.settle(&request).await.unwrap();
        assert!(settle.success);
        assert_eq!(settle.network_id, Some(Network::Devnet));
        let tx_hash = settle.tx_hash.clone().unwrap();

        // Settling the same header again lands on the idempotent path and
        // reports the same transaction.
        let again = facilitator.settle(&request).await.unwrap();
        assert!(again.success);
        assert_eq!(again.tx_hash.unwrap(), tx_hash);
    }

    #[tokio::test]
    async fn underpayment_is_rejected_in_body() {
        let facilitator = facilitator(MockChain::default());
        let request = verify_request(sol_header("9999999"), sol_requirements(Pubkey::new_unique()));

        let verify = facilitator.verify(&request).await.unwrap();
        assert!(!verify.is_valid);
        assert_eq!(verify.invalid_reason, Some(ErrorReason::InsufficientAmount));

        let settle = facilitator.settle(&request).await.unwrap();
        assert!(!settle.success);
        assert_eq!(settle.error, Some(ErrorReason::InsufficientAmount));
        assert!(settle.tx_hash.is_none());
    }

    #[tokio::test]
    async fn foreign_version_is_rejected() {
        let facilitator = facilitator(MockChain::default());
        let mut request =
            verify_request(sol_header("10000000"), sol_requirements(Pubkey::new_unique()));
        request.x402_version = 2;
        let verify = facilitator.verify(&request).await.unwrap();
        assert_eq!(
            verify.invalid_reason,
            Some(ErrorReason::UnsupportedX402Version)
        );
    }

    #[tokio::test]
    async fn requirement_validation_runs_before_payload_checks() {
        let facilitator = facilitator(MockChain::default());
        // solana-spl with asset SOL contradicts itself; the header would
        // otherwise verify.
        let mut requirements = sol_requirements(Pubkey::new_unique());
        requirements.scheme = Scheme::Spl;
        let request = verify_request(sol_header("10000000"), requirements);
        let verify = facilitator.verify(&request).await.unwrap();
        assert_eq!(verify.invalid_reason, Some(ErrorReason::InvalidAssetScheme));
    }

    #[tokio::test]
    async fn scheme_mismatch_is_detected() {
        let facilitator = facilitator(MockChain::default());
        let mint = Pubkey::new_unique();
        let mut requirements = sol_requirements(Pubkey::new_unique());
        requirements.scheme = Scheme::Spl;
        requirements.asset = mint.to_string();
        requirements.max_amount_required = "1.00".to_string();
        // Transfer header against an SPL requirement.
        let request = verify_request(sol_header("10000000"), requirements);
        let verify = facilitator.verify(&request).await.unwrap();
        assert_eq!(verify.invalid_reason, Some(ErrorReason::SchemeMismatch));
    }

    #[tokio::test]
    async fn unconfigured_network_is_unsupported() {
        let facilitator = facilitator(MockChain::default());
        let mut requirements = sol_requirements(Pubkey::new_unique());
        requirements.network = Network::Mainnet;
        let payload = PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Transfer,
            network: Network::Mainnet,
            payload: SchemePayload::Transfer(TransferPayload {
                from: Pubkey::new_unique().to_string(),
                signature: Signature::new_unique().to_string(),
                amount: "10000000".to_string(),
                timestamp: UnixMillis::now(),
                nonce: None,
            }),
        };
        let request = verify_request(PaymentHeader::encode(&payload).unwrap(), requirements);
        let verify = facilitator.verify(&request).await.unwrap();
        assert_eq!(verify.invalid_reason, Some(ErrorReason::UnsupportedNetwork));
    }

    #[tokio::test]
    async fn malformed_header_is_invalid_payload() {
        let facilitator = facilitator(MockChain::default());
        let request = verify_request(
            PaymentHeader::from("!!not-base64".to_string()),
            sol_requirements(Pubkey::new_unique()),
        );
        let verify = facilitator.verify(&request).await.unwrap();
        assert_eq!(verify.invalid_reason, Some(ErrorReason::InvalidPayload));
    }

    #[tokio::test]
    async fn usdc_decimals_come_from_the_seeded_cache() {
        let facilitator = facilitator(MockChain::default());
        let mint = Pubkey::from_str(USDC_DEVNET).unwrap();
        let from = Pubkey::new_unique();
        let pay_to = Pubkey::new_unique();
        let mut requirements = sol_requirements(pay_to);
        requirements.scheme = Scheme::Spl;
        requirements.asset = USDC_DEVNET.to_string();
        requirements.max_amount_required = "1.00".to_string();
        let payload = PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Spl,
            network: Network::Devnet,
            payload: SchemePayload::Spl(SplPayload {
                from: from.to_string(),
                signature: Signature::new_unique().to_string(),
                amount: "1000000".to_string(),
                timestamp: UnixMillis::now(),
                nonce: None,
                mint: USDC_DEVNET.to_string(),
                from_token_account: get_associated_token_address(&from, &mint).to_string(),
                to_token_account: get_associated_token_address(&pay_to, &mint).to_string(),
            }),
        };
        let request = verify_request(PaymentHeader::encode(&payload).unwrap(), requirements);

        let verify = facilitator.verify(&request).await.unwrap();
        assert!(verify.is_valid, "reason: {:?}", verify.invalid_reason);
        // The seeded cache served 6 decimals; the chain was never asked.
        let engines = facilitator.engines(Network::Devnet).unwrap();
        assert_eq!(engines.adapter.mint_lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_mint_is_resolved_once_then_cached() {
        let mint = Pubkey::new_unique();
        let facilitator = facilitator(MockChain::default().with_mint(mint, 2));
        let from = Pubkey::new_unique();
        let pay_to = Pubkey::new_unique();
        let mut requirements = sol_requirements(pay_to);
        requirements.scheme = Scheme::Spl;
        requirements.asset = mint.to_string();
        requirements.max_amount_required = "1.00".to_string();
        let payload = PaymentPayload {
            x402_version: X402Version::V1,
            scheme: Scheme::Spl,
            network: Network::Devnet,
            payload: SchemePayload::Spl(SplPayload {
                from: from.to_string(),
                signature: Signature::new_unique().to_string(),
                amount: "100".to_string(),
                timestamp: UnixMillis::now(),
                nonce: None,
                mint: mint.to_string(),
                from_token_account: get_associated_token_address(&from, &mint).to_string(),
                to_token_account: get_associated_token_address(&pay_to, &mint).to_string(),
            }),
        };
        let request = verify_request(PaymentHeader::encode(&payload).unwrap(), requirements);

        assert!(facilitator.verify(&request).await.unwrap().is_valid);
        assert!(facilitator.verify(&request).await.unwrap().is_valid);
        let engines = facilitator.engines(Network::Devnet).unwrap();
        assert_eq!(engines.adapter.mint_lookups.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn supported_lists_scheme_network_product() {
        let facilitator = facilitator(MockChain::default());
        let supported = facilitator.supported().await.unwrap();
        assert_eq!(supported.kinds.len(), 2);
        assert!(supported.kinds.iter().any(|kind| kind.scheme == Scheme::Transfer));
        assert!(supported.kinds.iter().any(|kind| kind.scheme == Scheme::Spl));
    }

    #[tokio::test]
    async fn transaction_status_reports_landed_and_unknown() {
        let signature = Signature::new_unique();
        let facilitator = facilitator(MockChain::default().with_known_transaction(signature));

        let status = facilitator
            .transaction_status(Network::Devnet, &signature.to_string())
            .await
            .unwrap();
        assert!(status.confirmed);
        assert_eq!(status.confirmations, Some(10));

        let unknown = facilitator
            .transaction_status(Network::Devnet, &Signature::new_unique().to_string())
            .await
            .unwrap();
        assert!(!unknown.confirmed);
        assert_eq!(unknown.error.as_deref(), Some("Transaction not found"));
    }

    #[tokio::test]
    async fn transaction_status_rejects_bad_signature() {
        let facilitator = facilitator(MockChain::default());
        let error = facilitator
            .transaction_status(Network::Devnet, "garbage")
            .await
            .unwrap_err();
        assert!(matches!(error, FacilitatorLocalError::InvalidSignature(_)));
    }
}
