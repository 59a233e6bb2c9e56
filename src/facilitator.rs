//! Core trait defining the verification and settlement interface of the
//! facilitator, together with the payment rejection taxonomy.
//!
//! Implementors of this trait are responsible for validating incoming payment
//! payloads against declared requirements [`Facilitator::verify`] and for
//! executing on-chain transfers [`Facilitator::settle`].

use serde::{Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use crate::network::Network;
use crate::types::{
    SettleRequest, SettleResponse, SupportedResponse, TransactionStatusResponse, VerifyRequest,
    VerifyResponse,
};

/// Asynchronous interface for x402 payment facilitators.
///
/// Implemented by any type that performs validation and settlement of payment
/// payloads. Payment rejections are carried inside the response bodies; the
/// associated `Error` type is reserved for internal failures only.
pub trait Facilitator {
    /// The internal error type returned by this facilitator.
    type Error: Debug + Display;

    /// Verifies a proposed payment payload against a [`VerifyRequest`].
    ///
    /// This checks header decoding, requirement consistency, scheme and
    /// network compatibility, signature and address shape, amount
    /// sufficiency, and payload freshness. A rejected payment is an
    /// `Ok(VerifyResponse)` with `is_valid == false`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] only on internal failures.
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send;

    /// Re-verifies and then settles a payment on-chain.
    ///
    /// A payment whose signature is already known to the cluster settles
    /// idempotently without a second submission.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] only on internal failures; on-chain failures
    /// are reported inside the [`SettleResponse`].
    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send;

    /// Lists the payment kinds (scheme and network pairs) this facilitator
    /// accepts.
    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send;

    /// Queries the confirmation status of a transaction signature on the
    /// given network.
    fn transaction_status(
        &self,
        network: Network,
        signature: &str,
    ) -> impl Future<Output = Result<TransactionStatusResponse, Self::Error>> + Send;
}

impl<T: Facilitator + Sync> Facilitator for Arc<T> {
    type Error = T::Error;

    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, Self::Error>> + Send {
        self.as_ref().verify(request)
    }

    fn settle(
        &self,
        request: &SettleRequest,
    ) -> impl Future<Output = Result<SettleResponse, Self::Error>> + Send {
        self.as_ref().settle(request)
    }

    fn supported(&self) -> impl Future<Output = Result<SupportedResponse, Self::Error>> + Send {
        self.as_ref().supported()
    }

    fn transaction_status(
        &self,
        network: Network,
        signature: &str,
    ) -> impl Future<Output = Result<TransactionStatusResponse, Self::Error>> + Send {
        self.as_ref().transaction_status(network, signature)
    }
}

/// Every way a payment can be turned down, as a stable machine-readable code
/// plus a human-readable message.
///
/// The message is what goes on the wire (`invalidReason` / `error` fields);
/// the code is for logs and programmatic matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    // ============================================
    // Decode / shape errors
    // ============================================
    /// The payment header is not valid base64 JSON of a payment payload.
    InvalidPayload,
    /// The payment scheme is not recognized.
    InvalidScheme,
    /// The network is not recognized.
    InvalidNetwork,
    /// The `payTo` recipient is not a valid Solana public key.
    InvalidPayTo,
    /// The requirement names no asset.
    MissingAsset,
    /// The asset contradicts the scheme: native transfers move `SOL`, SPL
    /// transfers move a mint.
    InvalidAssetScheme,
    /// The amount does not parse to a positive decimal, or cannot be scaled
    /// to the token's precision.
    InvalidAmount,
    /// The request carries an x402 version other than 1.
    UnsupportedX402Version,

    // ============================================
    // Verification errors
    // ============================================
    /// Payload and requirement disagree on the payment scheme.
    SchemeMismatch,
    /// Payload and requirement disagree on the network.
    NetworkMismatch,
    /// The transaction signature is not a base58 ed25519 signature.
    InvalidSignature,
    /// The payer address is not a valid Solana public key.
    InvalidAddress,
    /// The payload's mint differs from the required asset.
    MintMismatch,
    /// The source token account is not the payer's associated token account.
    InvalidFromTokenAccount,
    /// The destination token account is not the recipient's associated token
    /// account.
    InvalidToTokenAccount,
    /// The payload amount is below the required amount.
    InsufficientAmount,
    /// The payload timestamp is outside the replay window.
    PayloadExpired,

    // ============================================
    // Settlement errors
    // ============================================
    /// The submitted transaction did not reach confirmed commitment in time.
    ConfirmationTimeout,
    /// The cluster rejected the transaction, or it landed with an error.
    TransactionRejected,
    /// The RPC endpoint failed while settling.
    ChainRpcError,

    // ============================================
    // Service errors
    // ============================================
    /// No engine is registered for the requested network.
    UnsupportedNetwork,
    /// No engine is registered for the requested scheme.
    UnsupportedScheme,
}

impl ErrorReason {
    /// Stable machine-readable code.
    pub const fn code(&self) -> &'static str {
        match self {
            ErrorReason::InvalidPayload => "INVALID_PAYLOAD",
            ErrorReason::InvalidScheme => "INVALID_SCHEME",
            ErrorReason::InvalidNetwork => "INVALID_NETWORK",
            ErrorReason::InvalidPayTo => "INVALID_PAY_TO",
            ErrorReason::MissingAsset => "MISSING_ASSET",
            ErrorReason::InvalidAssetScheme => "INVALID_ASSET_SCHEME",
            ErrorReason::InvalidAmount => "INVALID_AMOUNT",
            ErrorReason::UnsupportedX402Version => "UNSUPPORTED_X402_VERSION",
            ErrorReason::SchemeMismatch => "SCHEME_MISMATCH",
            ErrorReason::NetworkMismatch => "NETWORK_MISMATCH",
            ErrorReason::InvalidSignature => "INVALID_SIGNATURE",
            ErrorReason::InvalidAddress => "INVALID_ADDRESS",
            ErrorReason::MintMismatch => "MINT_MISMATCH",
            ErrorReason::InvalidFromTokenAccount => "INVALID_FROM_TOKEN_ACCOUNT",
            ErrorReason::InvalidToTokenAccount => "INVALID_TO_TOKEN_ACCOUNT",
            ErrorReason::InsufficientAmount => "INSUFFICIENT_AMOUNT",
            ErrorReason::PayloadExpired => "PAYLOAD_EXPIRED",
            ErrorReason::ConfirmationTimeout => "CONFIRMATION_TIMEOUT",
            ErrorReason::TransactionRejected => "TRANSACTION_REJECTED",
            ErrorReason::ChainRpcError => "CHAIN_RPC_ERROR",
            ErrorReason::UnsupportedNetwork => "UNSUPPORTED_NETWORK",
            ErrorReason::UnsupportedScheme => "UNSUPPORTED_SCHEME",
        }
    }

    /// Human-readable message carried in response bodies.
    pub const fn message(&self) -> &'static str {
        match self {
            ErrorReason::InvalidPayload => "Invalid payment payload",
            ErrorReason::InvalidScheme => "Invalid payment scheme",
            ErrorReason::InvalidNetwork => "Invalid network",
            ErrorReason::InvalidPayTo => "Invalid payTo address",
            ErrorReason::MissingAsset => "Missing asset",
            ErrorReason::InvalidAssetScheme => "Asset does not match scheme",
            ErrorReason::InvalidAmount => "Invalid payment amount",
            ErrorReason::UnsupportedX402Version => "Unsupported x402 version",
            ErrorReason::SchemeMismatch => "Payment scheme mismatch",
            ErrorReason::NetworkMismatch => "Payment network mismatch",
            ErrorReason::InvalidSignature => "Invalid transaction signature",
            ErrorReason::InvalidAddress => "Invalid payer address",
            ErrorReason::MintMismatch => "Token mint mismatch",
            ErrorReason::InvalidFromTokenAccount => "Invalid from token account",
            ErrorReason::InvalidToTokenAccount => "Invalid to token account",
            ErrorReason::InsufficientAmount => "Insufficient payment amount",
            ErrorReason::PayloadExpired => "Payment payload expired",
            ErrorReason::ConfirmationTimeout => "confirmation timeout",
            ErrorReason::TransactionRejected => "Transaction rejected",
            ErrorReason::ChainRpcError => "Chain RPC error",
            ErrorReason::UnsupportedNetwork => "Unsupported network",
            ErrorReason::UnsupportedScheme => "Unsupported scheme",
        }
    }
}

impl Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl Serialize for ErrorReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.message())
    }
}
