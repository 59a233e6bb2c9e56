//! Chain adapter: a thin capability over a Solana JSON-RPC endpoint.
//!
//! The facilitator core talks to the cluster exclusively through
//! [`SolanaRpcOps`]. The trait keeps the scheme engines testable without a
//! network and pins down the one semantic the core leans on everywhere:
//! "transaction not found" is `Ok(None)`, distinct from an RPC failure.

mod provider;

pub use provider::SolanaRpc;

use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::sync::Arc;

/// Errors produced by the chain adapter.
#[derive(thiserror::Error, Debug)]
pub enum ChainError {
    /// RPC transport failure.
    #[error(transparent)]
    Transport(Box<ClientErrorKind>),
    /// The account exists but does not hold SPL mint state.
    #[error("account {0} is not an SPL token mint")]
    NotAMint(Pubkey),
    /// The signature did not reach confirmed commitment before the deadline.
    #[error("confirmation timeout")]
    ConfirmationTimeout,
    /// The cluster reported the transaction as failed.
    #[error("transaction rejected: {0}")]
    Rejected(String),
}

impl From<ClientError> for ChainError {
    fn from(value: ClientError) -> Self {
        ChainError::Transport(Box::new(value.kind))
    }
}

/// Minimal view of a transaction already known to the cluster, as returned
/// by the idempotency probe.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    /// Slot the transaction was processed in.
    pub slot: u64,
    /// Confirmation count, `None` once rooted.
    pub confirmations: Option<u64>,
    /// On-chain execution error, if the transaction landed but failed.
    pub err: Option<String>,
}

/// Status of a signature as reported by the cluster's recent status cache.
#[derive(Debug, Clone)]
pub struct SignatureStatusRecord {
    /// Slot the transaction was processed in.
    pub slot: u64,
    /// Confirmation count, `None` once rooted.
    pub confirmations: Option<u64>,
    /// On-chain execution error, if any.
    pub err: Option<String>,
    /// Whether the signature has reached confirmed commitment.
    pub confirmed: bool,
}

/// Decimals and supply of an SPL token mint.
#[derive(Debug, Clone, Copy)]
pub struct MintInfo {
    pub decimals: u8,
    pub supply: u64,
}

/// The operations the facilitator core needs from a Solana RPC endpoint.
///
/// All methods may suspend. None of them mutates local state; the only
/// chain-mutating call is [`SolanaRpcOps::send_raw_transaction`].
pub trait SolanaRpcOps {
    /// A recent blockhash for transaction construction.
    fn latest_blockhash(&self) -> impl Future<Output = Result<Hash, ChainError>> + Send;

    /// Looks up a signature across the cluster's transaction history.
    /// `Ok(None)` means the signature is unknown; errors are transport
    /// failures only.
    fn get_transaction(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<Option<TransactionRecord>, ChainError>> + Send;

    /// Submits a serialized, pre-signed transaction. Returns the signature
    /// the node accepted; acceptance is not confirmation.
    fn send_raw_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, ChainError>> + Send;

    /// Blocks until the signature reaches confirmed commitment, failing with
    /// [`ChainError::ConfirmationTimeout`] after the adapter's deadline.
    fn confirm_transaction(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<(), ChainError>> + Send;

    /// Recent status of a signature, `Ok(None)` if unknown.
    fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<Option<SignatureStatusRecord>, ChainError>> + Send;

    /// Decimals and supply from a mint account's parsed data. Fails with
    /// [`ChainError::NotAMint`] if the account is not an SPL token mint.
    fn get_mint_info(
        &self,
        mint: &Pubkey,
    ) -> impl Future<Output = Result<MintInfo, ChainError>> + Send;

    /// Whether an account exists at confirmed commitment. Used to decide
    /// on-demand associated-token-account creation.
    fn account_exists(
        &self,
        pubkey: &Pubkey,
    ) -> impl Future<Output = Result<bool, ChainError>> + Send;
}

impl<T: SolanaRpcOps + Send + Sync> SolanaRpcOps for Arc<T> {
    fn latest_blockhash(&self) -> impl Future<Output = Result<Hash, ChainError>> + Send {
        (**self).latest_blockhash()
    }

    fn get_transaction(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<Option<TransactionRecord>, ChainError>> + Send {
        (**self).get_transaction(signature)
    }

    fn send_raw_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> impl Future<Output = Result<Signature, ChainError>> + Send {
        (**self).send_raw_transaction(transaction)
    }

    fn confirm_transaction(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<(), ChainError>> + Send {
        (**self).confirm_transaction(signature)
    }

    fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> impl Future<Output = Result<Option<SignatureStatusRecord>, ChainError>> + Send {
        (**self).get_signature_status(signature)
    }

    fn get_mint_info(
        &self,
        mint: &Pubkey,
    ) -> impl Future<Output = Result<MintInfo, ChainError>> + Send {
        (**self).get_mint_info(mint)
    }

    fn account_exists(
        &self,
        pubkey: &Pubkey,
    ) -> impl Future<Output = Result<bool, ChainError>> + Send {
        (**self).account_exists(pubkey)
    }
}
