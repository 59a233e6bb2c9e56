//! Payment scheme engines.
//!
//! One engine per scheme and network: [`TransferEngine`] moves native SOL,
//! [`SplEngine`] moves SPL tokens. Both share the same two-operation
//! contract: a pure `verify` that never touches the chain, and a `settle`
//! that re-verifies, probes for an already-landed signature, and otherwise
//! rebuilds and submits the client-signed transfer.

pub mod spl;
pub mod transfer;

pub use spl::SplEngine;
pub use transfer::TransferEngine;

use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::v0::Message as MessageV0;
use solana_sdk::message::VersionedMessage;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::str::FromStr;

use crate::chain::ChainError;
use crate::facilitator::ErrorReason;
use crate::timestamp::UnixMillis;

/// Replay window: payloads older than five minutes are rejected.
pub const FRESHNESS_WINDOW_MS: u64 = 5 * 60 * 1000;

/// base58 length bounds of an ed25519 transaction signature.
const SIGNATURE_BASE58_MIN: usize = 87;
const SIGNATURE_BASE58_MAX: usize = 88;

/// Outcome of a successful settlement.
#[derive(Debug, Clone)]
pub struct Settlement {
    /// Signature of the landed transaction.
    pub signature: Signature,
    /// Confirmation count when the settlement took the idempotent path.
    pub confirmations: Option<u64>,
}

/// A settlement failure: the rejection reason plus, when the transaction was
/// already submitted, the signature of the attempt.
#[derive(Debug, Clone)]
pub struct SettleFailure {
    pub reason: ErrorReason,
    pub tx_hash: Option<Signature>,
}

impl From<ErrorReason> for SettleFailure {
    fn from(reason: ErrorReason) -> Self {
        Self {
            reason,
            tx_hash: None,
        }
    }
}

impl SettleFailure {
    pub(crate) fn from_chain(error: &ChainError) -> Self {
        Self {
            reason: chain_reason(error),
            tx_hash: None,
        }
    }
}

pub(crate) fn chain_reason(error: &ChainError) -> ErrorReason {
    match error {
        ChainError::ConfirmationTimeout => ErrorReason::ConfirmationTimeout,
        ChainError::Rejected(_) => ErrorReason::TransactionRejected,
        ChainError::Transport(_) | ChainError::NotAMint(_) => ErrorReason::ChainRpcError,
    }
}

/// Parses a transaction signature, rejecting anything outside the base58
/// length of an ed25519 signature.
pub(crate) fn parse_signature(signature: &str) -> Result<Signature, ErrorReason> {
    if !(SIGNATURE_BASE58_MIN..=SIGNATURE_BASE58_MAX).contains(&signature.len()) {
        return Err(ErrorReason::InvalidSignature);
    }
    Signature::from_str(signature).map_err(|_| ErrorReason::InvalidSignature)
}

pub(crate) fn parse_payer(from: &str) -> Result<Pubkey, ErrorReason> {
    Pubkey::from_str(from).map_err(|_| ErrorReason::InvalidAddress)
}

/// Parses a payload amount: a decimal string of atomic units.
pub(crate) fn parse_amount(amount: &str) -> Result<u64, ErrorReason> {
    amount.parse::<u64>().map_err(|_| ErrorReason::InvalidAmount)
}

/// Enforces the replay window. The boundary value passes; timestamps in the
/// future count as fresh.
pub(crate) fn assert_fresh(timestamp: UnixMillis, now: UnixMillis) -> Result<(), ErrorReason> {
    if now.saturating_since(timestamp) > FRESHNESS_WINDOW_MS {
        return Err(ErrorReason::PayloadExpired);
    }
    Ok(())
}

/// Rebuilds the transaction the payer signed: same fee payer and instruction
/// sequence, a current blockhash, and the payer's signature attached
/// verbatim. The signature vector is taken as-is, never re-checked, so a
/// partially signed transaction serializes and submits unchanged.
pub(crate) fn presigned_transaction(
    fee_payer: &Pubkey,
    instructions: &[Instruction],
    signature: Signature,
    blockhash: Hash,
) -> Result<VersionedTransaction, ErrorReason> {
    let message = MessageV0::try_compile(fee_payer, instructions, &[], blockhash)
        .map_err(|_| ErrorReason::TransactionRejected)?;
    Ok(VersionedTransaction {
        signatures: vec![signature],
        message: VersionedMessage::V0(message),
    })
}
