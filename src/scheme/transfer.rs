//! The `solana-transfer` engine: native SOL payments.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::system_instruction;
use tracing::instrument;

use crate::chain::SolanaRpcOps;
use crate::facilitator::ErrorReason;
use crate::network::Network;
use crate::scheme::{
    SettleFailure, Settlement, assert_fresh, parse_amount, parse_payer, parse_signature,
    presigned_transaction,
};
use crate::timestamp::UnixMillis;
use crate::types::{SOL_DECIMALS, TransferPayload, ValidRequirement};

/// A transfer payload that passed verification, with its fields parsed.
#[derive(Debug, Clone)]
pub struct VerifiedTransfer {
    pub from: Pubkey,
    pub amount: u64,
    pub signature: Signature,
}

/// Verifies and settles native SOL transfers on one network.
pub struct TransferEngine<P> {
    provider: P,
    network: Network,
}

impl<P> TransferEngine<P> {
    pub fn new(provider: P, network: Network) -> Self {
        Self { provider, network }
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

impl<P> TransferEngine<P>
where
    P: SolanaRpcOps + Send + Sync,
{
    /// Checks a native transfer payload against the requirement.
    ///
    /// Pure: no chain I/O. Checks run in a fixed order so the most specific
    /// rejection wins: signature format, payer address, amount, freshness.
    ///
    /// # Errors
    ///
    /// Returns the [`ErrorReason`] of the first failed check.
    pub fn verify(
        &self,
        payload: &TransferPayload,
        requirement: &ValidRequirement,
    ) -> Result<VerifiedTransfer, ErrorReason> {
        let signature = parse_signature(&payload.signature)?;
        let from = parse_payer(&payload.from)?;
        let amount = parse_amount(&payload.amount)?;
        let required = requirement.atomic_amount(SOL_DECIMALS)?;
        if amount < required {
            return Err(ErrorReason::InsufficientAmount);
        }
        assert_fresh(payload.timestamp, UnixMillis::now())?;
        Ok(VerifiedTransfer {
            from,
            amount,
            signature,
        })
    }

    /// Settles a native transfer.
    ///
    /// Re-verifies, then probes the cluster for the payload's signature. A
    /// landed signature settles idempotently; a missing one is rebuilt as a
    /// single system transfer (`from → payTo`, lamports from the payload,
    /// fee payer `from`), submitted without re-signing, and awaited at
    /// confirmed commitment.
    ///
    /// # Errors
    ///
    /// Returns a [`SettleFailure`] carrying the rejection reason and, when
    /// the transaction was submitted, the signature of the attempt.
    #[instrument(skip_all, fields(network = %self.network))]
    pub async fn settle(
        &self,
        payload: &TransferPayload,
        requirement: &ValidRequirement,
    ) -> Result<Settlement, SettleFailure> {
        let verified = self.verify(payload, requirement)?;

        if let Some(record) = self
            .provider
            .get_transaction(&verified.signature)
            .await
            .map_err(|e| SettleFailure::from_chain(&e))?
        {
            return if record.err.is_none() {
                tracing::debug!(signature = %verified.signature, "Transfer already landed");
                Ok(Settlement {
                    signature: verified.signature,
                    confirmations: record.confirmations,
                })
            } else {
                Err(SettleFailure {
                    reason: ErrorReason::TransactionRejected,
                    tx_hash: Some(verified.signature),
                })
            };
        }

        let blockhash = self
            .provider
            .latest_blockhash()
            .await
            .map_err(|e| SettleFailure::from_chain(&e))?;
        let instruction =
            system_instruction::transfer(&verified.from, &requirement.pay_to, verified.amount);
        let transaction =
            presigned_transaction(&verified.from, &[instruction], verified.signature, blockhash)?;

        let signature = self
            .provider
            .send_raw_transaction(&transaction)
            .await
            .map_err(|e| SettleFailure::from_chain(&e))?;
        self.provider
            .confirm_transaction(&signature)
            .await
            .map_err(|e| SettleFailure {
                reason: super::chain_reason(&e),
                tx_hash: Some(signature),
            })?;

        Ok(Settlement {
            signature,
            confirmations: None,
        })
    }
}
