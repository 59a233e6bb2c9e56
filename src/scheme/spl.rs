//! The `solana-spl` engine: SPL token payments.
//!
//! Token accounts are never taken at face value: both sides must be the
//! associated token accounts derived from `(mint, owner)`, which makes the
//! check deterministic and free of RPC calls. Settlement creates the
//! recipient's associated token account on demand.

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use spl_associated_token_account::get_associated_token_address;
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use tracing::instrument;

use crate::chain::SolanaRpcOps;
use crate::facilitator::ErrorReason;
use crate::network::Network;
use crate::scheme::{
    SettleFailure, Settlement, assert_fresh, parse_amount, parse_payer, parse_signature,
    presigned_transaction,
};
use crate::timestamp::UnixMillis;
use crate::types::{SplPayload, ValidRequirement};

/// An SPL payload that passed verification, with its fields parsed.
#[derive(Debug, Clone)]
pub struct VerifiedSplTransfer {
    pub from: Pubkey,
    pub mint: Pubkey,
    /// The payer's associated token account.
    pub source: Pubkey,
    /// The recipient's associated token account.
    pub destination: Pubkey,
    pub amount: u64,
    pub signature: Signature,
}

/// Verifies and settles SPL token transfers on one network.
pub struct SplEngine<P> {
    provider: P,
    network: Network,
}

impl<P> SplEngine<P> {
    pub fn new(provider: P, network: Network) -> Self {
        Self { provider, network }
    }

    pub fn network(&self) -> Network {
        self.network
    }
}

impl<P> SplEngine<P>
where
    P: SolanaRpcOps + Send + Sync,
{
    /// Checks an SPL transfer payload against the requirement.
    ///
    /// Pure: token decimals arrive resolved by the caller, and the token
    /// accounts are checked against locally derived associated token
    /// accounts, so no RPC is needed. Check order extends the native
    /// transfer sequence: signature, payer address, amount (at the mint's
    /// precision), freshness, mint, source account, destination account.
    ///
    /// # Errors
    ///
    /// Returns the [`ErrorReason`] of the first failed check.
    pub fn verify(
        &self,
        payload: &SplPayload,
        requirement: &ValidRequirement,
        decimals: u8,
    ) -> Result<VerifiedSplTransfer, ErrorReason> {
        let signature = parse_signature(&payload.signature)?;
        let from = parse_payer(&payload.from)?;
        let amount = parse_amount(&payload.amount)?;
        let required = requirement.atomic_amount(decimals)?;
        if amount < required {
            return Err(ErrorReason::InsufficientAmount);
        }
        assert_fresh(payload.timestamp, UnixMillis::now())?;

        let mint = *requirement.mint().ok_or(ErrorReason::InvalidAssetScheme)?;
        if payload.mint != mint.to_string() {
            return Err(ErrorReason::MintMismatch);
        }
        let source = get_associated_token_address(&from, &mint);
        if payload.from_token_account != source.to_string() {
            return Err(ErrorReason::InvalidFromTokenAccount);
        }
        let destination = get_associated_token_address(&requirement.pay_to, &mint);
        if payload.to_token_account != destination.to_string() {
            return Err(ErrorReason::InvalidToTokenAccount);
        }

        Ok(VerifiedSplTransfer {
            from,
            mint,
            source,
            destination,
            amount,
            signature,
        })
    }

    /// Settles an SPL transfer.
    ///
    /// Re-verifies, probes for the landed signature, then rebuilds the
    /// client's instruction sequence: an idempotent associated-token-account
    /// creation for the recipient when its account is missing, followed by a
    /// checked token transfer. Fee payer is the paying wallet; the client's
    /// signature is attached verbatim.
    ///
    /// # Errors
    ///
    /// Returns a [`SettleFailure`] carrying the rejection reason and, when
    /// the transaction was submitted, the signature of the attempt.
    #[instrument(skip_all, fields(network = %self.network))]
    pub async fn settle(
        &self,
        payload: &SplPayload,
        requirement: &ValidRequirement,
        decimals: u8,
    ) -> Result<Settlement, SettleFailure> {
        let verified = self.verify(payload, requirement, decimals)?;

        if let Some(record) = self
            .provider
            .get_transaction(&verified.signature)
            .await
            .map_err(|e| SettleFailure::from_chain(&e))?
        {
            return if record.err.is_none() {
                tracing::debug!(signature = %verified.signature, "Token transfer already landed");
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

        let destination_exists = self
            .provider
            .account_exists(&verified.destination)
            .await
            .map_err(|e| SettleFailure::from_chain(&e))?;
        let blockhash = self
            .provider
            .latest_blockhash()
            .await
            .map_err(|e| SettleFailure::from_chain(&e))?;

        let mut instructions: Vec<Instruction> = Vec::with_capacity(2);
        if !destination_exists {
            tracing::debug!(destination = %verified.destination, "Creating recipient token account");
            instructions.push(create_associated_token_account_idempotent(
                &verified.from,
                &requirement.pay_to,
                &verified.mint,
                &spl_token::id(),
            ));
        }
        let transfer = spl_token::instruction::transfer_checked(
            &spl_token::id(),
            &verified.source,
            &verified.mint,
            &verified.destination,
            &verified.from,
            &[],
            verified.amount,
            decimals,
        )
        .map_err(|_| SettleFailure::from(ErrorReason::TransactionRejected))?;
        instructions.push(transfer);

        let transaction =
            presigned_transaction(&verified.from, &instructions, verified.signature, blockhash)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::MockChain;
    use crate::types::{PaymentRequirements, Scheme};
    use std::sync::Arc;

    const DECIMALS: u8 = 6;

    struct Fixture {
        engine: SplEngine<Arc<MockChain>>,
        payload: SplPayload,
        requirement: ValidRequirement,
        destination: Pubkey,
    }

    fn fixture(chain: MockChain) -> Fixture {
        let from_keypair_pubkey = Pubkey::new_unique();
        let pay_to = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let source = get_associated_token_address(&from_keypair_pubkey, &mint);
        let destination = get_associated_token_address(&pay_to, &mint);
        let requirement = PaymentRequirements {
            scheme: Scheme::Spl,
            network: Network::Devnet,
            max_amount_required: "1.00".to_string(),
            resource: "/api/premium".to_string(),
            description: String::new(),
            mime_type: "application/json".to_string(),
            output_schema: None,
            pay_to: pay_to.to_string(),
            max_timeout_seconds: 60,
            asset: mint.to_string(),
            extra: None,
        }
        .validate()
        .unwrap();
        let payload = SplPayload {
            from: from_keypair_pubkey.to_string(),
            signature: Signature::new_unique().to_string(),
            amount: "1000000".to_string(),
            timestamp: UnixMillis::now(),
            nonce: None,
            mint: mint.to_string(),
            from_token_account: source.to_string(),
            to_token_account: destination.to_string(),
        };
        Fixture {
            engine: SplEngine::new(Arc::new(chain), Network::Devnet),
            payload,
            requirement,
            destination,
        }
    }

    #[test]
    fn verify_accepts_correct_token_accounts() {
        let f = fixture(MockChain::default());
        let verified = f.engine.verify(&f.payload, &f.requirement, DECIMALS).unwrap();
        assert_eq!(verified.amount, 1_000_000);
        assert_eq!(verified.destination, f.destination);
    }

    #[test]
    fn verify_rejects_mint_mismatch() {
        let f = fixture(MockChain::default());
        let mut p = f.payload.clone();
        p.mint = Pubkey::new_unique().to_string();
        assert_eq!(
            f.engine.verify(&p, &f.requirement, DECIMALS).unwrap_err(),
            ErrorReason::MintMismatch
        );
    }

    #[test]
    fn verify_rejects_wrong_source_account() {
        let f = fixture(MockChain::default());
        let mut p = f.payload.clone();
        p.from_token_account = Pubkey::new_unique().to_string();
        assert_eq!(
            f.engine.verify(&p, &f.requirement, DECIMALS).unwrap_err(),
            ErrorReason::InvalidFromTokenAccount
        );
    }

    #[test]
    fn verify_rejects_altered_destination_account() {
        let f = fixture(MockChain::default());
        let mut p = f.payload.clone();
        // Flip one character of the expected account.
        let mut altered = p.to_token_account.clone().into_bytes();
        altered[0] = if altered[0] == b'2' { b'3' } else { b'2' };
        p.to_token_account = String::from_utf8(altered).unwrap();
        assert_eq!(
            f.engine.verify(&p, &f.requirement, DECIMALS).unwrap_err(),
            ErrorReason::InvalidToTokenAccount
        );
    }

    #[test]
    fn verify_uses_token_decimals_for_amount() {
        let f = fixture(MockChain::default());
        // "1.00" at 6 decimals requires 1_000_000 atomic units.
        let mut p = f.payload.clone();
        p.amount = "999999".to_string();
        assert_eq!(
            f.engine.verify(&p, &f.requirement, DECIMALS).unwrap_err(),
            ErrorReason::InsufficientAmount
        );
        // At 9 decimals the same requirement would need a thousand times more.
        assert_eq!(
            f.engine.verify(&f.payload, &f.requirement, 9).unwrap_err(),
            ErrorReason::InsufficientAmount
        );
    }

    #[test]
    fn verify_checks_amount_before_token_accounts() {
        let f = fixture(MockChain::default());
        let mut p = f.payload.clone();
        p.amount = "1".to_string();
        p.mint = Pubkey::new_unique().to_string();
        assert_eq!(
            f.engine.verify(&p, &f.requirement, DECIMALS).unwrap_err(),
            ErrorReason::InsufficientAmount
        );
    }

    #[tokio::test]
    async fn settle_transfers_into_existing_account() {
        let f = fixture(MockChain::default());
        // Recipient account pre-exists.
        f.engine
            .provider
            .existing_accounts
            .lock()
            .unwrap()
            .insert(f.destination);
        let settlement = f
            .engine
            .settle(&f.payload, &f.requirement, DECIMALS)
            .await
            .unwrap();
        assert_eq!(settlement.signature.to_string(), f.payload.signature);
        let sent = f.engine.provider.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // Only the token transfer, no account creation.
        assert_eq!(sent[0].message.instructions().len(), 1);
    }

    #[tokio::test]
    async fn settle_creates_missing_recipient_account() {
        let f = fixture(MockChain::default());
        let settlement = f
            .engine
            .settle(&f.payload, &f.requirement, DECIMALS)
            .await
            .unwrap();
        assert_eq!(settlement.signature.to_string(), f.payload.signature);
        let sent = f.engine.provider.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // Account creation prepended before the transfer.
        assert_eq!(sent[0].message.instructions().len(), 2);
    }

    #[tokio::test]
    async fn settle_is_idempotent_for_landed_signature() {
        let f = fixture(MockChain::default());
        let signature: Signature = f.payload.signature.parse().unwrap();
        f.engine
            .provider
            .known_transactions
            .lock()
            .unwrap()
            .insert(
                signature,
                crate::chain::TransactionRecord {
                    slot: 7,
                    confirmations: Some(5),
                    err: None,
                },
            );
        let settlement = f
            .engine
            .settle(&f.payload, &f.requirement, DECIMALS)
            .await
            .unwrap();
        assert_eq!(settlement.signature, signature);
        assert_eq!(settlement.confirmations, Some(5));
        assert_eq!(f.engine.provider.sent_count(), 0);
    }

    #[tokio::test]
    async fn settle_twice_yields_same_tx_hash() {
        let f = fixture(MockChain::default());
        let first = f
            .engine
            .settle(&f.payload, &f.requirement, DECIMALS)
            .await
            .unwrap();
        let second = f
            .engine
            .settle(&f.payload, &f.requirement, DECIMALS)
            .await
            .unwrap();
        assert_eq!(first.signature, second.signature);
        assert_eq!(f.engine.provider.sent_count(), 1);
    }
}
