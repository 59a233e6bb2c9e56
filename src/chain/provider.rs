use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

use crate::chain::{ChainError, MintInfo, SignatureStatusRecord, SolanaRpcOps, TransactionRecord};
use crate::config::Config;
use crate::network::Network;

/// How long a settlement waits for confirmed commitment before reporting a
/// timeout. Consistent with the 30 s request deadline of the HTTP layer.
const CONFIRM_DEADLINE: Duration = Duration::from_secs(30);

/// Poll interval while waiting for confirmation.
const CONFIRM_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Adapter over a Solana JSON-RPC endpoint for one network.
///
/// The facilitator holds one adapter per network for the lifetime of the
/// process; the underlying client is shared by both scheme engines of that
/// network. The adapter holds no keys: every transaction it submits was
/// signed by the paying client.
pub struct SolanaRpc {
    network: Network,
    rpc_client: Arc<RpcClient>,
}

impl Debug for SolanaRpc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_client.url())
            .finish()
    }
}

impl SolanaRpc {
    pub fn new(rpc_url: impl Into<String>, network: Network) -> Self {
        Self {
            network,
            rpc_client: Arc::new(RpcClient::new(rpc_url.into())),
        }
    }

    /// Builds one adapter per supported network. Every network has a default
    /// public RPC endpoint, so the full set is always available.
    pub fn from_config(config: &Config) -> HashMap<Network, SolanaRpc> {
        let mut adapters = HashMap::new();
        for network in Network::variants() {
            let url = config.rpc_url(*network);
            tracing::info!(network = %network, rpc = %url, "Using Solana RPC endpoint");
            adapters.insert(*network, SolanaRpc::new(url.as_str(), *network));
        }
        adapters
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn url(&self) -> String {
        self.rpc_client.url()
    }
}

impl SolanaRpcOps for SolanaRpc {
    async fn latest_blockhash(&self) -> Result<Hash, ChainError> {
        let blockhash = self.rpc_client.get_latest_blockhash().await?;
        Ok(blockhash)
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionRecord>, ChainError> {
        // Status-cache lookup with full history: a landed signature is what
        // matters here, not the transaction body.
        let response = self
            .rpc_client
            .get_signature_statuses_with_history(&[*signature])
            .await?;
        let status = response.value.into_iter().next().flatten();
        Ok(status.map(|status| TransactionRecord {
            slot: status.slot,
            confirmations: status.confirmations.map(|c| c as u64),
            err: status.err.map(|e| e.to_string()),
        }))
    }

    async fn send_raw_transaction(
        &self,
        transaction: &VersionedTransaction,
    ) -> Result<Signature, ChainError> {
        let signature = self
            .rpc_client
            .send_transaction_with_config(
                transaction,
                RpcSendTransactionConfig {
                    skip_preflight: true,
                    ..RpcSendTransactionConfig::default()
                },
            )
            .await?;
        Ok(signature)
    }

    async fn confirm_transaction(&self, signature: &Signature) -> Result<(), ChainError> {
        let poll = async {
            loop {
                let confirmed = self
                    .rpc_client
                    .confirm_transaction_with_commitment(signature, CommitmentConfig::confirmed())
                    .await?;
                if confirmed.value {
                    return Ok(());
                }
                tokio::time::sleep(CONFIRM_POLL_INTERVAL).await;
            }
        };
        tokio::time::timeout(CONFIRM_DEADLINE, poll)
            .await
            .map_err(|_| ChainError::ConfirmationTimeout)?
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<SignatureStatusRecord>, ChainError> {
        let response = self
            .rpc_client
            .get_signature_statuses(&[*signature])
            .await?;
        let status = response.value.into_iter().next().flatten();
        Ok(status.map(|status| SignatureStatusRecord {
            slot: status.slot,
            confirmations: status.confirmations.map(|c| c as u64),
            confirmed: status.satisfies_commitment(CommitmentConfig::confirmed()),
            err: status.err.map(|e| e.to_string()),
        }))
    }

    async fn get_mint_info(&self, mint: &Pubkey) -> Result<MintInfo, ChainError> {
        let account = self.rpc_client.get_account(mint).await?;
        if account.owner != spl_token::id() {
            return Err(ChainError::NotAMint(*mint));
        }
        let state = spl_token::state::Mint::unpack(&account.data)
            .map_err(|_| ChainError::NotAMint(*mint))?;
        Ok(MintInfo {
            decimals: state.decimals,
            supply: state.supply,
        })
    }

    async fn account_exists(&self, pubkey: &Pubkey) -> Result<bool, ChainError> {
        let response = self
            .rpc_client
            .get_account_with_commitment(pubkey, CommitmentConfig::confirmed())
            .await?;
        Ok(response.value.is_some())
    }
}
