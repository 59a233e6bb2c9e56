//! Network definitions and known token deployments.
//!
//! This module defines the supported Solana networks and provides statically
//! known USDC deployments used to pre-seed the mint decimals cache.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Supported Solana networks.
///
/// Used to differentiate between mainnet, devnet, and testnet environments
/// for the x402 protocol. The serialized names are the wire-format network
/// identifiers carried in payment payloads and requirements.
#[derive(Debug, Hash, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    /// Solana mainnet-beta.
    #[serde(rename = "solana-mainnet")]
    Mainnet,
    /// Solana devnet.
    #[serde(rename = "solana-devnet")]
    Devnet,
    /// Solana testnet.
    #[serde(rename = "solana-testnet")]
    Testnet,
}

impl Network {
    /// Wire-format name of the network.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "solana-mainnet",
            Network::Devnet => "solana-devnet",
            Network::Testnet => "solana-testnet",
        }
    }

    /// Return all known [`Network`] variants.
    pub fn variants() -> &'static [Network] {
        &[Network::Mainnet, Network::Devnet, Network::Testnet]
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a network name is not recognized.
#[derive(Debug, thiserror::Error)]
#[error("Unknown network: {0}")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solana-mainnet" => Ok(Network::Mainnet),
            "solana-devnet" => Ok(Network::Devnet),
            "solana-testnet" => Ok(Network::Testnet),
            other => Err(UnknownNetwork(other.to_string())),
        }
    }
}

/// A known USDC deployment on a specific network.
#[derive(Clone, Debug)]
pub struct UsdcDeployment {
    /// The network the mint lives on.
    pub network: Network,
    /// The SPL token mint address.
    pub mint: Pubkey,
    /// Decimal precision of the mint.
    pub decimals: u8,
}

static USDC_MAINNET: Lazy<UsdcDeployment> = Lazy::new(|| UsdcDeployment {
    network: Network::Mainnet,
    mint: Pubkey::from_str("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v")
        .expect("valid USDC mainnet mint"),
    decimals: 6,
});

static USDC_DEVNET: Lazy<UsdcDeployment> = Lazy::new(|| UsdcDeployment {
    network: Network::Devnet,
    mint: Pubkey::from_str("4zMMC9srt5Ri5X14GAgXhaHii3GnPAEERYPJgZJDncDU")
        .expect("valid USDC devnet mint"),
    decimals: 6,
});

impl UsdcDeployment {
    /// Return the known USDC deployment for the given network, if any.
    /// There is no canonical USDC mint on testnet.
    pub fn by_network(network: Network) -> Option<&'static UsdcDeployment> {
        match network {
            Network::Mainnet => Some(&USDC_MAINNET),
            Network::Devnet => Some(&USDC_DEVNET),
            Network::Testnet => None,
        }
    }

    /// All deployments known at compile time.
    pub fn known() -> impl Iterator<Item = &'static UsdcDeployment> {
        Network::variants()
            .iter()
            .filter_map(|network| UsdcDeployment::by_network(*network))
    }
}
