//! Environment configuration for the facilitator server.
//!
//! Everything is resolved from environment variables with documented
//! defaults, so the server runs with zero configuration against the public
//! RPC endpoints:
//!
//! - `PORT` — listen port, default `3000`
//! - `HOST` — bind address, default `0.0.0.0`
//! - `SOLANA_MAINNET_RPC` — default `https://api.mainnet-beta.solana.com`
//! - `SOLANA_DEVNET_RPC` — default `https://api.devnet.solana.com`
//! - `SOLANA_TESTNET_RPC` — default `https://api.testnet.solana.com`
//! - `LOG_LEVEL` — tracing filter directive, read by [`crate::telemetry`]

use std::collections::HashMap;
use std::env;
use std::net::{IpAddr, SocketAddr};
use url::Url;

use crate::network::Network;

const ENV_PORT: &str = "PORT";
const ENV_HOST: &str = "HOST";
const ENV_RPC_MAINNET: &str = "SOLANA_MAINNET_RPC";
const ENV_RPC_DEVNET: &str = "SOLANA_DEVNET_RPC";
const ENV_RPC_TESTNET: &str = "SOLANA_TESTNET_RPC";

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_RPC_MAINNET: &str = "https://api.mainnet-beta.solana.com";
const DEFAULT_RPC_DEVNET: &str = "https://api.devnet.solana.com";
const DEFAULT_RPC_TESTNET: &str = "https://api.testnet.solana.com";

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("Invalid RPC URL for {network} in {name}: {value}")]
    InvalidRpcUrl {
        network: Network,
        name: &'static str,
        value: String,
    },
}

/// Server configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    host: IpAddr,
    port: u16,
    rpc_urls: HashMap<Network, Url>,
}

impl Config {
    /// Loads the configuration, falling back to the documented defaults for
    /// every unset variable.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a set variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var(ENV_PORT) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_PORT,
                value,
            })?,
            Err(_) => DEFAULT_PORT,
        };
        let host = match env::var(ENV_HOST) {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                name: ENV_HOST,
                value,
            })?,
            Err(_) => DEFAULT_HOST.parse().expect("valid default host"),
        };
        let mut rpc_urls = HashMap::new();
        for network in Network::variants() {
            let (name, default) = match network {
                Network::Mainnet => (ENV_RPC_MAINNET, DEFAULT_RPC_MAINNET),
                Network::Devnet => (ENV_RPC_DEVNET, DEFAULT_RPC_DEVNET),
                Network::Testnet => (ENV_RPC_TESTNET, DEFAULT_RPC_TESTNET),
            };
            let value = env::var(name).unwrap_or_else(|_| default.to_string());
            let url = Url::parse(&value).map_err(|_| ConfigError::InvalidRpcUrl {
                network: *network,
                name,
                value,
            })?;
            rpc_urls.insert(*network, url);
        }
        Ok(Config {
            host,
            port,
            rpc_urls,
        })
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// RPC endpoint for the given network. Every network has a default, so
    /// this never misses.
    pub fn rpc_url(&self, network: Network) -> &Url {
        self.rpc_urls
            .get(&network)
            .expect("every network has a default RPC URL")
    }
}
