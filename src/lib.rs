//! Solana-native implementation of the [x402 protocol](https://www.x402.org).
//!
//! The x402 protocol enables HTTP-native micropayments using the
//! `402 Payment Required` status code: a resource server advertises
//! acceptable payment terms, the client retries with a signed payment in the
//! `X-Payment` header, and a neutral **facilitator** verifies and settles
//! that payment on-chain. This crate is the facilitator.
//!
//! # Overview
//!
//! The facilitator is stateless: it holds no funds, keeps no per-payment
//! records, and derives idempotency from the chain itself — re-settling an
//! already-landed signature reports success without a second submission. Two
//! payment schemes are supported, `solana-transfer` for native SOL and
//! `solana-spl` for SPL tokens, each available on mainnet, devnet, and
//! testnet.
//!
//! # Modules
//!
//! - [`chain`] — Chain adapter over Solana JSON-RPC endpoints.
//! - [`config`] — Environment configuration with documented defaults.
//! - [`facilitator`] — The [`Facilitator`](facilitator::Facilitator) trait
//!   and the payment rejection taxonomy.
//! - [`facilitator_local`] — Reference implementation routing payments to
//!   per-network scheme engines.
//! - [`handlers`] — HTTP endpoint handlers (verify, settle, supported,
//!   transaction status).
//! - [`network`] — Supported networks and known USDC deployments.
//! - [`scheme`] — The two payment scheme engines.
//! - [`timestamp`] — Millisecond Unix timestamps for payload freshness.
//! - [`types`] — Protocol wire types, the payment header codec, and the
//!   requirement validator.
//! - [`util`] — Human-readable money amount parsing.

pub mod chain;
pub mod config;
pub mod facilitator;
pub mod facilitator_local;
pub mod handlers;
pub mod network;
pub mod scheme;
pub mod sig_down;
pub mod telemetry;
pub mod timestamp;
pub mod types;
pub mod util;
