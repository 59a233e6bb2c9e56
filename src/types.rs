//! Wire types for the x402 protocol as served by this facilitator.
//!
//! The key objects are [`PaymentRequirements`] (the resource server's
//! published terms), [`PaymentPayload`] (the client's signed payment carried
//! base64-encoded in the `X-Payment` header), and the response bodies of the
//! `/verify` and `/settle` endpoints. Serialization is camelCase JSON,
//! compatible with the TypeScript and Go x402 client SDKs.
//!
//! Payload amounts are decimal strings of atomic units (lamports for SOL,
//! mint-scaled units for SPL tokens); requirement amounts are human-readable
//! decimals scaled by the facilitator.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use std::fmt;
use std::fmt::Display;
use std::str::FromStr;

use crate::facilitator::ErrorReason;
use crate::network::Network;
use crate::timestamp::UnixMillis;
use crate::util::money_amount::MoneyAmount;

/// The asset name designating native SOL in payment requirements.
pub const SOL_ASSET: &str = "SOL";

/// Lamports per SOL, as a decimal precision. 1 SOL = 10^9 lamports.
pub const SOL_DECIMALS: u8 = 9;

/// Represents the protocol version. Currently only version 1 is supported.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum X402Version {
    V1,
}

#[derive(Debug, thiserror::Error)]
#[error("Unsupported x402Version: {0}")]
pub struct X402VersionError(pub u8);

impl TryFrom<u8> for X402Version {
    type Error = X402VersionError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(X402Version::V1),
            other => Err(X402VersionError(other)),
        }
    }
}

impl From<X402Version> for u8 {
    fn from(_: X402Version) -> Self {
        1
    }
}

impl Serialize for X402Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for X402Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let num = u8::deserialize(deserializer)?;
        X402Version::try_from(num).map_err(DeError::custom)
    }
}

/// Enumerates payment schemes: a native SOL transfer or an SPL token
/// transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    #[serde(rename = "solana-transfer")]
    Transfer,
    #[serde(rename = "solana-spl")]
    Spl,
}

impl Scheme {
    /// Wire-format name of the scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Transfer => "solana-transfer",
            Scheme::Spl => "solana-spl",
        }
    }
}

impl Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a scheme name is not recognized.
#[derive(Debug, thiserror::Error)]
#[error("Unknown scheme: {0}")]
pub struct UnknownScheme(pub String);

impl FromStr for Scheme {
    type Err = UnknownScheme;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "solana-transfer" => Ok(Scheme::Transfer),
            "solana-spl" => Ok(Scheme::Spl),
            other => Err(UnknownScheme(other.to_string())),
        }
    }
}

/// Scheme-specific payload of a native SOL transfer.
///
/// `from`, `signature`, and `amount` stay strings at the wire level; the
/// scheme engine parses them in a fixed order so the most specific rejection
/// reason wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPayload {
    /// Payer wallet, base58.
    pub from: String,
    /// Signature of the client-signed transaction, base58.
    pub signature: String,
    /// Transfer amount in lamports, as a decimal string.
    pub amount: String,
    /// Payload creation time, Unix milliseconds.
    pub timestamp: UnixMillis,
    /// Client-chosen nonce. Carried but not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Scheme-specific payload of an SPL token transfer.
///
/// Extends the native transfer shape with the mint and the two token
/// accounts; `amount` is in the mint's atomic units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplPayload {
    /// Payer wallet, base58.
    pub from: String,
    /// Signature of the client-signed transaction, base58.
    pub signature: String,
    /// Transfer amount in the mint's atomic units, as a decimal string.
    pub amount: String,
    /// Payload creation time, Unix milliseconds.
    pub timestamp: UnixMillis,
    /// Client-chosen nonce. Carried but not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Token mint, base58.
    pub mint: String,
    /// Payer's token account, base58.
    pub from_token_account: String,
    /// Recipient's token account, base58.
    pub to_token_account: String,
}

/// Scheme-specific payload, discriminated by the envelope's `scheme` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SchemePayload {
    Transfer(TransferPayload),
    Spl(SplPayload),
}

/// Describes a signed request to transfer funds on-chain: the envelope
/// carried inside the `X-Payment` header.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    pub x402_version: X402Version,
    pub scheme: Scheme,
    pub network: Network,
    pub payload: SchemePayload,
}

/// Envelope as it appears on the wire, before the scheme dispatch.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPaymentPayload {
    x402_version: u8,
    scheme: String,
    network: String,
    payload: serde_json::Value,
}

/// Decoding failures of the `X-Payment` header.
///
/// Decoding is total-failing: malformed base64, JSON, or payload shape all
/// collapse into [`PaymentHeaderError::InvalidPayload`]; a well-formed
/// envelope with an unknown discriminant gets the more specific reason.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PaymentHeaderError {
    #[error("Invalid payment payload")]
    InvalidPayload,
    #[error("Unknown payment scheme: {0}")]
    UnknownScheme(String),
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),
    #[error("Unsupported x402 version: {0}")]
    UnsupportedVersion(u8),
}

impl From<PaymentHeaderError> for ErrorReason {
    fn from(value: PaymentHeaderError) -> Self {
        match value {
            PaymentHeaderError::InvalidPayload => ErrorReason::InvalidPayload,
            PaymentHeaderError::UnknownScheme(_) => ErrorReason::InvalidScheme,
            PaymentHeaderError::UnknownNetwork(_) => ErrorReason::InvalidNetwork,
            PaymentHeaderError::UnsupportedVersion(_) => ErrorReason::UnsupportedX402Version,
        }
    }
}

impl TryFrom<RawPaymentPayload> for PaymentPayload {
    type Error = PaymentHeaderError;

    fn try_from(raw: RawPaymentPayload) -> Result<Self, Self::Error> {
        let x402_version = X402Version::try_from(raw.x402_version)
            .map_err(|e| PaymentHeaderError::UnsupportedVersion(e.0))?;
        let scheme = raw
            .scheme
            .parse::<Scheme>()
            .map_err(|e| PaymentHeaderError::UnknownScheme(e.0))?;
        let network = raw
            .network
            .parse::<Network>()
            .map_err(|e| PaymentHeaderError::UnknownNetwork(e.0))?;
        let payload = match scheme {
            Scheme::Transfer => serde_json::from_value::<TransferPayload>(raw.payload)
                .map(SchemePayload::Transfer)
                .map_err(|_| PaymentHeaderError::InvalidPayload)?,
            Scheme::Spl => serde_json::from_value::<SplPayload>(raw.payload)
                .map(SchemePayload::Spl)
                .map_err(|_| PaymentHeaderError::InvalidPayload)?,
        };
        Ok(PaymentPayload {
            x402_version,
            scheme,
            network,
            payload,
        })
    }
}

impl<'de> Deserialize<'de> for PaymentPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawPaymentPayload::deserialize(deserializer)?;
        raw.try_into().map_err(DeError::custom)
    }
}

/// The `X-Payment` header value: standard padded base64 over the UTF-8 JSON
/// of a [`PaymentPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentHeader(String);

impl PaymentHeader {
    /// Serialize and base64-encode a payment payload.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be rendered as
    /// JSON, which does not happen for well-formed payloads.
    pub fn encode(payload: &PaymentPayload) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(payload)?;
        Ok(Self(BASE64.encode(json)))
    }

    /// Decode the header back into a payment payload.
    ///
    /// # Errors
    ///
    /// Fails with [`PaymentHeaderError::InvalidPayload`] on any base64, JSON,
    /// or shape error; unknown scheme/network discriminants and foreign
    /// versions produce their specific variants. No partial parse is ever
    /// exposed.
    pub fn decode(&self) -> Result<PaymentPayload, PaymentHeaderError> {
        let bytes = BASE64
            .decode(self.0.as_bytes())
            .map_err(|_| PaymentHeaderError::InvalidPayload)?;
        let raw: RawPaymentPayload =
            serde_json::from_slice(&bytes).map_err(|_| PaymentHeaderError::InvalidPayload)?;
        raw.try_into()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for PaymentHeader {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for PaymentHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Optional requirement hints: fee delegation, priority fee, memo.
///
/// `feePayer` is reserved for a fee-delegation mode this facilitator does not
/// run; it is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementExtra {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_payer: Option<String>,
    /// Priority fee hint in lamports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_fee: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// Requirements set by the resource server for an acceptable payment:
/// scheme, network, minimum amount, recipient, asset, and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: Scheme,
    pub network: Network,
    /// Minimum acceptable amount in human-readable units, e.g. `"0.01"`.
    pub max_amount_required: String,
    /// URL path being paid for. Informational.
    pub resource: String,
    pub description: String,
    pub mime_type: String,
    #[serde(default)]
    pub output_schema: Option<serde_json::Value>,
    /// Recipient wallet, base58.
    pub pay_to: String,
    /// Suggested client-side timeout in seconds.
    pub max_timeout_seconds: u64,
    /// `"SOL"` for native transfers, a base58 mint for SPL transfers.
    pub asset: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<RequirementExtra>,
}

/// The asset a requirement charges in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    /// Native SOL, paid in lamports.
    Sol,
    /// An SPL token mint.
    Mint(Pubkey),
}

/// A [`PaymentRequirements`] whose cross-field invariants have been checked
/// and whose addresses and amount are parsed. This is what the scheme
/// engines consume.
#[derive(Debug, Clone)]
pub struct ValidRequirement {
    pub scheme: Scheme,
    pub network: Network,
    pub amount: MoneyAmount,
    pub pay_to: Pubkey,
    pub asset: Asset,
    pub max_timeout_seconds: u64,
    pub extra: RequirementExtra,
}

impl PaymentRequirements {
    /// Enforces the requirement invariants and parses the validated fields.
    ///
    /// Checks, with a distinct reason per failure: `payTo` is a valid public
    /// key; the asset is named and consistent with the scheme (`SOL` for
    /// native transfers, a valid mint otherwise); the amount parses to a
    /// positive decimal. Performs no network I/O.
    ///
    /// # Errors
    ///
    /// Returns the [`ErrorReason`] of the first violated invariant.
    pub fn validate(&self) -> Result<ValidRequirement, ErrorReason> {
        let pay_to = Pubkey::from_str(&self.pay_to).map_err(|_| ErrorReason::InvalidPayTo)?;
        if self.asset.is_empty() {
            return Err(ErrorReason::MissingAsset);
        }
        let asset = match (self.scheme, self.asset.as_str()) {
            (Scheme::Transfer, SOL_ASSET) => Asset::Sol,
            (Scheme::Transfer, _) => return Err(ErrorReason::InvalidAssetScheme),
            (Scheme::Spl, SOL_ASSET) => return Err(ErrorReason::InvalidAssetScheme),
            (Scheme::Spl, mint) => Asset::Mint(
                Pubkey::from_str(mint).map_err(|_| ErrorReason::InvalidAssetScheme)?,
            ),
        };
        let amount =
            MoneyAmount::parse(&self.max_amount_required).map_err(|_| ErrorReason::InvalidAmount)?;
        Ok(ValidRequirement {
            scheme: self.scheme,
            network: self.network,
            amount,
            pay_to,
            asset,
            max_timeout_seconds: self.max_timeout_seconds,
            extra: self.extra.clone().unwrap_or_default(),
        })
    }
}

impl ValidRequirement {
    /// Minimum acceptable transfer in atomic units at the given precision.
    pub fn atomic_amount(&self, decimals: u8) -> Result<u64, ErrorReason> {
        self.amount
            .atomic(decimals)
            .map_err(|_| ErrorReason::InvalidAmount)
    }

    /// The required mint for SPL requirements, `None` for native SOL.
    pub fn mint(&self) -> Option<&Pubkey> {
        match &self.asset {
            Asset::Mint(mint) => Some(mint),
            Asset::Sol => None,
        }
    }
}

/// Body of `POST /verify` and `POST /settle`: the version, the opaque
/// payment header, and the requirement it must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub x402_version: u8,
    pub payment_header: PaymentHeader,
    pub payment_requirements: PaymentRequirements,
}

/// Wrapper for a payment header and requirements sent for settlement.
pub type SettleRequest = VerifyRequest;

/// Returned after verifying a payment header against requirements.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub is_valid: bool,
    pub invalid_reason: Option<ErrorReason>,
}

impl VerifyResponse {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            invalid_reason: None,
        }
    }

    pub fn invalid(reason: ErrorReason) -> Self {
        Self {
            is_valid: false,
            invalid_reason: Some(reason),
        }
    }
}

/// Returned after attempting to settle a payment on-chain.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleResponse {
    pub success: bool,
    pub error: Option<ErrorReason>,
    pub tx_hash: Option<String>,
    pub network_id: Option<Network>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
}

impl SettleResponse {
    pub fn settled(tx_hash: String, network: Network, confirmations: Option<u64>) -> Self {
        Self {
            success: true,
            error: None,
            tx_hash: Some(tx_hash),
            network_id: Some(network),
            confirmations,
        }
    }

    pub fn failed(reason: ErrorReason, tx_hash: Option<String>, network: Option<Network>) -> Self {
        Self {
            success: false,
            error: Some(reason),
            tx_hash,
            network_id: network,
            confirmations: None,
        }
    }
}

/// One supported (scheme, network) pair, as listed by `GET /supported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SupportedPaymentKind {
    pub scheme: Scheme,
    pub network: Network,
}

/// Body of `GET /supported`.
#[derive(Debug, Serialize)]
pub struct SupportedResponse {
    pub kinds: Vec<SupportedPaymentKind>,
}

/// Body of `GET /transaction/{signature}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusResponse {
    pub confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A simple error structure returned on malformed requests and internal
/// failures, when no structured protocol-level response applies.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
}
