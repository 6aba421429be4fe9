//! Core chain-state types shared across the client
//!
//! These types mirror the shapes returned by the query endpoint and the
//! archive node. They are plain data: no I/O happens here.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation errors for primitive types
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("Invalid field element: {0}")]
    InvalidField(String),

    #[error("Invalid genesis timestamp: {0}")]
    InvalidTimestamp(String),
}

/// A field element, carried as its canonical decimal representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Field(String);

impl Field {
    pub fn zero() -> Self {
        Self("0".to_string())
    }

    /// Parse a decimal field element
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let trimmed = value.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TypeError::InvalidField(value.to_string()));
        }
        // Normalise leading zeros so that equal values hash equally
        let normalised = trimmed.trim_start_matches('0');
        if normalised.is_empty() {
            Ok(Self::zero())
        } else {
            Ok(Self(normalised.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == "0"
    }
}

impl Default for Field {
    fn default() -> Self {
        Self::zero()
    }
}

impl From<u64> for Field {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl TryFrom<String> for Field {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Field> for String {
    fn from(value: Field) -> Self {
        value.0
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base58-encoded account public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse and validate a base58 public key
    pub fn from_base58(value: &str) -> Result<Self, TypeError> {
        let bytes = bs58::decode(value)
            .into_vec()
            .map_err(|e| TypeError::InvalidPublicKey(format!("{}: {}", value, e)))?;
        if bytes.len() != 32 {
            return Err(TypeError::InvalidPublicKey(format!(
                "{}: expected 32 bytes, got {}",
                value,
                bytes.len()
            )));
        }
        Ok(Self(value.to_string()))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bs58::encode(bytes).into_string())
    }

    /// The all-zero key used for placeholder accounts
    pub fn empty() -> Self {
        Self::from_bytes([0u8; 32])
    }

    pub fn to_base58(&self) -> &str {
        &self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // Validated on construction, decode cannot fail for stored keys
        if let Ok(bytes) = bs58::decode(&self.0).into_vec() {
            if bytes.len() == 32 {
                out.copy_from_slice(&bytes);
            }
        }
        out
    }
}

impl TryFrom<String> for PublicKey {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_base58(&value)
    }
}

impl From<PublicKey> for String {
    fn from(value: PublicKey) -> Self {
        value.0
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token identifier; the native token is `1`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub Field);

impl TokenId {
    pub fn native() -> Self {
        Self(Field::from(1))
    }
}

impl Default for TokenId {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network identifier used for signing domain separation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkId {
    Mainnet,
    Testnet,
    Custom(String),
}

impl Default for NetworkId {
    fn default() -> Self {
        NetworkId::Testnet
    }
}

impl From<String> for NetworkId {
    fn from(value: String) -> Self {
        match value.as_str() {
            "mainnet" => NetworkId::Mainnet,
            "testnet" => NetworkId::Testnet,
            _ => NetworkId::Custom(value),
        }
    }
}

impl From<NetworkId> for String {
    fn from(value: NetworkId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkId::Mainnet => f.write_str("mainnet"),
            NetworkId::Testnet => f.write_str("testnet"),
            NetworkId::Custom(name) => f.write_str(name),
        }
    }
}

/// zkApp-specific account state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkappAccount {
    pub app_state: Vec<Field>,
    pub action_state: Vec<Field>,
    #[serde(default)]
    pub proved_state: bool,
    #[serde(default)]
    pub verification_key_hash: Option<Field>,
    #[serde(default)]
    pub zkapp_uri: String,
}

/// On-chain account state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub public_key: PublicKey,
    #[serde(default)]
    pub token_id: TokenId,
    #[serde(default)]
    pub token_symbol: String,
    pub nonce: u32,
    pub balance: u64,
    #[serde(default)]
    pub delegate: Option<PublicKey>,
    #[serde(default)]
    pub zkapp: Option<ZkappAccount>,
}

impl Account {
    /// Placeholder account handed out while the real one is not fetched yet
    pub fn dummy(public_key: PublicKey) -> Self {
        Self::new(public_key, TokenId::native(), 0)
    }

    pub fn new(public_key: PublicKey, token_id: TokenId, balance: u64) -> Self {
        Self {
            public_key,
            token_id,
            token_symbol: String::new(),
            nonce: 0,
            balance,
            delegate: None,
            zkapp: None,
        }
    }
}

/// Snapshot of the consensus-level network state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkState {
    pub blockchain_length: u32,
    pub global_slot_since_genesis: u32,
    pub total_currency: u64,
    pub min_window_density: u32,
    pub snarked_ledger_hash: Field,
}

/// Genesis constants exactly as reported by the query endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenesisConstants {
    pub genesis_timestamp: String,
    pub slot_duration: u64,
    pub account_creation_fee: u64,
}

/// Network constants resolved for this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConstants {
    /// Milliseconds since the unix epoch
    pub genesis_timestamp: u64,
    /// Slot duration in milliseconds
    pub slot_time: u64,
    pub account_creation_fee: u64,
}

pub const DEFAULT_SLOT_TIME_MS: u64 = 3 * 60 * 1000;
pub const DEFAULT_ACCOUNT_CREATION_FEE: u64 = 1_000_000_000;

impl Default for NetworkConstants {
    fn default() -> Self {
        Self {
            genesis_timestamp: 0,
            slot_time: DEFAULT_SLOT_TIME_MS,
            account_creation_fee: DEFAULT_ACCOUNT_CREATION_FEE,
        }
    }
}

impl NetworkConstants {
    pub fn from_genesis(genesis: &GenesisConstants) -> Result<Self, TypeError> {
        let timestamp = DateTime::parse_from_rfc3339(&genesis.genesis_timestamp)
            .map_err(|e| TypeError::InvalidTimestamp(format!("{}: {}", genesis.genesis_timestamp, e)))?;
        let millis = u64::try_from(timestamp.timestamp_millis())
            .map_err(|_| TypeError::InvalidTimestamp(genesis.genesis_timestamp.clone()))?;
        Ok(Self {
            genesis_timestamp: millis,
            slot_time: genesis.slot_duration,
            account_creation_fee: genesis.account_creation_fee,
        })
    }
}

/// Network state together with the genesis constants it was fetched with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub state: NetworkState,
    pub genesis: Option<GenesisConstants>,
}

/// A window over an account's action log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionStates {
    pub from_action_state: Option<Field>,
    pub end_action_state: Option<Field>,
}

impl ActionStates {
    pub fn new(from: Option<Field>, end: Option<Field>) -> Self {
        Self {
            from_action_state: from,
            end_action_state: end,
        }
    }
}

/// Actions committed under one action state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionBatch {
    pub action_state: Field,
    pub actions: Vec<Vec<String>>,
}

/// Events emitted in one block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventBatch {
    pub block_height: u32,
    pub block_hash: String,
    pub events: Vec<Vec<String>>,
}

/// Block-height window for event queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventFilter {
    pub from: Option<u32>,
    pub to: Option<u32>,
}
