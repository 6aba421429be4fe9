//! RPC Manager Module
//!
//! Remote chain-state access: the query transport seam, the GraphQL
//! implementation with endpoint failover, the process-wide data cache and the
//! fetch coordinator that turns speculative marks into batched requests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{
    Account, ActionBatch, ActionStates, EventBatch, EventFilter, NetworkSnapshot, PublicKey,
    TokenId,
};

// Submodules
pub mod cache;
pub mod coordinator;
pub mod graphql;
pub mod rpc_config;
pub mod rpc_errors;
pub mod rpc_pool;

// Re-exports for convenience
pub use cache::{CacheEntry, DataCache};
pub use coordinator::{FetchCoordinator, FetchReport};
pub use rpc_config::HttpConfig;
pub use rpc_errors::FetchError;
pub use rpc_pool::{EndpointSet, GraphQlTransport};

/// Identity of an account within one token
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountKey {
    pub public_key: PublicKey,
    pub token_id: TokenId,
}

impl AccountKey {
    pub fn new(public_key: PublicKey, token_id: TokenId) -> Self {
        Self {
            public_key,
            token_id,
        }
    }
}

impl fmt::Display for AccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "account {} (token {})", self.public_key, self.token_id)
    }
}

/// A window of one account's action log
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionsKey {
    pub public_key: PublicKey,
    pub token_id: TokenId,
    pub action_states: ActionStates,
}

impl ActionsKey {
    pub fn new(public_key: PublicKey, token_id: TokenId, action_states: ActionStates) -> Self {
        Self {
            public_key,
            token_id,
            action_states,
        }
    }
}

impl fmt::Display for ActionsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self
            .action_states
            .from_action_state
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "start".to_string());
        let end = self
            .action_states
            .end_action_state
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "latest".to_string());
        write!(
            f,
            "actions of {} (token {}) from {} to {}",
            self.public_key, self.token_id, from, end
        )
    }
}

/// Per-account-update failure list reported by the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    /// Position in the command; 0 is the fee payer
    pub index: usize,
    pub failures: Vec<String>,
}

/// Result of a transaction-status query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    pub success: bool,
    #[serde(default)]
    pub failure_reason: Option<Vec<FailureEntry>>,
}

impl TransactionStatus {
    pub fn included() -> Self {
        Self {
            success: true,
            failure_reason: None,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn failed(failure_reason: Vec<FailureEntry>) -> Self {
        Self {
            success: false,
            failure_reason: Some(failure_reason),
        }
    }

    /// Failure entries, whenever the node recorded the command as failed
    ///
    /// A failure with only empty reason lists still counts; it is translated
    /// as an unknown rejection rather than polled again.
    pub fn reported_failures(&self) -> Option<&[FailureEntry]> {
        self.failure_reason.as_deref()
    }
}

/// Server answer to a submission
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendResponse {
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
}

impl SendResponse {
    /// Hash the node indexes the command under (`sendZkapp.zkapp.hash`)
    pub fn node_hash(&self) -> Option<&str> {
        self.data
            .as_ref()?
            .pointer("/sendZkapp/zkapp/hash")?
            .as_str()
            .filter(|hash| !hash.is_empty())
    }
}

/// Asynchronous request/response access to the query and archive endpoints
///
/// The endpoint arguments are primary endpoints; implementations may fail
/// over to fallbacks they were configured with.
#[async_trait]
pub trait QueryTransport: Send + Sync + fmt::Debug {
    /// Fetch a batch of accounts; `None` marks an account unknown on-chain.
    /// The result is aligned with `keys`.
    async fn fetch_accounts(
        &self,
        endpoint: &str,
        keys: &[AccountKey],
    ) -> Result<Vec<Option<Account>>, FetchError>;

    /// Fetch the best-tip network state and the genesis constants
    async fn fetch_network(&self, endpoint: &str) -> Result<NetworkSnapshot, FetchError>;

    /// Fetch a batch of action windows from the archive, aligned with `keys`
    async fn fetch_actions(
        &self,
        archive_endpoint: &str,
        keys: &[ActionsKey],
    ) -> Result<Vec<Vec<ActionBatch>>, FetchError>;

    async fn fetch_events(
        &self,
        archive_endpoint: &str,
        public_key: &PublicKey,
        token_id: &TokenId,
        filter: &EventFilter,
    ) -> Result<Vec<EventBatch>, FetchError>;

    async fn send_transaction(
        &self,
        endpoint: &str,
        command: &serde_json::Value,
    ) -> Result<SendResponse, FetchError>;

    async fn check_transaction_status(
        &self,
        endpoint: &str,
        hash: &str,
    ) -> Result<TransactionStatus, FetchError>;
}
