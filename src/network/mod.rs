//! Network facade
//!
//! `ChainView` is the synchronous read surface that transaction logic sees.
//! Every read takes the open `TransactionContext` (if any) so that the
//! backend can decide, by fetch mode, whether to mark, replay or read
//! directly. `Chain` adds the asynchronous operations: resolving marks,
//! submitting and archive queries.
//!
//! Two backends exist: `Network` (remote GraphQL endpoints, two-pass builds)
//! and `LocalBlockchain` (in-process ledger, single-pass builds).

use async_trait::async_trait;
use std::sync::Arc;

use crate::rpc_manager::{FetchError, FetchReport};
use crate::submission::PendingTransaction;
use crate::tx_builder::{ContextSlot, Transaction, TransactionBuilderError, TransactionContext};
use crate::types::{
    Account, ActionBatch, ActionStates, EventBatch, EventFilter, NetworkConstants, NetworkId,
    NetworkState, PublicKey, TokenId, DEFAULT_ACCOUNT_CREATION_FEE,
};

pub mod local;
pub mod options;
pub mod remote;

pub use local::LocalBlockchain;
pub use options::{EndpointList, NetworkOptions, ResolvedEndpoints};
pub use remote::Network;

/// Synchronous chain-state reads
pub trait ChainView: Send + Sync {
    fn network_id(&self) -> NetworkId;

    /// Whether lazy proofs will actually be generated before sending
    fn proofs_enabled(&self) -> bool;

    /// Guard against nested transactions on this chain
    fn context_slot(&self) -> &Arc<ContextSlot>;

    fn get_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        context: Option<&TransactionContext>,
    ) -> Result<Account, TransactionBuilderError>;

    fn has_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        context: Option<&TransactionContext>,
    ) -> Result<bool, TransactionBuilderError>;

    fn get_balance(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        context: Option<&TransactionContext>,
    ) -> Result<u64, TransactionBuilderError> {
        self.get_account(public_key, token_id, context)
            .map(|account| account.balance)
    }

    fn get_network_state(
        &self,
        context: Option<&TransactionContext>,
    ) -> Result<NetworkState, TransactionBuilderError>;

    /// Fetched genesis constants when available, defaults otherwise
    fn get_network_constants(&self, context: Option<&TransactionContext>) -> NetworkConstants;

    fn get_actions(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        action_states: &ActionStates,
        context: Option<&TransactionContext>,
    ) -> Result<Vec<ActionBatch>, TransactionBuilderError>;

    fn current_slot(&self) -> Result<u32, TransactionBuilderError>;

    /// Account creation fee from the default constants
    #[deprecated(note = "use get_network_constants")]
    fn account_creation_fee(&self) -> u64 {
        DEFAULT_ACCOUNT_CREATION_FEE
    }
}

/// A chain that transactions can be built against and sent to
#[async_trait]
pub trait Chain: ChainView {
    /// Whether builds need a speculative pass and a fetch round
    fn requires_prefetch(&self) -> bool;

    /// Resolve every mark recorded by speculative passes
    async fn fetch_missing_data(&self) -> FetchReport;

    /// Sign, check limits and send; transport failures are captured in the
    /// returned pending transaction
    async fn send_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<PendingTransaction, TransactionBuilderError>;

    async fn fetch_events(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        filter: &EventFilter,
    ) -> Result<Vec<EventBatch>, FetchError>;

    async fn fetch_actions(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        action_states: &ActionStates,
    ) -> Result<Vec<ActionBatch>, FetchError>;
}
