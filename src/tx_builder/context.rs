//! Transaction context and fetch mode
//!
//! Chains share one process-wide `ContextSlot`, so at most one transaction
//! is open at a time across every chain. Opening a context claims the slot and
//! returns a `ContextGuard`; dropping the guard releases it on every exit
//! path, including errors and panics inside user logic. The open context
//! itself (`TransactionContext`) is threaded explicitly through every chain
//! read via `TxScope` rather than being looked up from ambient state.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::account_update::{AccountUpdate, FeePayerSpec};
use super::errors::TransactionBuilderError;
use crate::metrics::metrics;
use crate::network::ChainView;
use crate::observability::TraceContext;
use crate::types::{
    Account, ActionBatch, ActionStates, NetworkConstants, NetworkState, PublicKey, TokenId,
};

/// How chain reads behave inside a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Speculative pass: mark what is read, answer from cache or defaults
    Test,
    /// Replay pass: answer from cache, fail on anything not fetched
    Cached,
    /// Single pass against an in-process ledger
    Direct,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Test => "test",
            FetchMode::Cached => "cached",
            FetchMode::Direct => "direct",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What is visible about the open context from outside the build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextInfo {
    pub fetch_mode: FetchMode,
    pub sender: Option<PublicKey>,
}

/// At most one open transaction per slot
#[derive(Debug, Default)]
pub struct ContextSlot {
    current: Mutex<Option<ContextInfo>>,
}

static GLOBAL_SLOT: Lazy<Arc<ContextSlot>> = Lazy::new(ContextSlot::new);

impl ContextSlot {
    /// A private slot, for tests that build concurrently
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The slot every chain claims unless given its own
    pub fn global() -> Arc<Self> {
        Arc::clone(&GLOBAL_SLOT)
    }

    /// Claim the slot; fails if a transaction is already open
    pub fn open(
        self: &Arc<Self>,
        sender: Option<PublicKey>,
        fetch_mode: FetchMode,
    ) -> Result<ContextGuard, TransactionBuilderError> {
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(TransactionBuilderError::NestedTransaction);
        }
        *current = Some(ContextInfo { fetch_mode, sender });
        metrics().open_contexts.inc();
        debug!(fetch_mode = %fetch_mode, "Transaction context opened");

        Ok(ContextGuard {
            slot: Arc::clone(self),
        })
    }

    pub fn current(&self) -> Option<ContextInfo> {
        self.current.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Sender of the open transaction
    pub fn sender(&self) -> Result<PublicKey, TransactionBuilderError> {
        match self.current.lock().as_ref() {
            None => Err(TransactionBuilderError::NoActiveTransaction {
                operation: "sender",
            }),
            Some(ContextInfo { sender: None, .. }) => Err(TransactionBuilderError::MissingSender),
            Some(ContextInfo {
                sender: Some(sender),
                ..
            }) => Ok(sender.clone()),
        }
    }

    fn release(&self) {
        if self.current.lock().take().is_some() {
            metrics().open_contexts.dec();
            debug!("Transaction context closed");
        }
    }
}

/// Releases the context slot when dropped
#[derive(Debug)]
pub struct ContextGuard {
    slot: Arc<ContextSlot>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.slot.release();
    }
}

/// State of one pass: fee payer, fetch mode and the updates produced so far
#[derive(Debug, Clone)]
pub struct TransactionContext {
    fetch_mode: FetchMode,
    fee_payer: FeePayerSpec,
    account_updates: Vec<AccountUpdate>,
    trace: TraceContext,
}

impl TransactionContext {
    pub fn new(fee_payer: FeePayerSpec, fetch_mode: FetchMode, trace: TraceContext) -> Self {
        Self {
            fetch_mode,
            fee_payer,
            account_updates: Vec::new(),
            trace,
        }
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    pub fn fee_payer(&self) -> &FeePayerSpec {
        &self.fee_payer
    }

    pub fn sender(&self) -> Result<&PublicKey, TransactionBuilderError> {
        self.fee_payer
            .sender
            .as_ref()
            .ok_or(TransactionBuilderError::MissingSender)
    }

    pub fn account_updates(&self) -> &[AccountUpdate] {
        &self.account_updates
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn push(&mut self, update: AccountUpdate) {
        self.account_updates.push(update);
    }

    pub fn into_account_updates(self) -> Vec<AccountUpdate> {
        self.account_updates
    }
}

/// Handle given to transaction logic
///
/// Every chain read goes through the scope so that it sees the open
/// context's fetch mode. Updates pushed here become the command's account
/// updates, in order.
pub struct TxScope<'a> {
    chain: &'a dyn ChainView,
    context: &'a mut TransactionContext,
}

impl<'a> TxScope<'a> {
    pub fn new(chain: &'a dyn ChainView, context: &'a mut TransactionContext) -> Self {
        Self { chain, context }
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.context.fetch_mode
    }

    pub fn sender(&self) -> Result<PublicKey, TransactionBuilderError> {
        self.context.sender().cloned()
    }

    pub fn push(&mut self, update: AccountUpdate) {
        self.context.push(update);
    }

    /// Number of updates produced so far in this pass
    pub fn update_count(&self) -> usize {
        self.context.account_updates.len()
    }

    pub fn get_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
    ) -> Result<Account, TransactionBuilderError> {
        self.chain
            .get_account(public_key, token_id, Some(&*self.context))
    }

    pub fn has_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
    ) -> Result<bool, TransactionBuilderError> {
        self.chain
            .has_account(public_key, token_id, Some(&*self.context))
    }

    pub fn get_balance(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
    ) -> Result<u64, TransactionBuilderError> {
        self.chain
            .get_balance(public_key, token_id, Some(&*self.context))
    }

    pub fn get_network_state(&self) -> Result<NetworkState, TransactionBuilderError> {
        self.chain.get_network_state(Some(&*self.context))
    }

    pub fn get_network_constants(&self) -> NetworkConstants {
        self.chain.get_network_constants(Some(&*self.context))
    }

    pub fn get_actions(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        action_states: &ActionStates,
    ) -> Result<Vec<ActionBatch>, TransactionBuilderError> {
        self.chain
            .get_actions(public_key, token_id, action_states, Some(&*self.context))
    }
}

impl fmt::Debug for TxScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxScope")
            .field("fetch_mode", &self.context.fetch_mode)
            .field("account_updates", &self.context.account_updates.len())
            .finish_non_exhaustive()
    }
}
