//! Scripted transport for tests
//!
//! A scripted, in-memory `QueryTransport` for deterministic tests of the
//! fetch coordinator, the network facade and the confirmation poller.
//!
//! These utilities are only compiled when running tests or when the
//! `test_utils` feature is enabled.

#![cfg(any(test, feature = "test_utils"))]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::rpc_manager::{
    AccountKey, ActionsKey, FetchError, QueryTransport, SendResponse, TransactionStatus,
};
use crate::types::{
    Account, ActionBatch, EventBatch, EventFilter, NetworkSnapshot, NetworkState, PublicKey,
    TokenId,
};

/// Scripted transport
///
/// Accounts, network state and actions are served from in-memory tables.
/// Status queries pop from a queue and fall back to "not yet known".
#[derive(Debug, Default)]
pub struct MockTransport {
    accounts: Mutex<HashMap<AccountKey, Account>>,
    network: Mutex<Option<NetworkSnapshot>>,
    actions: Mutex<HashMap<ActionsKey, Vec<ActionBatch>>>,
    events: Mutex<Vec<EventBatch>>,
    query_failure: Mutex<Option<FetchError>>,
    send_result: Mutex<Option<Result<SendResponse, FetchError>>>,
    statuses: Mutex<VecDeque<Result<TransactionStatus, FetchError>>>,

    account_batches: Mutex<Vec<Vec<AccountKey>>>,
    sent: Mutex<Vec<serde_json::Value>>,
    polled: Mutex<Vec<String>>,
    network_calls: AtomicUsize,
    action_calls: AtomicUsize,
    event_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, account: Account) {
        let key = AccountKey::new(account.public_key.clone(), account.token_id.clone());
        self.accounts.lock().insert(key, account);
    }

    pub fn set_network(&self, snapshot: NetworkSnapshot) {
        *self.network.lock() = Some(snapshot);
    }

    pub fn set_actions(&self, key: ActionsKey, batches: Vec<ActionBatch>) {
        self.actions.lock().insert(key, batches);
    }

    pub fn set_events(&self, events: Vec<EventBatch>) {
        *self.events.lock() = events;
    }

    /// Make every chain-state query fail with `err`
    pub fn fail_queries(&self, err: FetchError) {
        *self.query_failure.lock() = Some(err);
    }

    pub fn set_send_result(&self, result: Result<SendResponse, FetchError>) {
        *self.send_result.lock() = Some(result);
    }

    pub fn push_status(&self, status: Result<TransactionStatus, FetchError>) {
        self.statuses.lock().push_back(status);
    }

    pub fn account_batches(&self) -> Vec<Vec<AccountKey>> {
        self.account_batches.lock().clone()
    }

    pub fn sent_commands(&self) -> Vec<serde_json::Value> {
        self.sent.lock().clone()
    }

    pub fn network_calls(&self) -> usize {
        self.network_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Hashes passed to status queries, in call order
    pub fn polled_hashes(&self) -> Vec<String> {
        self.polled.lock().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.account_batches.lock().len()
            + self.sent.lock().len()
            + self.network_calls()
            + self.action_calls.load(Ordering::SeqCst)
            + self.event_calls.load(Ordering::SeqCst)
            + self.status_calls()
    }

    fn check_failure(&self) -> Result<(), FetchError> {
        match self.query_failure.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl QueryTransport for MockTransport {
    async fn fetch_accounts(
        &self,
        _endpoint: &str,
        keys: &[AccountKey],
    ) -> Result<Vec<Option<Account>>, FetchError> {
        self.account_batches.lock().push(keys.to_vec());
        self.check_failure()?;
        let accounts = self.accounts.lock();
        Ok(keys.iter().map(|k| accounts.get(k).cloned()).collect())
    }

    async fn fetch_network(&self, _endpoint: &str) -> Result<NetworkSnapshot, FetchError> {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self.network.lock().clone().unwrap_or(NetworkSnapshot {
            state: NetworkState::default(),
            genesis: None,
        }))
    }

    async fn fetch_actions(
        &self,
        _archive_endpoint: &str,
        keys: &[ActionsKey],
    ) -> Result<Vec<Vec<ActionBatch>>, FetchError> {
        self.action_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let actions = self.actions.lock();
        Ok(keys
            .iter()
            .map(|k| actions.get(k).cloned().unwrap_or_default())
            .collect())
    }

    async fn fetch_events(
        &self,
        _archive_endpoint: &str,
        _public_key: &PublicKey,
        _token_id: &TokenId,
        filter: &EventFilter,
    ) -> Result<Vec<EventBatch>, FetchError> {
        self.event_calls.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .events
            .lock()
            .iter()
            .filter(|e| filter.from.map_or(true, |from| e.block_height >= from))
            .filter(|e| filter.to.map_or(true, |to| e.block_height <= to))
            .cloned()
            .collect())
    }

    async fn send_transaction(
        &self,
        _endpoint: &str,
        command: &serde_json::Value,
    ) -> Result<SendResponse, FetchError> {
        self.sent.lock().push(command.clone());
        self.send_result
            .lock()
            .clone()
            .unwrap_or_else(|| Ok(SendResponse::default()))
    }

    async fn check_transaction_status(
        &self,
        _endpoint: &str,
        hash: &str,
    ) -> Result<TransactionStatus, FetchError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.polled.lock().push(hash.to_string());
        self.statuses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(TransactionStatus::unknown()))
    }
}

/// Deterministic public key for tests
pub fn test_key(byte: u8) -> PublicKey {
    PublicKey::from_bytes([byte; 32])
}
