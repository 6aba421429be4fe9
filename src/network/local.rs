//! In-process ledger for tests and local development
//!
//! Reads go straight to the ledger, so builds take a single direct pass and
//! never touch a fetch coordinator. Sending applies the command to a copy of
//! the ledger and commits only if every check passes; failures come back as
//! the same per-update failure lists a remote network reports.

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Chain, ChainView};
use crate::metrics::metrics;
use crate::observability::TraceContext;
use crate::rpc_manager::{AccountKey, FailureEntry, FetchError, FetchReport, TransactionStatus};
use crate::structured_logging::TxLogger;
use crate::submission::{
    translate_failure_reason, PendingTransaction, SettledStatus, TransactionError,
};
use crate::tx_builder::{
    verify_transaction_limits, AccountUpdate, Authorization, ContextSlot, Transaction,
    TransactionBuilderError, TransactionContext, TransactionLimits, ZkappCommand,
    APP_STATE_SLOTS,
};
use crate::types::{
    Account, ActionBatch, ActionStates, EventBatch, EventFilter, Field, NetworkConstants,
    NetworkId, NetworkState, PublicKey, TokenId, ZkappAccount,
};
use crate::wallet::{verify_signature, Ed25519Signer, TransactionSigner};

/// Endpoint name used in errors raised by the local ledger
pub const LOCAL_ENDPOINT: &str = "local";

const ACTION_STATE_SLOTS: usize = 5;

#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: HashMap<AccountKey, Account>,
    network_state: NetworkState,
    actions: HashMap<AccountKey, Vec<ActionBatch>>,
    events: HashMap<AccountKey, Vec<EventBatch>>,
}

/// A ledger living in this process
#[derive(Debug)]
pub struct LocalBlockchain {
    state: RwLock<LedgerState>,
    constants: NetworkConstants,
    slot: Arc<ContextSlot>,
    proofs_enabled: bool,
    limits: TransactionLimits,
    network_id: NetworkId,
}

impl Default for LocalBlockchain {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBlockchain {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            constants: NetworkConstants::default(),
            slot: ContextSlot::global(),
            proofs_enabled: true,
            limits: TransactionLimits::default(),
            network_id: NetworkId::Testnet,
        }
    }

    /// Claim `slot` instead of the process-wide one
    pub fn with_context_slot(mut self, slot: Arc<ContextSlot>) -> Self {
        self.slot = slot;
        self
    }

    pub fn with_proofs_enabled(mut self, enabled: bool) -> Self {
        self.proofs_enabled = enabled;
        self
    }

    pub fn with_constants(mut self, constants: NetworkConstants) -> Self {
        self.constants = constants;
        self
    }

    pub fn with_limits(mut self, limits: TransactionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn add_account(&self, account: Account) {
        let key = AccountKey::new(account.public_key.clone(), account.token_id.clone());
        self.state.write().accounts.insert(key, account);
    }

    /// Create a fresh key with a funded native-token account
    pub fn create_funded_account(&self, balance: u64) -> Arc<Ed25519Signer> {
        let signer = Arc::new(Ed25519Signer::random());
        self.add_account(Account::new(signer.public_key(), TokenId::native(), balance));
        signer
    }

    pub fn account(&self, public_key: &PublicKey, token_id: &TokenId) -> Option<Account> {
        let key = AccountKey::new(public_key.clone(), token_id.clone());
        self.state.read().accounts.get(&key).cloned()
    }

    pub fn set_global_slot(&self, slot: u32) {
        self.state.write().network_state.global_slot_since_genesis = slot;
    }

    pub fn set_blockchain_length(&self, height: u32) {
        self.state.write().network_state.blockchain_length = height;
    }

    /// Validate `command` against a copy of the ledger and commit it
    fn apply(&self, command: &ZkappCommand, message: &[u8]) -> Result<(), Vec<FailureEntry>> {
        let mut state = self.state.write();
        let mut next = state.clone();
        let updates = command.account_updates.len();

        let fail = |index: usize, failures: Vec<String>| -> Vec<FailureEntry> {
            (0..=updates)
                .map(|i| FailureEntry {
                    index: i,
                    failures: if i == index {
                        failures.clone()
                    } else if i == 0 {
                        Vec::new()
                    } else {
                        vec!["Cancelled".to_string()]
                    },
                })
                .collect()
        };

        if let Some(failure) = self.apply_fee_payer(&mut next, command, message) {
            return Err(fail(0, vec![failure]));
        }

        let native = TokenId::native();
        let excess: i128 = command
            .account_updates
            .iter()
            .filter(|u| u.token_id == native)
            .map(|u| u.balance_change as i128)
            .sum();
        if excess != 0 {
            return Err(fail(0, vec!["Invalid_fee_excess".to_string()]));
        }

        for (i, update) in command.account_updates.iter().enumerate() {
            if let Err(failure) = self.apply_update(&mut next, update, message) {
                return Err(fail(i + 1, vec![failure]));
            }
        }

        *state = next;
        Ok(())
    }

    fn apply_fee_payer(
        &self,
        state: &mut LedgerState,
        command: &ZkappCommand,
        message: &[u8],
    ) -> Option<String> {
        let fee_payer = &command.fee_payer;
        let key = AccountKey::new(fee_payer.public_key.clone(), TokenId::native());
        let Some(account) = state.accounts.get_mut(&key) else {
            return Some("Fee_payer_account_not_found".to_string());
        };
        let signed = fee_payer
            .signature
            .as_deref()
            .is_some_and(|sig| verify_signature(&fee_payer.public_key, message, sig));
        if !signed {
            return Some("Fee_payer_invalid_signature".to_string());
        }
        if account.nonce != fee_payer.nonce {
            return Some("Fee_payer_nonce_must_increase".to_string());
        }
        if account.balance < fee_payer.fee {
            return Some("Source_insufficient_balance".to_string());
        }
        if let Some(valid_until) = fee_payer.valid_until {
            if state.network_state.global_slot_since_genesis > valid_until {
                return Some("Fee_payer_valid_until_precondition_unsatisfied".to_string());
            }
        }
        account.balance -= fee_payer.fee;
        account.nonce += 1;
        None
    }

    fn apply_update(
        &self,
        state: &mut LedgerState,
        update: &AccountUpdate,
        message: &[u8],
    ) -> Result<(), String> {
        match &update.authorization {
            Authorization::Signature(Some(sig)) => {
                if !verify_signature(&update.public_key, message, sig) {
                    return Err("Invalid_signature".to_string());
                }
            }
            Authorization::Signature(None) | Authorization::LazySignature => {
                return Err("Invalid_signature".to_string());
            }
            Authorization::LazyProof { .. } if self.proofs_enabled => {
                return Err("Invalid_proof".to_string());
            }
            Authorization::None | Authorization::Proof(_) | Authorization::LazyProof { .. } => {}
        }

        let key = AccountKey::new(update.public_key.clone(), update.token_id.clone());
        let Some(nonce) = state.accounts.get(&key).map(|account| account.nonce) else {
            // New accounts pay the creation fee out of what they receive
            let fee = self.constants.account_creation_fee as i128;
            let received = update.balance_change as i128;
            if received < fee {
                return Err("Amount_insufficient_to_create_account".to_string());
            }
            state.accounts.insert(
                key.clone(),
                Account::new(update.public_key.clone(), update.token_id.clone(), 0),
            );
            return self.apply_to_account(state, &key, update, received - fee);
        };

        if update.nonce_precondition.is_some_and(|expected| expected != nonce) {
            return Err("Account_nonce_precondition_unsatisfied".to_string());
        }
        self.apply_to_account(state, &key, update, update.balance_change as i128)
    }

    fn apply_to_account(
        &self,
        state: &mut LedgerState,
        key: &AccountKey,
        update: &AccountUpdate,
        delta: i128,
    ) -> Result<(), String> {
        let height = state.network_state.blockchain_length;
        let Some(account) = state.accounts.get_mut(key) else {
            return Err("Account_not_found".to_string());
        };

        let balance = account.balance as i128 + delta;
        if balance < 0 {
            return Err("Source_insufficient_balance".to_string());
        }
        account.balance = u64::try_from(balance).map_err(|_| "Overflow".to_string())?;
        if update.increment_nonce {
            account.nonce += 1;
        }

        let writes_state = update.app_state.iter().any(Option::is_some);
        if writes_state || !update.actions.is_empty() {
            let zkapp = account.zkapp.get_or_insert_with(|| ZkappAccount {
                app_state: vec![Field::zero(); APP_STATE_SLOTS],
                action_state: vec![Field::zero(); ACTION_STATE_SLOTS],
                ..ZkappAccount::default()
            });
            // Accounts added with a partial zkapp are padded to the full layout
            if zkapp.app_state.len() < APP_STATE_SLOTS {
                zkapp.app_state.resize(APP_STATE_SLOTS, Field::zero());
            }
            if zkapp.action_state.len() < ACTION_STATE_SLOTS {
                zkapp.action_state.resize(ACTION_STATE_SLOTS, Field::zero());
            }
            for (slot, value) in update.app_state.iter().enumerate() {
                if let Some(value) = value {
                    let target = zkapp
                        .app_state
                        .get_mut(slot)
                        .ok_or_else(|| "Invalid_app_state_index".to_string())?;
                    *target = value.clone();
                }
            }
            if !update.actions.is_empty() {
                let previous = zkapp.action_state.first().cloned().unwrap_or_default();
                let next = next_action_state(&previous, &update.actions);
                zkapp.action_state.insert(0, next.clone());
                zkapp.action_state.truncate(ACTION_STATE_SLOTS);
                state.actions.entry(key.clone()).or_default().push(ActionBatch {
                    action_state: next,
                    actions: update
                        .actions
                        .iter()
                        .map(|a| a.iter().map(ToString::to_string).collect())
                        .collect(),
                });
            }
        }

        if !update.events.is_empty() {
            state.events.entry(key.clone()).or_default().push(EventBatch {
                block_height: height,
                block_hash: String::new(),
                events: update
                    .events
                    .iter()
                    .map(|e| e.iter().map(ToString::to_string).collect())
                    .collect(),
            });
        }
        Ok(())
    }

    fn action_window(
        &self,
        key: &AccountKey,
        action_states: &ActionStates,
    ) -> Vec<ActionBatch> {
        let state = self.state.read();
        let Some(log) = state.actions.get(key) else {
            return Vec::new();
        };

        let start = match &action_states.from_action_state {
            None => 0,
            Some(from) if from.is_zero() => 0,
            Some(from) => match log.iter().position(|b| &b.action_state == from) {
                Some(pos) => pos + 1,
                None => return Vec::new(),
            },
        };
        let end = match &action_states.end_action_state {
            None => log.len(),
            Some(end) => log
                .iter()
                .position(|b| &b.action_state == end)
                .map_or(log.len(), |pos| pos + 1),
        };
        if start >= end {
            return Vec::new();
        }
        log[start..end].to_vec()
    }
}

/// Hash-chain a batch of actions onto the previous action state
fn next_action_state(previous: &Field, actions: &[Vec<Field>]) -> Field {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_str().as_bytes());
    for action in actions {
        for element in action {
            hasher.update(element.as_str().as_bytes());
            hasher.update(b",");
        }
        hasher.update(b";");
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    Field::from(u64::from_be_bytes(head))
}

impl ChainView for LocalBlockchain {
    fn network_id(&self) -> NetworkId {
        self.network_id.clone()
    }

    fn proofs_enabled(&self) -> bool {
        self.proofs_enabled
    }

    fn context_slot(&self) -> &Arc<ContextSlot> {
        &self.slot
    }

    fn get_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        _context: Option<&TransactionContext>,
    ) -> Result<Account, TransactionBuilderError> {
        self.account(public_key, token_id).ok_or_else(|| {
            TransactionBuilderError::account_not_found(public_key, token_id, LOCAL_ENDPOINT)
        })
    }

    fn has_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        _context: Option<&TransactionContext>,
    ) -> Result<bool, TransactionBuilderError> {
        Ok(self.account(public_key, token_id).is_some())
    }

    fn get_network_state(
        &self,
        _context: Option<&TransactionContext>,
    ) -> Result<NetworkState, TransactionBuilderError> {
        Ok(self.state.read().network_state.clone())
    }

    fn get_network_constants(&self, _context: Option<&TransactionContext>) -> NetworkConstants {
        self.constants
    }

    fn get_actions(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        action_states: &ActionStates,
        _context: Option<&TransactionContext>,
    ) -> Result<Vec<ActionBatch>, TransactionBuilderError> {
        let key = AccountKey::new(public_key.clone(), token_id.clone());
        Ok(self.action_window(&key, action_states))
    }

    fn current_slot(&self) -> Result<u32, TransactionBuilderError> {
        Ok(self.state.read().network_state.global_slot_since_genesis)
    }
}

#[async_trait]
impl Chain for LocalBlockchain {
    fn requires_prefetch(&self) -> bool {
        false
    }

    async fn fetch_missing_data(&self) -> FetchReport {
        FetchReport::default()
    }

    async fn send_transaction(
        &self,
        mut transaction: Transaction,
    ) -> Result<PendingTransaction, TransactionBuilderError> {
        let logger = TxLogger::new(TraceContext::new("local_send"));

        transaction.sign()?;
        verify_transaction_limits(&transaction, &self.limits)?;
        let hash = transaction.hash()?;
        let message = transaction.signing_message()?;
        metrics().submissions.inc();

        let (errors, status) = match self.apply(transaction.command(), &message) {
            Ok(()) => {
                info!(hash = %hash, updates = transaction.account_updates().len(), "Applied to local ledger");
                (Vec::new(), TransactionStatus::included())
            }
            Err(failures) => {
                let rejection =
                    translate_failure_reason(transaction.command(), &failures, &self.constants);
                debug!(hash = %hash, rule = %rejection.rule, "Local ledger rejected transaction");
                metrics().submission_failures.inc();
                (
                    vec![TransactionError::Rejection(rejection)],
                    TransactionStatus::failed(failures),
                )
            }
        };
        logger.log_submitted(&hash, errors.is_empty(), errors.len());

        Ok(PendingTransaction::new(
            transaction,
            hash,
            None,
            errors,
            self.constants,
            Arc::new(SettledStatus(status)),
            logger,
        ))
    }

    async fn fetch_events(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        filter: &EventFilter,
    ) -> Result<Vec<EventBatch>, FetchError> {
        let key = AccountKey::new(public_key.clone(), token_id.clone());
        Ok(self
            .state
            .read()
            .events
            .get(&key)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| filter.from.map_or(true, |from| e.block_height >= from))
                    .filter(|e| filter.to.map_or(true, |to| e.block_height <= to))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_actions(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        action_states: &ActionStates,
    ) -> Result<Vec<ActionBatch>, FetchError> {
        let key = AccountKey::new(public_key.clone(), token_id.clone());
        Ok(self.action_window(&key, action_states))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::{RejectionRule, WaitOptions};
    use crate::tx_builder::{FeePayer, FetchMode};

    const MINA: u64 = 1_000_000_000;

    fn command(fee_payer: &PublicKey, nonce: u32, updates: Vec<AccountUpdate>) -> ZkappCommand {
        ZkappCommand {
            fee_payer: FeePayer {
                public_key: fee_payer.clone(),
                fee: MINA / 10,
                nonce,
                valid_until: None,
                signature: None,
            },
            account_updates: updates,
            memo: String::new(),
        }
    }

    fn transfer(from: &PublicKey, to: &PublicKey, amount: i64) -> Vec<AccountUpdate> {
        vec![
            AccountUpdate::new(from.clone())
                .with_balance_change(-amount)
                .require_signature(),
            AccountUpdate::new(to.clone()).with_balance_change(amount),
        ]
    }

    #[tokio::test]
    async fn test_transfer_to_new_account_pays_creation_fee() {
        let chain = LocalBlockchain::new().with_context_slot(ContextSlot::new());
        let sender = chain.create_funded_account(10 * MINA);
        let receiver = Ed25519Signer::random().public_key();

        let tx = Transaction::new(
            command(&sender.public_key(), 0, transfer(&sender.public_key(), &receiver, 3 * MINA as i64)),
            FetchMode::Direct,
            true,
        )
        .with_signer(sender.clone());
        let outcome = chain
            .send_transaction(tx)
            .await
            .unwrap()
            .wait(WaitOptions::default())
            .await;
        assert!(outcome.is_included());

        let sender_account = chain.account(&sender.public_key(), &TokenId::native()).unwrap();
        assert_eq!(sender_account.balance, 10 * MINA - MINA / 10 - 3 * MINA);
        assert_eq!(sender_account.nonce, 2);
        let receiver_account = chain.account(&receiver, &TokenId::native()).unwrap();
        assert_eq!(receiver_account.balance, 2 * MINA);
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejected_without_side_effects() {
        let chain = LocalBlockchain::new().with_context_slot(ContextSlot::new());
        let sender = chain.create_funded_account(2 * MINA);
        let receiver = chain.create_funded_account(MINA).public_key();

        let tx = Transaction::new(
            command(&sender.public_key(), 0, transfer(&sender.public_key(), &receiver, 5 * MINA as i64)),
            FetchMode::Direct,
            true,
        )
        .with_signer(sender.clone());
        let pending = chain.send_transaction(tx).await.unwrap();
        assert!(!pending.is_success);

        let outcome = pending.wait(WaitOptions::default()).await;
        match &outcome.errors()[0] {
            TransactionError::Rejection(r) => {
                assert_eq!(r.rule, RejectionRule::InsufficientFunds);
                assert_eq!(r.index, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
        let account = chain.account(&sender.public_key(), &TokenId::native()).unwrap();
        assert_eq!(account.balance, 2 * MINA);
        assert_eq!(account.nonce, 0);
    }

    #[tokio::test]
    async fn test_unsigned_fee_payer_rejected() {
        let chain = LocalBlockchain::new().with_context_slot(ContextSlot::new());
        let sender = chain.create_funded_account(MINA);
        let tx = Transaction::new(command(&sender.public_key(), 0, vec![]), FetchMode::Direct, true);
        let pending = chain.send_transaction(tx).await.unwrap();
        assert!(matches!(
            &pending.errors[0],
            TransactionError::Rejection(r) if r.rule == RejectionRule::Authorization
        ));
    }

    #[tokio::test]
    async fn test_actions_are_hash_chained_and_windowed() {
        let chain = LocalBlockchain::new()
            .with_context_slot(ContextSlot::new())
            .with_proofs_enabled(false);
        let payer = chain.create_funded_account(MINA);
        let zkapp = chain.create_funded_account(MINA).public_key();

        let mut states = Vec::new();
        for (nonce, value) in [(0u32, 1u64), (1, 2)] {
            let mut update = AccountUpdate::new(zkapp.clone()).with_authorization(
                Authorization::LazyProof {
                    method: "dispatch".into(),
                },
            );
            update.push_action(vec![Field::from(value)]);
            let tx = Transaction::new(command(&payer.public_key(), nonce, vec![update]), FetchMode::Direct, true)
                .with_signer(payer.clone());
            assert!(chain.send_transaction(tx).await.unwrap().is_success);
            let account = chain.account(&zkapp, &TokenId::native()).unwrap();
            states.push(account.zkapp.unwrap().action_state[0].clone());
        }
        assert_ne!(states[0], states[1]);

        let all = chain
            .get_actions(&zkapp, &TokenId::native(), &ActionStates::default(), None)
            .unwrap();
        assert_eq!(all.len(), 2);

        let after_first = chain
            .get_actions(
                &zkapp,
                &TokenId::native(),
                &ActionStates::new(Some(states[0].clone()), None),
                None,
            )
            .unwrap();
        assert_eq!(after_first.len(), 1);
        assert_eq!(after_first[0].actions, vec![vec!["2".to_string()]]);
    }

    #[tokio::test]
    async fn test_state_write_pads_partial_zkapp_account() {
        let chain = LocalBlockchain::new()
            .with_context_slot(ContextSlot::new())
            .with_proofs_enabled(false);
        let payer = chain.create_funded_account(MINA);
        let zkapp = Ed25519Signer::random().public_key();
        let mut account = Account::new(zkapp.clone(), TokenId::native(), MINA);
        account.zkapp = Some(ZkappAccount::default());
        chain.add_account(account);

        let mut update = AccountUpdate::new(zkapp.clone()).with_authorization(
            Authorization::LazyProof {
                method: "set".into(),
            },
        );
        update.set_app_state(0, Field::from(7));
        update.push_action(vec![Field::from(1)]);
        let tx = Transaction::new(command(&payer.public_key(), 0, vec![update]), FetchMode::Direct, true)
            .with_signer(payer.clone());
        let pending = chain.send_transaction(tx).await.unwrap();
        assert!(pending.is_success, "{:?}", pending.errors);

        let state = chain.account(&zkapp, &TokenId::native()).unwrap().zkapp.unwrap();
        assert_eq!(state.app_state.len(), APP_STATE_SLOTS);
        assert_eq!(state.app_state[0], Field::from(7));
        assert_eq!(state.action_state.len(), ACTION_STATE_SLOTS);
    }

    #[test]
    fn test_direct_reads() {
        let chain = LocalBlockchain::new().with_context_slot(ContextSlot::new());
        chain.set_global_slot(12);
        assert_eq!(chain.current_slot().unwrap(), 12);
        let missing = Ed25519Signer::random().public_key();
        assert!(matches!(
            chain.get_account(&missing, &TokenId::native(), None),
            Err(TransactionBuilderError::AccountOrNetworkNotFound { ref endpoint, .. }) if endpoint == LOCAL_ENDPOINT
        ));
        assert!(!chain.has_account(&missing, &TokenId::native(), None).unwrap());
    }
}
