//! Remote network facade over a query endpoint and an optional archive
//!
//! Reads never do I/O. Inside a speculative pass they mark what they touched
//! and answer from the cache or with a documented default; inside a replay
//! pass they answer from the cache or fail. Outside any transaction they
//! answer from whatever an earlier fetch left in the cache.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{Chain, ChainView, NetworkOptions, ResolvedEndpoints};
use crate::config::ClientConfig;
use crate::rpc_manager::{
    AccountKey, ActionsKey, CacheEntry, DataCache, FetchCoordinator, FetchError, FetchReport,
    GraphQlTransport, HttpConfig, QueryTransport, TransactionStatus,
};
use crate::submission::{self, PendingTransaction};
use crate::tx_builder::{
    ContextSlot, FetchMode, Transaction, TransactionBuilderError, TransactionContext,
    TransactionLimits,
};
use crate::types::{
    Account, ActionBatch, ActionStates, EventBatch, EventFilter, NetworkConstants, NetworkId,
    NetworkSnapshot, NetworkState, PublicKey, TokenId,
};

/// A remote network reached through GraphQL endpoints
#[derive(Debug)]
pub struct Network {
    endpoints: ResolvedEndpoints,
    coordinator: FetchCoordinator,
    slot: Arc<ContextSlot>,
    proofs_enabled: bool,
    limits: TransactionLimits,
}

impl Network {
    /// Connect with default HTTP settings and the process-wide cache
    pub fn new(options: impl Into<NetworkOptions>) -> Result<Self, TransactionBuilderError> {
        Self::with_config(options, HttpConfig::default())
    }

    pub fn with_config(
        options: impl Into<NetworkOptions>,
        http: HttpConfig,
    ) -> Result<Self, TransactionBuilderError> {
        let endpoints = options.into().resolve()?;
        let mut transport =
            GraphQlTransport::new(http)?.with_endpoints(endpoints.mina.clone())?;
        if let Some(archive) = &endpoints.archive {
            transport = transport.with_endpoints(archive.clone())?;
        }
        Ok(Self::with_transport(
            endpoints,
            Arc::new(transport),
            DataCache::global(),
        ))
    }

    /// Build from a loaded client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransactionBuilderError> {
        Ok(Self::with_config(config.network.clone(), config.http.clone())?
            .with_proofs_enabled(config.proofs_enabled)
            .with_limits(config.limits.clone()))
    }

    /// Use an arbitrary transport and cache (tests, custom wire formats)
    pub fn with_transport(
        endpoints: ResolvedEndpoints,
        transport: Arc<dyn QueryTransport>,
        cache: Arc<DataCache>,
    ) -> Self {
        debug!(
            endpoint = %endpoints.mina.primary,
            fallbacks = endpoints.mina.fallbacks.len(),
            archive = ?endpoints.archive.as_ref().map(|a| a.primary.as_str()),
            network_id = %endpoints.network_id,
            "Network configured"
        );
        Self {
            endpoints,
            coordinator: FetchCoordinator::new(transport, cache),
            slot: ContextSlot::global(),
            proofs_enabled: true,
            limits: TransactionLimits::default(),
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

    pub fn with_limits(mut self, limits: TransactionLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn endpoints(&self) -> &ResolvedEndpoints {
        &self.endpoints
    }

    /// Primary query endpoint; cache entries are keyed by it
    pub fn graphql_endpoint(&self) -> &str {
        &self.endpoints.mina.primary
    }

    pub fn archive_endpoint(&self) -> Option<&str> {
        self.endpoints.archive.as_ref().map(|a| a.primary.as_str())
    }

    pub fn coordinator(&self) -> &FetchCoordinator {
        &self.coordinator
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        self.coordinator.cache()
    }

    pub fn limits(&self) -> &TransactionLimits {
        &self.limits
    }

    /// Fetch one account right now and cache the answer
    #[instrument(skip(self), fields(endpoint = %self.graphql_endpoint()))]
    pub async fn fetch_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
    ) -> Result<Option<Account>, FetchError> {
        let key = AccountKey::new(public_key.clone(), token_id.clone());
        let mut accounts = self
            .coordinator
            .transport()
            .fetch_accounts(self.graphql_endpoint(), std::slice::from_ref(&key))
            .await?;
        let account = accounts.pop().flatten();
        self.cache()
            .insert_account(self.graphql_endpoint(), key, account.clone());
        Ok(account)
    }

    /// Fetch network state and genesis constants right now and cache them
    #[instrument(skip(self), fields(endpoint = %self.graphql_endpoint()))]
    pub async fn fetch_network_state(&self) -> Result<NetworkSnapshot, FetchError> {
        let snapshot = self
            .coordinator
            .transport()
            .fetch_network(self.graphql_endpoint())
            .await?;
        self.cache()
            .insert_network(self.graphql_endpoint(), snapshot.clone());
        Ok(snapshot)
    }

    pub async fn check_transaction_status(
        &self,
        hash: &str,
    ) -> Result<TransactionStatus, FetchError> {
        self.coordinator
            .transport()
            .check_transaction_status(self.graphql_endpoint(), hash)
            .await
    }

    fn require_archive(&self) -> Result<&str, FetchError> {
        self.archive_endpoint().ok_or(FetchError::NoEndpoint("archive"))
    }

    fn direct_unsupported(operation: &str) -> TransactionBuilderError {
        TransactionBuilderError::Unsupported(format!(
            "{} in direct mode is only available on a local blockchain",
            operation
        ))
    }
}

impl ChainView for Network {
    fn network_id(&self) -> NetworkId {
        self.endpoints.network_id.clone()
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
        context: Option<&TransactionContext>,
    ) -> Result<Account, TransactionBuilderError> {
        let endpoint = self.graphql_endpoint();
        let key = AccountKey::new(public_key.clone(), token_id.clone());
        let cached = self.cache().account(endpoint, &key);

        match context.map(TransactionContext::fetch_mode) {
            Some(FetchMode::Test) => {
                self.coordinator.mark_account_to_be_fetched(key, endpoint);
                Ok(match cached {
                    Some(CacheEntry::Found(account)) => account,
                    _ => Account {
                        token_id: token_id.clone(),
                        ..Account::dummy(public_key.clone())
                    },
                })
            }
            Some(FetchMode::Cached) => match cached {
                Some(CacheEntry::Found(account)) => Ok(account),
                Some(CacheEntry::NotFound) => Err(TransactionBuilderError::account_not_found(
                    public_key, token_id, endpoint,
                )),
                None => Err(TransactionBuilderError::missing_data(endpoint, key.to_string())),
            },
            Some(FetchMode::Direct) => Err(Self::direct_unsupported("get_account")),
            None => match cached {
                Some(CacheEntry::Found(account)) => Ok(account),
                _ => Err(TransactionBuilderError::account_not_found(
                    public_key, token_id, endpoint,
                )),
            },
        }
    }

    fn has_account(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        context: Option<&TransactionContext>,
    ) -> Result<bool, TransactionBuilderError> {
        let endpoint = self.graphql_endpoint();
        let key = AccountKey::new(public_key.clone(), token_id.clone());
        let cached = self.cache().account(endpoint, &key);

        match context.map(TransactionContext::fetch_mode) {
            Some(FetchMode::Test) => {
                self.coordinator.mark_account_to_be_fetched(key, endpoint);
                Ok(cached.is_some_and(|entry| entry.is_found()))
            }
            Some(FetchMode::Cached) => match cached {
                Some(entry) => Ok(entry.is_found()),
                None => Err(TransactionBuilderError::missing_data(endpoint, key.to_string())),
            },
            Some(FetchMode::Direct) => Err(Self::direct_unsupported("has_account")),
            None => Ok(cached.is_some_and(|entry| entry.is_found())),
        }
    }

    fn get_network_state(
        &self,
        context: Option<&TransactionContext>,
    ) -> Result<NetworkState, TransactionBuilderError> {
        let endpoint = self.graphql_endpoint();
        let cached = self.cache().network(endpoint);

        match context.map(TransactionContext::fetch_mode) {
            Some(FetchMode::Test) => {
                self.coordinator.mark_network_to_be_fetched(endpoint);
                Ok(cached.map(|snapshot| snapshot.state).unwrap_or_default())
            }
            Some(FetchMode::Cached) => cached
                .map(|snapshot| snapshot.state)
                .ok_or_else(|| TransactionBuilderError::missing_data(endpoint, "network state")),
            Some(FetchMode::Direct) => Err(Self::direct_unsupported("get_network_state")),
            None => cached
                .map(|snapshot| snapshot.state)
                .ok_or_else(|| TransactionBuilderError::network_not_found(endpoint)),
        }
    }

    fn get_network_constants(&self, context: Option<&TransactionContext>) -> NetworkConstants {
        let endpoint = self.graphql_endpoint();
        match context.map(TransactionContext::fetch_mode) {
            Some(FetchMode::Test) => self.coordinator.mark_network_to_be_fetched(endpoint),
            Some(FetchMode::Cached) | Some(FetchMode::Direct) | None => {}
        }

        match self.cache().genesis_constants(endpoint) {
            Some(genesis) => NetworkConstants::from_genesis(&genesis).unwrap_or_else(|err| {
                warn!(endpoint = %endpoint, error = %err, "Unusable genesis constants, using defaults");
                NetworkConstants::default()
            }),
            None => NetworkConstants::default(),
        }
    }

    fn get_actions(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        action_states: &ActionStates,
        context: Option<&TransactionContext>,
    ) -> Result<Vec<ActionBatch>, TransactionBuilderError> {
        let key = ActionsKey::new(public_key.clone(), token_id.clone(), action_states.clone());
        let mode = context.map(TransactionContext::fetch_mode);

        match (mode, self.archive_endpoint()) {
            (Some(FetchMode::Direct), _) => Err(Self::direct_unsupported("get_actions")),
            // Speculative reads never fail, even without an archive
            (Some(FetchMode::Test), None) => Ok(Vec::new()),
            (_, None) => Err(FetchError::NoEndpoint("archive").into()),
            (Some(FetchMode::Test), Some(archive)) => {
                let cached = self.cache().actions(archive, &key);
                self.coordinator.mark_actions_to_be_fetched(key, archive);
                Ok(cached.unwrap_or_default())
            }
            (Some(FetchMode::Cached), Some(archive)) => self
                .cache()
                .actions(archive, &key)
                .ok_or_else(|| TransactionBuilderError::missing_data(archive, key.to_string())),
            (None, Some(archive)) => self.cache().actions(archive, &key).ok_or_else(|| {
                TransactionBuilderError::AccountOrNetworkNotFound {
                    what: format!("Actions for public key {}", public_key),
                    endpoint: archive.to_string(),
                }
            }),
        }
    }

    fn current_slot(&self) -> Result<u32, TransactionBuilderError> {
        Err(TransactionBuilderError::Unsupported(
            "current_slot is not available on a remote network; read global_slot_since_genesis from get_network_state".to_string(),
        ))
    }
}

#[async_trait]
impl Chain for Network {
    fn requires_prefetch(&self) -> bool {
        true
    }

    async fn fetch_missing_data(&self) -> FetchReport {
        self.coordinator
            .fetch_missing_data(self.graphql_endpoint(), self.archive_endpoint())
            .await
    }

    async fn send_transaction(
        &self,
        transaction: Transaction,
    ) -> Result<PendingTransaction, TransactionBuilderError> {
        let constants = self.get_network_constants(None);
        submission::submit(
            Arc::clone(self.coordinator.transport()),
            self.graphql_endpoint(),
            transaction,
            &self.limits,
            constants,
        )
        .await
    }

    #[instrument(skip(self, filter), fields(public_key = %public_key))]
    async fn fetch_events(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        filter: &EventFilter,
    ) -> Result<Vec<EventBatch>, FetchError> {
        let archive = self.require_archive()?;
        self.coordinator
            .transport()
            .fetch_events(archive, public_key, token_id, filter)
            .await
    }

    #[instrument(skip(self, action_states), fields(public_key = %public_key))]
    async fn fetch_actions(
        &self,
        public_key: &PublicKey,
        token_id: &TokenId,
        action_states: &ActionStates,
    ) -> Result<Vec<ActionBatch>, FetchError> {
        let archive = self.require_archive()?;
        let key = ActionsKey::new(public_key.clone(), token_id.clone(), action_states.clone());
        let batches = self
            .coordinator
            .transport()
            .fetch_actions(archive, std::slice::from_ref(&key))
            .await?
            .pop()
            .unwrap_or_default();
        self.cache().insert_actions(archive, key, batches.clone());
        Ok(batches)
    }
}
