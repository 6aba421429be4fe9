//! Process-wide store of fetched chain state
//!
//! Written only by the fetch coordinator, read by the network facade. Entries
//! accumulate for the lifetime of the process; a re-fetch overwrites, and the
//! invalidation hooks exist for long-lived processes.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;
use tracing::debug;

use super::{AccountKey, ActionsKey};
use crate::metrics::metrics;
use crate::types::{Account, ActionBatch, GenesisConstants, NetworkSnapshot};

/// A cached lookup result
///
/// `NotFound` is an explicit answer from the endpoint, distinct from a key
/// that was never fetched (which is simply absent from the cache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry<T> {
    Found(T),
    NotFound,
}

impl<T> CacheEntry<T> {
    pub fn found(self) -> Option<T> {
        match self {
            CacheEntry::Found(value) => Some(value),
            CacheEntry::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, CacheEntry::Found(_))
    }
}

impl<T> From<Option<T>> for CacheEntry<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => CacheEntry::Found(v),
            None => CacheEntry::NotFound,
        }
    }
}

/// Fetched accounts, network snapshots and action windows, keyed by endpoint
#[derive(Debug, Default)]
pub struct DataCache {
    accounts: DashMap<(String, AccountKey), CacheEntry<Account>>,
    networks: DashMap<String, NetworkSnapshot>,
    actions: DashMap<(String, ActionsKey), Vec<ActionBatch>>,
}

static GLOBAL_CACHE: Lazy<Arc<DataCache>> = Lazy::new(|| Arc::new(DataCache::new()));

impl DataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every network facade in this process
    pub fn global() -> Arc<DataCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    pub fn account(&self, endpoint: &str, key: &AccountKey) -> Option<CacheEntry<Account>> {
        let entry = self
            .accounts
            .get(&(endpoint.to_string(), key.clone()))
            .map(|e| e.value().clone());
        record_lookup(entry.is_some());
        entry
    }

    pub fn insert_account(&self, endpoint: &str, key: AccountKey, account: Option<Account>) {
        debug!(endpoint = %endpoint, key = %key, found = account.is_some(), "Caching account");
        self.accounts
            .insert((endpoint.to_string(), key), CacheEntry::from(account));
    }

    pub fn network(&self, endpoint: &str) -> Option<NetworkSnapshot> {
        let entry = self.networks.get(endpoint).map(|e| e.value().clone());
        record_lookup(entry.is_some());
        entry
    }

    pub fn genesis_constants(&self, endpoint: &str) -> Option<GenesisConstants> {
        self.networks
            .get(endpoint)
            .and_then(|e| e.value().genesis.clone())
    }

    pub fn insert_network(&self, endpoint: &str, snapshot: NetworkSnapshot) {
        debug!(
            endpoint = %endpoint,
            blockchain_length = snapshot.state.blockchain_length,
            "Caching network state"
        );
        self.networks.insert(endpoint.to_string(), snapshot);
    }

    pub fn actions(&self, endpoint: &str, key: &ActionsKey) -> Option<Vec<ActionBatch>> {
        let entry = self
            .actions
            .get(&(endpoint.to_string(), key.clone()))
            .map(|e| e.value().clone());
        record_lookup(entry.is_some());
        entry
    }

    pub fn insert_actions(&self, endpoint: &str, key: ActionsKey, batches: Vec<ActionBatch>) {
        debug!(endpoint = %endpoint, key = %key, batches = batches.len(), "Caching actions");
        self.actions.insert((endpoint.to_string(), key), batches);
    }

    /// Drop everything fetched from one endpoint
    pub fn invalidate_endpoint(&self, endpoint: &str) {
        self.accounts.retain(|(e, _), _| e != endpoint);
        self.networks.remove(endpoint);
        self.actions.retain(|(e, _), _| e != endpoint);
    }

    pub fn clear(&self) {
        self.accounts.clear();
        self.networks.clear();
        self.actions.clear();
    }

    /// Total number of cached entries across all classes
    pub fn len(&self) -> usize {
        self.accounts.len() + self.networks.len() + self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn record_lookup(hit: bool) {
    if hit {
        metrics().cache_hits.inc();
    } else {
        metrics().cache_misses.inc();
    }
}
