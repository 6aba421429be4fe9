//! Deferred fetching: record what a speculative pass touched, fetch it once
//!
//! Marks are idempotent; a key marked many times is requested once. Each
//! request class (accounts, network, actions) becomes at most one transport
//! call per endpoint, and the three classes are fetched concurrently.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{AccountKey, ActionsKey, DataCache, FetchError, QueryTransport};
use crate::metrics::metrics;

#[derive(Debug, Default)]
struct PendingRequests {
    accounts: HashMap<String, BTreeSet<AccountKey>>,
    networks: HashSet<String>,
    actions: HashMap<String, HashSet<ActionsKey>>,
}

/// Outcome of one `fetch_missing_data` round
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchReport {
    pub accounts_found: usize,
    pub accounts_not_found: usize,
    pub network_fetched: bool,
    pub action_windows: usize,
    /// Transport failures; the affected marks stay pending
    pub failures: Vec<FetchError>,
}

impl FetchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn requests_made(&self) -> bool {
        self.accounts_found + self.accounts_not_found > 0
            || self.network_fetched
            || self.action_windows > 0
            || !self.failures.is_empty()
    }
}

/// Collects fetch marks and resolves them into the data cache
#[derive(Debug)]
pub struct FetchCoordinator {
    transport: Arc<dyn QueryTransport>,
    cache: Arc<DataCache>,
    pending: Mutex<PendingRequests>,
}

impl FetchCoordinator {
    pub fn new(transport: Arc<dyn QueryTransport>, cache: Arc<DataCache>) -> Self {
        Self {
            transport,
            cache,
            pending: Mutex::new(PendingRequests::default()),
        }
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }

    pub fn transport(&self) -> &Arc<dyn QueryTransport> {
        &self.transport
    }

    pub fn mark_account_to_be_fetched(&self, key: AccountKey, endpoint: &str) {
        self.pending
            .lock()
            .accounts
            .entry(endpoint.to_string())
            .or_default()
            .insert(key);
    }

    pub fn mark_network_to_be_fetched(&self, endpoint: &str) {
        self.pending.lock().networks.insert(endpoint.to_string());
    }

    pub fn mark_actions_to_be_fetched(&self, key: ActionsKey, archive_endpoint: &str) {
        self.pending
            .lock()
            .actions
            .entry(archive_endpoint.to_string())
            .or_default()
            .insert(key);
    }

    /// Number of distinct marks waiting for a fetch
    pub fn pending_count(&self) -> usize {
        let pending = self.pending.lock();
        pending.accounts.values().map(BTreeSet::len).sum::<usize>()
            + pending.networks.len()
            + pending.actions.values().map(HashSet::len).sum::<usize>()
    }

    /// Fetch everything marked for `endpoint` / `archive_endpoint`
    ///
    /// Never fails as a whole: transport errors are reported in the
    /// `FetchReport` and leave the affected marks in place, so the replay pass
    /// reports the gap as missing data rather than reading a silent default.
    pub async fn fetch_missing_data(
        &self,
        endpoint: &str,
        archive_endpoint: Option<&str>,
    ) -> FetchReport {
        let start = Instant::now();

        let (account_keys, fetch_network, action_keys) = {
            let pending = self.pending.lock();
            let accounts: Vec<AccountKey> = pending
                .accounts
                .get(endpoint)
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default();
            let network = pending.networks.contains(endpoint);
            let actions: Vec<ActionsKey> = archive_endpoint
                .and_then(|archive| pending.actions.get(archive))
                .map(|keys| keys.iter().cloned().collect())
                .unwrap_or_default();
            (accounts, network, actions)
        };

        debug!(
            endpoint = %endpoint,
            accounts = account_keys.len(),
            network = fetch_network,
            action_windows = action_keys.len(),
            "Fetching missing data"
        );

        let accounts_fut = async {
            if account_keys.is_empty() {
                return None;
            }
            metrics().fetch_requests.inc();
            Some(self.transport.fetch_accounts(endpoint, &account_keys).await)
        };
        let network_fut = async {
            if !fetch_network {
                return None;
            }
            metrics().fetch_requests.inc();
            Some(self.transport.fetch_network(endpoint).await)
        };
        let actions_fut = async {
            match archive_endpoint {
                Some(archive) if !action_keys.is_empty() => {
                    metrics().fetch_requests.inc();
                    Some(self.transport.fetch_actions(archive, &action_keys).await)
                }
                _ => None,
            }
        };

        let (accounts, network, actions) = futures::join!(accounts_fut, network_fut, actions_fut);
        let mut report = FetchReport::default();

        match accounts {
            Some(Ok(results)) => {
                if results.len() != account_keys.len() {
                    report.failures.push(FetchError::Decode {
                        endpoint: endpoint.to_string(),
                        message: format!(
                            "expected {} accounts, got {}",
                            account_keys.len(),
                            results.len()
                        ),
                    });
                } else {
                    for (key, account) in account_keys.iter().zip(results) {
                        if account.is_some() {
                            report.accounts_found += 1;
                        } else {
                            report.accounts_not_found += 1;
                        }
                        self.cache.insert_account(endpoint, key.clone(), account);
                    }
                    let mut pending = self.pending.lock();
                    if let Some(keys) = pending.accounts.get_mut(endpoint) {
                        for key in &account_keys {
                            keys.remove(key);
                        }
                    }
                }
            }
            Some(Err(err)) => report.failures.push(err),
            None => {}
        }

        match network {
            Some(Ok(snapshot)) => {
                self.cache.insert_network(endpoint, snapshot);
                self.pending.lock().networks.remove(endpoint);
                report.network_fetched = true;
            }
            Some(Err(err)) => report.failures.push(err),
            None => {}
        }

        if let Some(archive) = archive_endpoint {
            match actions {
                Some(Ok(results)) if results.len() == action_keys.len() => {
                    for (key, batches) in action_keys.iter().zip(results) {
                        self.cache.insert_actions(archive, key.clone(), batches);
                        report.action_windows += 1;
                    }
                    let mut pending = self.pending.lock();
                    if let Some(keys) = pending.actions.get_mut(archive) {
                        for key in &action_keys {
                            keys.remove(key);
                        }
                    }
                }
                Some(Ok(results)) => report.failures.push(FetchError::Decode {
                    endpoint: archive.to_string(),
                    message: format!(
                        "expected {} action windows, got {}",
                        action_keys.len(),
                        results.len()
                    ),
                }),
                Some(Err(err)) => report.failures.push(err),
                None => {}
            }
        }

        metrics()
            .fetch_latency
            .observe(start.elapsed().as_secs_f64());

        if report.is_complete() {
            info!(
                endpoint = %endpoint,
                accounts_found = report.accounts_found,
                accounts_not_found = report.accounts_not_found,
                network = report.network_fetched,
                action_windows = report.action_windows,
                latency_ms = start.elapsed().as_millis() as u64,
                "Fetched missing data"
            );
        } else {
            for failure in &report.failures {
                metrics().fetch_failures.inc();
                warn!(endpoint = %endpoint, error = %failure, "Fetch failed, marks kept pending");
            }
        }

        report
    }
}
