//! GraphQL transport with ordered failover across endpoint sets
//!
//! Each data class (query node, archive) is configured as an `EndpointSet`:
//! one primary plus fallbacks tried in order. A request only moves to the
//! next endpoint on transport-class failures; a server that answered with a
//! GraphQL error list is authoritative.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::graphql;
use super::rpc_config::{validate_url, HttpConfig};
use super::{
    AccountKey, ActionsKey, FetchError, QueryTransport, SendResponse, TransactionStatus,
};
use crate::types::{Account, ActionBatch, EventBatch, EventFilter, NetworkSnapshot, PublicKey, TokenId};

/// A primary endpoint and its ordered fallbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSet {
    pub primary: String,
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl EndpointSet {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            fallbacks: Vec::new(),
        }
    }

    /// First entry becomes the primary, the rest are fallbacks
    pub fn from_list(urls: Vec<String>) -> Result<Self, FetchError> {
        let mut iter = urls.into_iter();
        let primary = iter
            .next()
            .ok_or_else(|| FetchError::Configuration("empty endpoint list".to_string()))?;
        Ok(Self {
            primary,
            fallbacks: iter.collect(),
        })
    }

    pub fn with_fallback(mut self, url: impl Into<String>) -> Self {
        self.fallbacks.push(url.into());
        self
    }

    /// Primary first, then fallbacks in configuration order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.fallbacks.iter().map(String::as_str))
    }

    pub fn validate(&self) -> Result<(), FetchError> {
        for url in self.iter() {
            validate_url(url).map_err(FetchError::Configuration)?;
        }
        Ok(())
    }
}

/// Request counters for one endpoint
#[derive(Debug, Default)]
pub struct EndpointStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    consecutive_failures: AtomicU64,
}

impl EndpointStats {
    fn record(&self, success: bool) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
            self.consecutive_failures.store(0, Ordering::Relaxed);
        } else {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        self.successful_requests.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// `QueryTransport` over JSON-encoded GraphQL HTTP requests
#[derive(Debug)]
pub struct GraphQlTransport {
    client: reqwest::Client,
    config: HttpConfig,
    sets: Vec<EndpointSet>,
    stats: DashMap<String, Arc<EndpointStats>>,
}

impl GraphQlTransport {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| FetchError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            config,
            sets: Vec::new(),
            stats: DashMap::new(),
        })
    }

    /// Register an endpoint set; requests addressed to its primary fail over
    /// to its fallbacks
    pub fn with_endpoints(mut self, set: EndpointSet) -> Result<Self, FetchError> {
        set.validate()?;
        self.sets.retain(|s| s.primary != set.primary);
        self.sets.push(set);
        Ok(self)
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    pub fn stats(&self, url: &str) -> Option<Arc<EndpointStats>> {
        self.stats.get(url).map(|s| Arc::clone(s.value()))
    }

    fn candidates<'a>(&'a self, endpoint: &'a str) -> Vec<&'a str> {
        match self.sets.iter().find(|s| s.primary == endpoint) {
            Some(set) => set.iter().collect(),
            None => vec![endpoint],
        }
    }

    fn record(&self, url: &str, success: bool) {
        self.stats
            .entry(url.to_string())
            .or_default()
            .value()
            .record(success);
    }

    async fn post_once(&self, url: &str, body: &Value) -> Result<Value, FetchError> {
        let mut request = self.client.post(url).json(body);
        if let Some(credentials) = &self.config.credentials {
            request = request.bearer_auth(credentials);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url, self.config.timeout_ms))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                endpoint: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::from_reqwest(e, url, self.config.timeout_ms))
    }

    /// POST `body` to `endpoint`, failing over on transport-class errors
    ///
    /// Returns the raw response together with the URL that answered.
    async fn post(&self, endpoint: &str, body: Value) -> Result<(String, Value), FetchError> {
        let candidates = self.candidates(endpoint);
        let mut last_error = FetchError::NoEndpoint("query");

        for (attempt, url) in candidates.iter().enumerate() {
            let start = Instant::now();
            match self.post_once(url, &body).await {
                Ok(value) => {
                    self.record(url, true);
                    debug!(
                        url = %url,
                        latency_ms = start.elapsed().as_millis() as u64,
                        "GraphQL request succeeded"
                    );
                    return Ok((url.to_string(), value));
                }
                Err(err) => {
                    self.record(url, false);
                    let has_next = attempt + 1 < candidates.len();
                    if err.should_fail_over() && has_next {
                        warn!(url = %url, error = %err, "Endpoint failed, trying next fallback");
                        last_error = err;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Err(last_error)
    }

    async fn query(&self, endpoint: &str, query: String) -> Result<(String, Value), FetchError> {
        let (url, response) = self.post(endpoint, json!({ "query": query })).await?;
        let data = graphql::take_data(&url, response)?;
        Ok((url, data))
    }
}

#[async_trait]
impl QueryTransport for GraphQlTransport {
    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn fetch_accounts(
        &self,
        endpoint: &str,
        keys: &[AccountKey],
    ) -> Result<Vec<Option<Account>>, FetchError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let (url, data) = self.query(endpoint, graphql::accounts_query(keys)).await?;
        graphql::parse_accounts(&url, &data, keys)
    }

    #[instrument(skip(self))]
    async fn fetch_network(&self, endpoint: &str) -> Result<NetworkSnapshot, FetchError> {
        let (url, data) = self
            .query(endpoint, graphql::network_query().to_string())
            .await?;
        graphql::parse_network(&url, &data)
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn fetch_actions(
        &self,
        archive_endpoint: &str,
        keys: &[ActionsKey],
    ) -> Result<Vec<Vec<ActionBatch>>, FetchError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let (url, data) = self
            .query(archive_endpoint, graphql::actions_query(keys))
            .await?;
        graphql::parse_actions(&url, &data, keys)
    }

    #[instrument(skip(self, filter), fields(public_key = %public_key))]
    async fn fetch_events(
        &self,
        archive_endpoint: &str,
        public_key: &PublicKey,
        token_id: &TokenId,
        filter: &EventFilter,
    ) -> Result<Vec<EventBatch>, FetchError> {
        let (url, data) = self
            .query(
                archive_endpoint,
                graphql::events_query(public_key, token_id, filter),
            )
            .await?;
        graphql::parse_events(&url, &data)
    }

    #[instrument(skip(self, command))]
    async fn send_transaction(
        &self,
        endpoint: &str,
        command: &Value,
    ) -> Result<SendResponse, FetchError> {
        let body = json!({
            "query": graphql::send_zkapp_mutation(),
            "variables": graphql::send_zkapp_variables(command),
        });
        // GraphQL errors are part of the answer here, not a transport failure
        let (url, response) = self.post(endpoint, body).await?;
        serde_json::from_value(response).map_err(|e| FetchError::Decode {
            endpoint: url,
            message: e.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn check_transaction_status(
        &self,
        endpoint: &str,
        hash: &str,
    ) -> Result<TransactionStatus, FetchError> {
        let (url, data) = self
            .query(
                endpoint,
                graphql::transaction_status_query(self.config.status_depth),
            )
            .await?;
        graphql::parse_transaction_status(&url, &data, hash)
    }
}
