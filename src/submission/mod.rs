//! Submission and confirmation
//!
//! `submit` signs a built transaction, checks it against the local limits
//! and sends it. Transport failures do not fail the call: they are recorded
//! in the returned `PendingTransaction`, which still carries the computed
//! hash. `PendingTransaction::wait` then polls the status query in a bounded
//! loop until the transaction is included, rejected or the attempts run out.
//!
//! ```text
//! Pending ──wait──▶ Included
//!    │
//!    └─────wait──▶ Rejected
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::metrics::metrics;
use crate::observability::TraceContext;
use crate::rpc_manager::{FetchError, QueryTransport, TransactionStatus};
use crate::structured_logging::TxLogger;
use crate::tx_builder::{
    verify_transaction_limits, Transaction, TransactionBuilderError, TransactionLimits,
};
use crate::types::NetworkConstants;

pub mod errors;
pub mod funding;

pub use errors::{translate_failure_reason, RejectionError, RejectionRule, TransactionError};
pub use funding::{faucet, wait_for_funding, FundingOptions, DEFAULT_FAUCET_URL};

/// Where `wait` gets transaction statuses from
#[async_trait]
pub trait StatusSource: Send + Sync + fmt::Debug {
    async fn check_status(&self, hash: &str) -> Result<TransactionStatus, FetchError>;
}

/// Status query against a remote endpoint
#[derive(Debug)]
pub struct RemoteStatus {
    transport: Arc<dyn QueryTransport>,
    endpoint: String,
}

impl RemoteStatus {
    pub fn new(transport: Arc<dyn QueryTransport>, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl StatusSource for RemoteStatus {
    async fn check_status(&self, hash: &str) -> Result<TransactionStatus, FetchError> {
        self.transport
            .check_transaction_status(&self.endpoint, hash)
            .await
    }
}

/// A status known at submission time (local ledgers apply immediately)
#[derive(Debug, Clone)]
pub struct SettledStatus(pub TransactionStatus);

#[async_trait]
impl StatusSource for SettledStatus {
    async fn check_status(&self, _hash: &str) -> Result<TransactionStatus, FetchError> {
        Ok(self.0.clone())
    }
}

/// Polling parameters for `wait`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOptions {
    /// Status queries before giving up
    ///
    /// Zero is not "no limit": `wait` rejects with `MaxAttemptsExceeded`
    /// without polling. `ClientConfig::validate` refuses it in configs.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Sleep between polls in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    45
}

fn default_interval_ms() -> u64 {
    20_000
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl WaitOptions {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval_ms: interval.as_millis() as u64,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// A sent transaction whose fate is not known yet
#[derive(Debug, Clone)]
pub struct PendingTransaction {
    pub is_success: bool,
    /// Server response data, if any
    pub data: Option<Value>,
    pub errors: Vec<TransactionError>,
    pub transaction: Transaction,
    pub hash: String,
    constants: NetworkConstants,
    status: Arc<dyn StatusSource>,
    logger: TxLogger,
}

/// Terminal state: the transaction is on chain
#[derive(Debug, Clone)]
pub struct IncludedTransaction {
    pub transaction: Transaction,
    pub hash: String,
    pub data: Option<Value>,
}

/// Terminal state: the transaction will not be on chain
#[derive(Debug, Clone)]
pub struct RejectedTransaction {
    pub transaction: Transaction,
    pub hash: String,
    pub data: Option<Value>,
    pub errors: Vec<TransactionError>,
}

#[derive(Debug, Clone)]
pub enum TransactionOutcome {
    Included(IncludedTransaction),
    Rejected(RejectedTransaction),
}

impl TransactionOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            TransactionOutcome::Included(_) => "included",
            TransactionOutcome::Rejected(_) => "rejected",
        }
    }

    pub fn is_included(&self) -> bool {
        matches!(self, TransactionOutcome::Included(_))
    }

    pub fn hash(&self) -> &str {
        match self {
            TransactionOutcome::Included(tx) => &tx.hash,
            TransactionOutcome::Rejected(tx) => &tx.hash,
        }
    }

    /// Errors of a rejected transaction; empty when included
    pub fn errors(&self) -> &[TransactionError] {
        match self {
            TransactionOutcome::Included(_) => &[],
            TransactionOutcome::Rejected(tx) => &tx.errors,
        }
    }
}

impl PendingTransaction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transaction: Transaction,
        hash: String,
        data: Option<Value>,
        errors: Vec<TransactionError>,
        constants: NetworkConstants,
        status: Arc<dyn StatusSource>,
        logger: TxLogger,
    ) -> Self {
        Self {
            is_success: errors.is_empty(),
            data,
            errors,
            transaction,
            hash,
            constants,
            status,
            logger,
        }
    }

    pub fn to_json(&self) -> Result<Value, TransactionBuilderError> {
        self.transaction.to_json()
    }

    pub fn to_pretty(&self) -> Value {
        self.transaction.to_pretty()
    }

    /// Poll until the transaction is included or rejected
    ///
    /// Resolves immediately to `Rejected` if the submission itself failed.
    /// Otherwise polls up to `max_attempts` times, sleeping the full
    /// interval between polls. A transport error during a poll rejects
    /// without further attempts.
    pub async fn wait(self, options: WaitOptions) -> TransactionOutcome {
        if !self.is_success {
            let errors = self.errors.clone();
            return self.reject(errors);
        }

        let mut last_status = "none".to_string();
        for attempt in 1..=options.max_attempts {
            if attempt > 1 {
                tokio::time::sleep(options.interval()).await;
            }
            self.logger.log_poll(&self.hash, attempt, options.max_attempts);
            metrics().poll_attempts.inc();

            let status = match self.status.check_status(&self.hash).await {
                Ok(status) => status,
                Err(err) => return self.reject(vec![TransactionError::Transport(err)]),
            };

            // Reported failures win over the success flag
            if let Some(failures) = status.reported_failures() {
                let rejection =
                    translate_failure_reason(self.transaction.command(), failures, &self.constants);
                return self.reject(vec![TransactionError::Rejection(rejection)]);
            }
            if status.success {
                return self.include();
            }
            last_status = serde_json::to_string(&status).unwrap_or_else(|_| "unknown".to_string());
        }

        let error = TransactionError::MaxAttemptsExceeded {
            hash: self.hash.clone(),
            attempts: options.max_attempts,
            last_status,
        };
        self.reject(vec![error])
    }

    /// Like `wait`, but a rejection becomes an `Err`
    pub async fn wait_or_throw_if_error(
        self,
        options: WaitOptions,
    ) -> Result<IncludedTransaction, TransactionError> {
        match self.wait(options).await {
            TransactionOutcome::Included(included) => Ok(included),
            TransactionOutcome::Rejected(rejected) => Err(TransactionError::Rejected {
                hash: rejected.hash,
                errors: rejected.errors,
            }),
        }
    }

    fn include(self) -> TransactionOutcome {
        metrics().transactions_included.inc();
        self.logger.log_outcome(&self.hash, true, 0);
        TransactionOutcome::Included(IncludedTransaction {
            transaction: self.transaction,
            hash: self.hash,
            data: self.data,
        })
    }

    fn reject(self, errors: Vec<TransactionError>) -> TransactionOutcome {
        metrics().transactions_rejected.inc();
        self.logger.log_outcome(&self.hash, false, errors.len());
        TransactionOutcome::Rejected(RejectedTransaction {
            transaction: self.transaction,
            hash: self.hash,
            data: self.data,
            errors,
        })
    }
}

/// Sign, check limits and send a transaction to `endpoint`
///
/// Fails only for local problems (signing, limits, encoding); a failed send
/// yields a pending transaction with `is_success == false`. An accepted send
/// is polled under the hash the node returned; the locally computed hash is
/// kept only when the node gave none.
pub async fn submit(
    transport: Arc<dyn QueryTransport>,
    endpoint: &str,
    mut transaction: Transaction,
    limits: &TransactionLimits,
    constants: NetworkConstants,
) -> Result<PendingTransaction, TransactionBuilderError> {
    let logger = TxLogger::new(TraceContext::new("submit"));

    transaction.sign()?;
    verify_transaction_limits(&transaction, limits)?;
    let command = transaction.to_json()?;
    let local_hash = transaction.hash()?;

    metrics().submissions.inc();
    let (hash, data, errors) = match transport.send_transaction(endpoint, &command).await {
        Ok(response) => {
            let errors: Vec<TransactionError> = response
                .errors
                .iter()
                .map(|e| TransactionError::Submission(e.to_string()))
                .collect();
            let hash = match response.node_hash() {
                Some(node_hash) if errors.is_empty() => node_hash.to_string(),
                _ => local_hash,
            };
            (hash, response.data, errors)
        }
        Err(err) => (local_hash, None, vec![TransactionError::Transport(err)]),
    };
    if !errors.is_empty() {
        metrics().submission_failures.inc();
    }
    logger.log_submitted(&hash, errors.is_empty(), errors.len());

    Ok(PendingTransaction::new(
        transaction,
        hash,
        data,
        errors,
        constants,
        Arc::new(RemoteStatus::new(transport, endpoint)),
        logger,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc_manager::{FailureEntry, SendResponse};
    use crate::test_utils::{test_key, MockTransport};
    use crate::tx_builder::{AccountUpdate, FeePayer, FetchMode, ZkappCommand};
    use serde_json::json;
    use tokio::time::Instant;

    const ENDPOINT: &str = "https://node.test/graphql";

    fn transaction() -> Transaction {
        Transaction::new(
            ZkappCommand {
                fee_payer: FeePayer {
                    public_key: test_key(1),
                    fee: 100_000_000,
                    nonce: 0,
                    valid_until: None,
                    signature: None,
                },
                account_updates: vec![AccountUpdate::new(test_key(2)).with_balance_change(5)],
                memo: String::new(),
            },
            FetchMode::Cached,
            true,
        )
    }

    async fn pending(transport: &Arc<MockTransport>) -> PendingTransaction {
        submit(
            transport.clone(),
            ENDPOINT,
            transaction(),
            &TransactionLimits::default(),
            NetworkConstants::default(),
        )
        .await
        .unwrap()
    }

    fn fast() -> WaitOptions {
        WaitOptions::new(3, Duration::from_secs(20))
    }

    #[tokio::test]
    async fn test_submit_records_transport_failure() {
        let transport = Arc::new(MockTransport::new());
        transport.set_send_result(Err(FetchError::Transport {
            endpoint: ENDPOINT.into(),
            message: "connection reset".into(),
        }));

        let pending = pending(&transport).await;
        assert!(!pending.is_success);
        assert_eq!(pending.errors.len(), 1);
        assert!(!pending.hash.is_empty());

        let outcome = pending.wait(fast()).await;
        assert_eq!(outcome.status(), "rejected");
        assert_eq!(transport.status_calls(), 0);
    }

    fn node_accepted(hash: &str) -> SendResponse {
        SendResponse {
            data: Some(json!({ "sendZkapp": { "zkapp": { "hash": hash, "id": "1", "failureReason": null } } })),
            errors: vec![],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_under_node_hash() {
        let transport = Arc::new(MockTransport::new());
        transport.set_send_result(Ok(node_accepted("5JuNodeHash")));
        transport.push_status(Ok(TransactionStatus::unknown()));
        transport.push_status(Ok(TransactionStatus::included()));

        let local_hash = transaction().hash().unwrap();
        let pending = pending(&transport).await;
        assert!(pending.is_success);
        assert_eq!(pending.hash, "5JuNodeHash");
        assert_ne!(pending.hash, local_hash);

        let outcome = pending.wait(fast()).await;
        assert!(outcome.is_included());
        assert_eq!(outcome.hash(), "5JuNodeHash");
        assert_eq!(transport.polled_hashes(), vec!["5JuNodeHash", "5JuNodeHash"]);
    }

    #[tokio::test]
    async fn test_rejected_send_keeps_local_hash() {
        let transport = Arc::new(MockTransport::new());
        let mut response = node_accepted("5JuNodeHash");
        response.errors.push(json!({"message": "Invalid nonce"}));
        transport.set_send_result(Ok(response));

        let pending = pending(&transport).await;
        assert!(!pending.is_success);
        assert_eq!(pending.hash, transaction().hash().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_without_reasons_rejects_as_unknown() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(Ok(TransactionStatus::failed(vec![
            FailureEntry { index: 0, failures: vec![] },
            FailureEntry { index: 1, failures: vec![] },
        ])));

        let outcome = pending(&transport).await.wait(fast()).await;
        assert_eq!(transport.status_calls(), 1);
        match &outcome.errors()[0] {
            TransactionError::Rejection(rejection) => {
                assert_eq!(rejection.rule, RejectionRule::Unknown)
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_zero_attempts_rejects_without_polling() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(Ok(TransactionStatus::included()));

        let outcome = pending(&transport)
            .await
            .wait(WaitOptions::new(0, Duration::from_secs(20)))
            .await;
        assert_eq!(transport.status_calls(), 0);
        assert!(matches!(
            outcome.errors(),
            [TransactionError::MaxAttemptsExceeded { attempts: 0, .. }]
        ));
    }

    #[tokio::test]
    async fn test_graphql_errors_mark_submission_failed() {
        let transport = Arc::new(MockTransport::new());
        transport.set_send_result(Ok(SendResponse {
            data: None,
            errors: vec![json!({"message": "invalid signature"})],
        }));
        let pending = pending(&transport).await;
        assert!(!pending.is_success);
        assert!(pending.errors[0].to_string().contains("invalid signature"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_included_on_first_poll() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(Ok(TransactionStatus::included()));

        let start = Instant::now();
        let outcome = pending(&transport).await.wait(fast()).await;
        assert!(outcome.is_included());
        assert!(outcome.errors().is_empty());
        assert_eq!(transport.status_calls(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_after_max_attempts() {
        let transport = Arc::new(MockTransport::new());
        let start = Instant::now();
        let outcome = pending(&transport).await.wait(fast()).await;

        assert_eq!(transport.status_calls(), 3);
        assert!(start.elapsed() >= Duration::from_secs(40));
        match &outcome.errors()[0] {
            TransactionError::MaxAttemptsExceeded { hash, attempts, .. } => {
                assert_eq!(hash, outcome.hash());
                assert_eq!(*attempts, 3);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_transport_error_rejects_immediately() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(Ok(TransactionStatus::unknown()));
        transport.push_status(Err(FetchError::Timeout {
            endpoint: ENDPOINT.into(),
            timeout_ms: 100,
        }));

        let outcome = pending(&transport).await.wait(fast()).await;
        assert_eq!(transport.status_calls(), 2);
        assert!(matches!(outcome.errors()[0], TransactionError::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_take_precedence_over_success() {
        let transport = Arc::new(MockTransport::new());
        transport.push_status(Ok(TransactionStatus {
            success: true,
            failure_reason: Some(vec![FailureEntry {
                index: 0,
                failures: vec!["Source_insufficient_balance".into()],
            }]),
        }));

        let err = pending(&transport)
            .await
            .wait_or_throw_if_error(fast())
            .await
            .unwrap_err();
        match err {
            TransactionError::Rejected { errors, .. } => {
                assert!(matches!(
                    &errors[0],
                    TransactionError::Rejection(r) if r.rule == RejectionRule::InsufficientFunds
                ));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_limits_checked_before_sending() {
        let transport = Arc::new(MockTransport::new());
        let limits = TransactionLimits {
            max_account_updates: 0,
            ..TransactionLimits::default()
        };
        let result = submit(
            transport.clone(),
            ENDPOINT,
            transaction(),
            &limits,
            NetworkConstants::default(),
        )
        .await;
        assert!(matches!(
            result,
            Err(TransactionBuilderError::TransactionLimitsExceeded { .. })
        ));
        assert!(transport.sent_commands().is_empty());
    }

    #[test]
    fn test_wait_options_defaults() {
        let options = WaitOptions::default();
        assert_eq!(options.max_attempts, 45);
        assert_eq!(options.interval(), Duration::from_millis(20_000));
    }
}
