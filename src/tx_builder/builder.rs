//! Two-pass transaction construction
//!
//! On a chain that needs prefetching, the logic runs twice:
//!
//! 1. speculative pass (`FetchMode::Test`): reads are marked and answered
//!    from cache or defaults,
//! 2. the chain fetches everything marked,
//! 3. replay pass (`FetchMode::Cached`): reads see the fetched data; this
//!    pass produces the transaction.
//!
//! Local chains run a single `FetchMode::Direct` pass. The logic must be a
//! pure function of what it reads through the scope; hidden side effects
//! between passes lead to diverging transactions.

use tracing::{debug, warn};

use super::account_update::{FeePayer, FeePayerSpec, ZkappCommand};
use super::context::{FetchMode, TransactionContext, TxScope};
use super::errors::TransactionBuilderError;
use super::output::Transaction;
use crate::metrics::{metrics, Timer};
use crate::network::{Chain, ChainView};
use crate::observability::TraceContext;
use crate::structured_logging::TxLogger;
use crate::types::{PublicKey, TokenId};

/// Builds transactions against one chain
#[derive(Debug)]
pub struct TxBuilder<'a, C: Chain> {
    chain: &'a C,
}

impl<'a, C: Chain> TxBuilder<'a, C> {
    pub fn new(chain: &'a C) -> Self {
        Self { chain }
    }

    /// Run `logic` and assemble the resulting transaction
    ///
    /// `fee_payer` is a `PublicKey` for the common case, or a full
    /// `FeePayerSpec` to set the fee, memo or an explicit nonce.
    pub async fn build<F>(
        &self,
        fee_payer: impl Into<FeePayerSpec>,
        mut logic: F,
    ) -> Result<Transaction, TransactionBuilderError>
    where
        F: FnMut(&mut TxScope<'_>) -> Result<(), TransactionBuilderError>,
    {
        let spec = fee_payer.into();
        let trace = TraceContext::new("build_transaction");
        let logger = TxLogger::new(trace.clone());
        let timer = Timer::new();
        metrics().builds_total.inc();

        let result = self.run(&spec, &trace, &logger, &mut logic).await;
        match result {
            Ok((transaction, passes)) => {
                timer.observe_duration(&metrics().build_latency);
                logger.log_build_complete(
                    transaction.account_updates().len(),
                    passes,
                    timer.elapsed_ms(),
                );
                Ok(transaction)
            }
            Err(err) => {
                metrics().builds_failed.inc();
                logger.log_build_failure(err.category(), &err.to_string());
                Err(err)
            }
        }
    }

    async fn run<F>(
        &self,
        spec: &FeePayerSpec,
        trace: &TraceContext,
        logger: &TxLogger,
        logic: &mut F,
    ) -> Result<(Transaction, usize), TransactionBuilderError>
    where
        F: FnMut(&mut TxScope<'_>) -> Result<(), TransactionBuilderError>,
    {
        if !self.chain.requires_prefetch() {
            logger.log_pass_started(1, FetchMode::Direct.as_str());
            let command = self.run_pass(spec, FetchMode::Direct, trace, logic)?;
            return Ok((self.finish(command, FetchMode::Direct), 1));
        }

        logger.log_pass_started(1, FetchMode::Test.as_str());
        let speculative = self.run_pass(spec, FetchMode::Test, trace, logic)?;

        let report = self.chain.fetch_missing_data().await;
        if !report.is_complete() {
            debug!(
                failures = report.failures.len(),
                "Fetch incomplete, replay pass will report the missing data"
            );
        }

        logger.log_pass_started(2, FetchMode::Cached.as_str());
        let replay = self.run_pass(spec, FetchMode::Cached, trace, logic)?;

        if speculative.account_updates.len() != replay.account_updates.len() {
            warn!(
                speculative = speculative.account_updates.len(),
                replay = replay.account_updates.len(),
                "Passes produced a different number of account updates"
            );
        }
        Ok((self.finish(replay, FetchMode::Cached), 2))
    }

    /// One pass: claim the context slot, run the logic, build the fee payer
    fn run_pass<F>(
        &self,
        spec: &FeePayerSpec,
        fetch_mode: FetchMode,
        trace: &TraceContext,
        logic: &mut F,
    ) -> Result<ZkappCommand, TransactionBuilderError>
    where
        F: FnMut(&mut TxScope<'_>) -> Result<(), TransactionBuilderError>,
    {
        let _guard = self
            .chain
            .context_slot()
            .open(spec.sender.clone(), fetch_mode)?;
        metrics().build_passes.inc();

        let chain: &dyn ChainView = self.chain;
        let mut context =
            TransactionContext::new(spec.clone(), fetch_mode, trace.child_span(fetch_mode.as_str()));
        logic(&mut TxScope::new(chain, &mut context))?;

        // Read through the facade so the sender is marked in speculative mode
        let nonce = match (spec.nonce, &spec.sender) {
            (Some(nonce), _) => nonce,
            (None, Some(sender)) => {
                chain
                    .get_account(sender, &TokenId::native(), Some(&context))?
                    .nonce
            }
            (None, None) => 0,
        };

        let fee_payer = FeePayer {
            public_key: spec.sender.clone().unwrap_or_else(PublicKey::empty),
            fee: spec.fee,
            nonce,
            valid_until: None,
            signature: None,
        };
        Ok(ZkappCommand {
            fee_payer,
            account_updates: context.into_account_updates(),
            memo: spec.memo.clone().unwrap_or_default(),
        })
    }

    fn finish(&self, command: ZkappCommand, fetch_mode: FetchMode) -> Transaction {
        let is_final = !(self.chain.proofs_enabled() && command.has_lazy_proof());
        Transaction::new(command, fetch_mode, is_final)
    }
}

/// Build a transaction on `chain` in one call
pub async fn transaction<C, F>(
    chain: &C,
    fee_payer: impl Into<FeePayerSpec>,
    logic: F,
) -> Result<Transaction, TransactionBuilderError>
where
    C: Chain,
    F: FnMut(&mut TxScope<'_>) -> Result<(), TransactionBuilderError>,
{
    TxBuilder::new(chain).build(fee_payer, logic).await
}
