//! Lifecycle events of one build or submission
//!
//! Every event carries the short trace id and the operation of the trace it
//! was created with, so a build's passes and a transaction's polls can be
//! grepped out of interleaved output.

use tracing::{debug, info, warn};

use crate::observability::TraceContext;

#[derive(Debug, Clone)]
pub struct TxLogger {
    trace: TraceContext,
    trace_tag: String,
}

impl TxLogger {
    pub fn new(trace: TraceContext) -> Self {
        let trace_tag = trace.trace_id.short();
        Self { trace, trace_tag }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn log_pass_started(&self, pass: usize, mode: &str) {
        debug!(trace = %self.trace_tag, pass, fetch_mode = %mode, "Running transaction logic");
    }

    pub fn log_build_complete(&self, updates: usize, passes: usize, latency_ms: u64) {
        info!(
            trace = %self.trace_tag,
            account_updates = updates,
            passes,
            latency_ms,
            "Transaction built"
        );
    }

    pub fn log_build_failure(&self, category: &str, error: &str) {
        warn!(
            trace = %self.trace_tag,
            category = %category,
            error = %error,
            elapsed_ms = self.trace.elapsed_ms(),
            "Transaction build failed"
        );
    }

    pub fn log_submitted(&self, hash: &str, success: bool, errors: usize) {
        info!(
            trace = %self.trace_tag,
            operation = %self.trace.operation,
            hash = %hash,
            success,
            errors,
            "Transaction submitted"
        );
    }

    pub fn log_poll(&self, hash: &str, attempt: u32, max_attempts: u32) {
        debug!(trace = %self.trace_tag, hash = %hash, attempt, max_attempts, "Polling transaction status");
    }

    pub fn log_outcome(&self, hash: &str, included: bool, errors: usize) {
        let elapsed_ms = self.trace.elapsed_ms();
        if included {
            info!(trace = %self.trace_tag, hash = %hash, elapsed_ms, "Transaction included");
        } else {
            warn!(trace = %self.trace_tag, hash = %hash, errors, elapsed_ms, "Transaction rejected");
        }
    }
}
