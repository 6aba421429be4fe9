//! Submission errors and translation of on-chain failure reasons
//!
//! The network reports a rejected command as one failure list per account
//! update (index 0 is the fee payer). `translate_failure_reason` turns that
//! payload into a single structured `RejectionError`; it is a pure function
//! of the command, the payload and the network constants.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::rpc_manager::{FailureEntry, FetchError};
use crate::tx_builder::ZkappCommand;
use crate::types::{NetworkConstants, PublicKey};

const NANOMINA_PER_MINA: u64 = 1_000_000_000;

/// The rule a rejected command violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionRule {
    InvalidFeeExcess,
    InsufficientFunds,
    AmountInsufficientToCreateAccount,
    Nonce,
    AppStatePrecondition,
    Precondition,
    Authorization,
    Cancelled,
    Unknown,
}

impl RejectionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFeeExcess => "invalid_fee_excess",
            Self::InsufficientFunds => "insufficient_funds",
            Self::AmountInsufficientToCreateAccount => "amount_insufficient_to_create_account",
            Self::Nonce => "nonce",
            Self::AppStatePrecondition => "app_state_precondition",
            Self::Precondition => "precondition",
            Self::Authorization => "authorization",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// Classify one raw failure string, e.g. `Source_insufficient_balance`
    pub fn classify(failure: &str) -> Self {
        let failure = failure.to_ascii_lowercase();
        if failure.contains("fee_excess") {
            Self::InvalidFeeExcess
        } else if failure.contains("insufficient_to_create") {
            Self::AmountInsufficientToCreateAccount
        } else if failure.contains("insufficient") {
            Self::InsufficientFunds
        } else if failure.contains("nonce") {
            Self::Nonce
        } else if failure.contains("app_state") {
            Self::AppStatePrecondition
        } else if failure.contains("precondition") {
            Self::Precondition
        } else if failure.contains("cancelled") {
            Self::Cancelled
        } else if failure.contains("permit")
            || failure.contains("signature")
            || failure.contains("proof")
        {
            Self::Authorization
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for RejectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A translated on-chain rejection
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("{message}")]
pub struct RejectionError {
    pub rule: RejectionRule,
    /// Position in the command; 0 is the fee payer
    pub index: usize,
    pub public_key: Option<PublicKey>,
    pub message: String,
    /// Raw failures reported for `index`
    pub failures: Vec<String>,
}

/// Failures of a submitted or polled transaction
///
/// Carried as data in pending and rejected results; only
/// `wait_or_throw_if_error` surfaces them as an `Err`.
#[derive(Debug, Clone, Error)]
pub enum TransactionError {
    #[error(transparent)]
    Transport(#[from] FetchError),

    /// GraphQL errors returned by the submission mutation
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error(transparent)]
    Rejection(#[from] RejectionError),

    #[error("Exceeded max attempts.\nTransactionId: {hash}\nAttempts: {attempts}\nLast received status: {last_status}")]
    MaxAttemptsExceeded {
        hash: String,
        attempts: u32,
        last_status: String,
    },

    #[error("Transaction failed with errors:\n{}", join_lines(errors))]
    Rejected {
        hash: String,
        errors: Vec<TransactionError>,
    },

    #[error("Error funding account {address}, got response status: {status}")]
    Faucet { address: String, status: String },

    #[error("Exceeded max attempts waiting for account {address} to be funded ({attempts} attempts)")]
    FundingTimeout { address: String, attempts: u32 },
}

fn join_lines(errors: &[TransactionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl TransactionError {
    /// Check if resubmitting or waiting again might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(err) => err.is_retryable(),
            Self::MaxAttemptsExceeded { .. } => true,
            Self::FundingTimeout { .. } => true,
            Self::Rejection(rejection) => rejection.rule == RejectionRule::Nonce,

            Self::Submission(_) => false,
            Self::Rejected { .. } => false,
            Self::Faucet { .. } => false,
        }
    }

    /// Get the error category for metrics and observability
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Submission(_) => "submission",
            Self::Rejection(_) => "rejection",
            Self::MaxAttemptsExceeded { .. } => "timeout",
            Self::Rejected { .. } => "rejected",
            Self::Faucet { .. } | Self::FundingTimeout { .. } => "funding",
        }
    }
}

/// Translate a network failure payload into a structured rejection
///
/// The primary failure is the fee payer's if it has one, otherwise the first
/// account update failing for a reason other than being cancelled.
pub fn translate_failure_reason(
    command: &ZkappCommand,
    failure_reason: &[FailureEntry],
    constants: &NetworkConstants,
) -> RejectionError {
    let meaningful = |entry: &&FailureEntry| {
        entry
            .failures
            .iter()
            .any(|f| RejectionRule::classify(f) != RejectionRule::Cancelled)
    };
    let primary = failure_reason
        .iter()
        .filter(meaningful)
        .find(|entry| entry.index == 0)
        .or_else(|| failure_reason.iter().find(meaningful))
        .or_else(|| failure_reason.iter().find(|entry| !entry.failures.is_empty()));

    let Some(entry) = primary else {
        return RejectionError {
            rule: RejectionRule::Unknown,
            index: 0,
            public_key: None,
            message: "Transaction rejected without a failure reason".to_string(),
            failures: Vec::new(),
        };
    };

    let rule = entry
        .failures
        .iter()
        .map(|f| RejectionRule::classify(f))
        .find(|rule| *rule != RejectionRule::Cancelled)
        .unwrap_or(RejectionRule::Cancelled);

    let public_key = match entry.index {
        0 => Some(command.fee_payer.public_key.clone()),
        i => command
            .account_updates
            .get(i - 1)
            .map(|update| update.public_key.clone()),
    };
    let label = match entry.index {
        0 => "the fee payer".to_string(),
        i => match command.account_updates.get(i - 1) {
            Some(update) if !update.label.is_empty() => {
                format!("account update {} ({})", i, update.label)
            }
            _ => format!("account update {}", i),
        },
    };
    let who = match &public_key {
        Some(pk) => format!("{} [{}]", label, pk),
        None => label,
    };
    let reasons = entry.failures.join(", ");
    let fee = format_mina(constants.account_creation_fee);

    let message = match rule {
        RejectionRule::InvalidFeeExcess => format!(
            "Invalid fee excess.\nThe balance changes of the transaction do not sum up to the fee.\nRemember that a new account costs an account creation fee of {} MINA, which is taken from its balance change.",
            fee
        ),
        RejectionRule::InsufficientFunds => format!(
            "Insufficient funds for {}: {}.\nMake sure the account holds enough MINA, including the account creation fee of {} MINA for every new account it funds.",
            who, reasons, fee
        ),
        RejectionRule::AmountInsufficientToCreateAccount => format!(
            "The amount sent to {} is too small to create the account: {}.\nCreating an account costs an account creation fee of {} MINA.",
            who, reasons, fee
        ),
        RejectionRule::Nonce => format!(
            "Nonce mismatch for {}: {}.\nThe account nonce changed since the transaction was built; rebuild it against fresh state.",
            who, reasons
        ),
        RejectionRule::AppStatePrecondition => format!(
            "App state precondition unsatisfied for {}: {}.",
            who, reasons
        ),
        RejectionRule::Precondition => format!("Precondition unsatisfied for {}: {}.", who, reasons),
        RejectionRule::Authorization => format!(
            "Authorization failed for {}: {}.\nCheck that the update is signed or proved as its permissions require.",
            who, reasons
        ),
        RejectionRule::Cancelled => format!("{} was cancelled: {}.", capitalize(&who), reasons),
        RejectionRule::Unknown => format!("Transaction rejected at {}: {}.", who, reasons),
    };

    RejectionError {
        rule,
        index: entry.index,
        public_key,
        message,
        failures: entry.failures.clone(),
    }
}

fn format_mina(nanomina: u64) -> String {
    let whole = nanomina / NANOMINA_PER_MINA;
    let frac = nanomina % NANOMINA_PER_MINA;
    if frac == 0 {
        whole.to_string()
    } else {
        format!("{}.{}", whole, format!("{:09}", frac).trim_end_matches('0'))
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
