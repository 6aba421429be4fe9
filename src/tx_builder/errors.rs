//! Error types for transaction construction
//!
//! Usage errors (nested contexts, missing sender, bad configuration, limit
//! violations) are fatal and never retried. Missing-data errors surface at the
//! replay boundary and fail the build instead of falling back to defaults.

use thiserror::Error;

use crate::rpc_manager::FetchError;
use crate::types::{PublicKey, TokenId, TypeError};

/// Error type for every transaction builder operation
#[derive(Error, Debug, Clone)]
pub enum TransactionBuilderError {
    /// A transaction context is already open on this chain
    #[error("Cannot start a new transaction within another transaction")]
    NestedTransaction,

    /// A network-dependent operation was used outside a transaction
    #[error("{operation} is not available outside a transaction")]
    NoActiveTransaction {
        operation: &'static str,
    },

    /// The transaction block was opened without a sender
    #[error("The sender is not available, because the transaction block was created without the optional `sender` argument")]
    MissingSender,

    /// A replay read hit a key that was never fetched
    #[error("Missing fetched data for {key} (endpoint: {endpoint}); it was not marked during the speculative pass")]
    MissingFetchedData {
        endpoint: String,
        key: String,
    },

    /// The endpoint was asked, and the account or network state is not there
    #[error("{what} not found\nGraphql endpoint: {endpoint}")]
    AccountOrNetworkNotFound {
        what: String,
        endpoint: String,
    },

    /// Local validation rejected the transaction before it hit the network
    #[error("Transaction limits exceeded: {}", violations.join("; "))]
    TransactionLimitsExceeded {
        violations: Vec<String>,
    },

    #[error("Invalid builder setup: {0}")]
    Configuration(String),

    #[error("Could not sign transaction: {0}")]
    Signing(String),

    /// Malformed canonical JSON
    #[error("Codec error: {0}")]
    Codec(String),

    /// Operation the chain backend does not implement
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Remote query failure surfaced synchronously
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Invalid primitive value
    #[error(transparent)]
    InvalidValue(#[from] TypeError),

    /// Error raised by user transaction logic
    #[error("Transaction logic failed: {0}")]
    Logic(String),

    #[error("Builder invariant broken: {0}")]
    Internal(String),
}

impl TransactionBuilderError {
    /// Whether rebuilding might succeed without code changes
    pub fn is_retryable(&self) -> bool {
        match self {
            // A refetch may fill the gap
            Self::MissingFetchedData { .. } => true,
            Self::Fetch(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Label used in build failure logs
    pub fn category(&self) -> &'static str {
        match self {
            Self::NestedTransaction
            | Self::NoActiveTransaction { .. }
            | Self::MissingSender => "usage",
            Self::MissingFetchedData { .. } | Self::AccountOrNetworkNotFound { .. } => "fetch",
            Self::TransactionLimitsExceeded { .. } => "limits",
            Self::Configuration(_) => "config",
            Self::Signing(_) => "signing",
            Self::Codec(_) => "codec",
            Self::Unsupported(_) => "unsupported",
            Self::Fetch(_) => "transport",
            Self::InvalidValue(_) => "value",
            Self::Logic(_) => "logic",
            Self::Internal(_) => "internal",
        }
    }
}

impl TransactionBuilderError {
    pub fn account_not_found(public_key: &PublicKey, token_id: &TokenId, endpoint: &str) -> Self {
        Self::AccountOrNetworkNotFound {
            what: format!(
                "Account for public key {} (token id {})",
                public_key, token_id
            ),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn network_not_found(endpoint: &str) -> Self {
        Self::AccountOrNetworkNotFound {
            what: "Network state".to_string(),
            endpoint: endpoint.to_string(),
        }
    }

    pub fn missing_data(endpoint: &str, key: impl Into<String>) -> Self {
        Self::MissingFetchedData {
            endpoint: endpoint.to_string(),
            key: key.into(),
        }
    }

    pub fn logic(reason: impl Into<String>) -> Self {
        Self::Logic(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal(reason.into())
    }
}
