//! zkApp client library
//!
//! Builds zkApp transactions against local or remote chains, sends them and
//! follows them until they are included or rejected.
//!
//! - `tx_builder`: the two-pass build and the transaction model
//! - `network`: the `Chain` facade, remote (`Network`) and in-memory
//!   (`LocalBlockchain`) implementations
//! - `rpc_manager`: GraphQL transport, data cache and fetch coordinator
//! - `submission`: pending/included/rejected lifecycle, failure translation
//!   and faucet funding

pub mod config;
pub mod metrics;
pub mod network;
pub mod observability;
#[path = "rpc manager/mod.rs"]
pub mod rpc_manager;
pub mod structured_logging;
pub mod submission;
pub mod test_utils;
pub mod tx_builder;
pub mod types;
pub mod wallet;

// Re-export commonly used types
pub use config::ClientConfig;
pub use network::{Chain, ChainView, LocalBlockchain, Network, NetworkOptions};
pub use submission::{
    PendingTransaction, TransactionError, TransactionOutcome, WaitOptions,
};
pub use tx_builder::{transaction, AccountUpdate, Transaction, TransactionBuilderError, TxBuilder};
pub use types::{Account, Field, NetworkId, PublicKey, TokenId};
