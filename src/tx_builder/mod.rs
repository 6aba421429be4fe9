//! Transaction Builder
//!
//! Assembles zkApp transactions whose logic reads chain state synchronously,
//! even though that state lives behind asynchronous endpoints.
//!
//! ## Architecture
//!
//! - **errors**: error taxonomy shared by builds and chain reads
//! - **account_update**: account updates, fee payer and the canonical command
//! - **context**: fetch modes, the per-chain context slot and `TxScope`
//! - **builder**: the two-pass build (speculative, fetch, replay)
//! - **output**: the built `Transaction`: JSON codec, hash, signing
//! - **limits**: local size and cost checks run before sending
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use zkapp_client::network::Network;
//! use zkapp_client::tx_builder::{AccountUpdate, TransactionBuilderError, TxBuilder};
//! use zkapp_client::types::{PublicKey, TokenId};
//!
//! # async fn example(sender: PublicKey) -> Result<(), TransactionBuilderError> {
//! let network = Network::new("https://api.minascan.io/node/devnet/v1/graphql")?;
//!
//! let tx = TxBuilder::new(&network)
//!     .build(sender, |scope| {
//!         let sender = scope.sender()?;
//!         let account = scope.get_account(&sender, &TokenId::native())?;
//!         let mut update = AccountUpdate::new(sender).require_signature();
//!         update.set_app_state(0, account.balance.into());
//!         scope.push(update);
//!         Ok(())
//!     })
//!     .await?;
//! println!("{}", tx.to_json_string()?);
//! # Ok(())
//! # }
//! ```

pub mod account_update;
pub mod builder;
pub mod context;
pub mod errors;
pub mod limits;
pub mod output;

pub use account_update::{
    AccountUpdate, Authorization, FeePayer, FeePayerSpec, ZkappCommand, APP_STATE_SLOTS,
};
pub use builder::{transaction, TxBuilder};
pub use context::{
    ContextGuard, ContextInfo, ContextSlot, FetchMode, TransactionContext, TxScope,
};
pub use errors::TransactionBuilderError;
pub use limits::{transaction_cost, verify_transaction_limits, TransactionLimits};
pub use output::Transaction;
