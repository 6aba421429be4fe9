//! Testnet funding helpers
//!
//! `faucet` asks a faucet service to fund an address and then waits until
//! the account shows up on the network.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::errors::TransactionError;
use crate::network::Network;
use crate::rpc_manager::FetchError;
use crate::types::{PublicKey, TokenId};

pub const DEFAULT_FAUCET_URL: &str = "https://faucet.minaprotocol.com/api/v1/faucet";

/// Polling parameters for `wait_for_funding`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingOptions {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    30
}

fn default_interval_ms() -> u64 {
    30_000
}

impl Default for FundingOptions {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Request funds for `public_key` and wait until the account exists
pub async fn faucet(
    network: &Network,
    public_key: &PublicKey,
    network_name: &str,
    faucet_url: &str,
    options: FundingOptions,
) -> Result<(), TransactionError> {
    let address = public_key.to_string();
    let response = reqwest::Client::new()
        .post(faucet_url)
        .json(&json!({ "network": network_name, "address": address }))
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(e, faucet_url, 0))?;

    let body: Value = response
        .json()
        .await
        .map_err(|e| FetchError::from_reqwest(e, faucet_url, 0))?;
    let status = match body.get("status") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "missing".to_string(),
    };
    if status != "success" {
        return Err(TransactionError::Faucet { address, status });
    }

    info!(address = %address, network = %network_name, "Faucet accepted funding request");
    wait_for_funding(network, public_key, options).await
}

/// Poll the network until `public_key` has an account
///
/// Fetch errors count as "not funded yet"; the loop gives up after
/// `max_attempts` polls.
pub async fn wait_for_funding(
    network: &Network,
    public_key: &PublicKey,
    options: FundingOptions,
) -> Result<(), TransactionError> {
    for attempt in 1..=options.max_attempts {
        if attempt > 1 {
            tokio::time::sleep(Duration::from_millis(options.interval_ms)).await;
        }
        match network.fetch_account(public_key, &TokenId::native()).await {
            Ok(Some(account)) => {
                info!(address = %public_key, balance = account.balance, attempts = attempt, "Account funded");
                return Ok(());
            }
            Ok(None) => debug!(address = %public_key, attempt = attempt, "Account not funded yet"),
            Err(err) => warn!(address = %public_key, attempt = attempt, error = %err, "Funding check failed"),
        }
    }

    Err(TransactionError::FundingTimeout {
        address: public_key.to_string(),
        attempts: options.max_attempts,
    })
}
