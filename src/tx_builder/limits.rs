//! Local transaction size checks run before anything is sent
//!
//! The cost model weighs each account update by its authorization kind;
//! adjacent signed updates are paired two at a time. Every violated limit is
//! reported, not just the first.

use serde::{Deserialize, Serialize};

use super::errors::TransactionBuilderError;
use super::output::Transaction;
use crate::tx_builder::account_update::ZkappCommand;

pub const PROOF_COST: f64 = 10.26;
pub const SIGNED_PAIR_COST: f64 = 10.08;
pub const SIGNED_SINGLE_COST: f64 = 9.14;
pub const COST_LIMIT: f64 = 69.45;
pub const MAX_EVENT_ELEMENTS: usize = 100;
pub const MAX_ACTION_ELEMENTS: usize = 100;

/// Protocol maxima checked by `verify_transaction_limits`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLimits {
    #[serde(default = "default_cost_limit")]
    pub cost_limit: f64,
    #[serde(default = "default_max_event_elements")]
    pub max_event_elements: usize,
    #[serde(default = "default_max_action_elements")]
    pub max_action_elements: usize,
    /// Maximum account updates, fee payer excluded
    #[serde(default = "default_max_account_updates")]
    pub max_account_updates: usize,
    /// Maximum size of the canonical JSON command
    #[serde(default = "default_max_encoded_bytes")]
    pub max_encoded_bytes: usize,
}

fn default_cost_limit() -> f64 {
    COST_LIMIT
}

fn default_max_event_elements() -> usize {
    MAX_EVENT_ELEMENTS
}

fn default_max_action_elements() -> usize {
    MAX_ACTION_ELEMENTS
}

fn default_max_account_updates() -> usize {
    64
}

fn default_max_encoded_bytes() -> usize {
    512 * 1024
}

impl Default for TransactionLimits {
    fn default() -> Self {
        Self {
            cost_limit: default_cost_limit(),
            max_event_elements: default_max_event_elements(),
            max_action_elements: default_max_action_elements(),
            max_account_updates: default_max_account_updates(),
            max_encoded_bytes: default_max_encoded_bytes(),
        }
    }
}

/// Weighted cost of a command under the authorization cost model
///
/// Only adjacent non-proof updates pair up; a proof update between two of
/// them leaves both as singles.
pub fn transaction_cost(command: &ZkappCommand) -> f64 {
    let mut proofs = 0usize;
    let mut signed_single = 0usize;
    let mut signed_pair = 0usize;
    // A non-proof update still waiting for a neighbour
    let mut unpaired = false;

    for update in &command.account_updates {
        if update.authorization.is_proof() {
            proofs += 1;
            if unpaired {
                signed_single += 1;
                unpaired = false;
            }
        } else if unpaired {
            signed_pair += 1;
            unpaired = false;
        } else {
            unpaired = true;
        }
    }
    if unpaired {
        signed_single += 1;
    }

    proofs as f64 * PROOF_COST
        + signed_pair as f64 * SIGNED_PAIR_COST
        + signed_single as f64 * SIGNED_SINGLE_COST
}

/// Check `transaction` against `limits`, failing with every violation found
pub fn verify_transaction_limits(
    transaction: &Transaction,
    limits: &TransactionLimits,
) -> Result<(), TransactionBuilderError> {
    let command = transaction.command();
    let mut violations = Vec::new();

    let cost = transaction_cost(command);
    if cost >= limits.cost_limit {
        violations.push(format!(
            "cost {:.2} exceeds the limit of {:.2} (proofs, signed pairs and singles are weighted {}, {} and {})",
            cost, limits.cost_limit, PROOF_COST, SIGNED_PAIR_COST, SIGNED_SINGLE_COST
        ));
    }

    let events: usize = command.account_updates.iter().map(|u| u.event_elements()).sum();
    if events > limits.max_event_elements {
        violations.push(format!(
            "too many event elements: {} > {}",
            events, limits.max_event_elements
        ));
    }

    let actions: usize = command.account_updates.iter().map(|u| u.action_elements()).sum();
    if actions > limits.max_action_elements {
        violations.push(format!(
            "too many action elements: {} > {}",
            actions, limits.max_action_elements
        ));
    }

    let updates = command.account_updates.len();
    if updates > limits.max_account_updates {
        violations.push(format!(
            "too many account updates: {} > {}",
            updates, limits.max_account_updates
        ));
    }

    let encoded = transaction.encoded_len()?;
    if encoded > limits.max_encoded_bytes {
        violations.push(format!(
            "encoded transaction too large: {} bytes > {} bytes",
            encoded, limits.max_encoded_bytes
        ));
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(TransactionBuilderError::TransactionLimitsExceeded { violations })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx_builder::account_update::{AccountUpdate, Authorization, FeePayer};
    use crate::tx_builder::context::FetchMode;
    use crate::types::{Field, PublicKey};

    fn transaction(updates: Vec<AccountUpdate>) -> Transaction {
        let pk = PublicKey::from_bytes([1u8; 32]);
        Transaction::new(
            ZkappCommand {
                fee_payer: FeePayer {
                    public_key: pk,
                    fee: 0,
                    nonce: 0,
                    valid_until: None,
                    signature: None,
                },
                account_updates: updates,
                memo: String::new(),
            },
            FetchMode::Cached,
            true,
        )
    }

    fn proof_update() -> AccountUpdate {
        AccountUpdate::new(PublicKey::from_bytes([2u8; 32])).with_authorization(
            Authorization::LazyProof {
                method: "update".into(),
            },
        )
    }

    fn signed_update() -> AccountUpdate {
        AccountUpdate::new(PublicKey::from_bytes([3u8; 32])).require_signature()
    }

    #[test]
    fn test_cost_pairs_signed_updates() {
        let tx = transaction(vec![signed_update(), signed_update(), signed_update()]);
        let cost = transaction_cost(tx.command());
        assert!((cost - (SIGNED_PAIR_COST + SIGNED_SINGLE_COST)).abs() < 1e-9);
    }

    #[test]
    fn test_proof_between_signed_updates_breaks_pair() {
        let none = || AccountUpdate::new(PublicKey::from_bytes([4u8; 32]));
        let tx = transaction(vec![none(), proof_update(), none()]);
        let cost = transaction_cost(tx.command());
        assert!((cost - (PROOF_COST + 2.0 * SIGNED_SINGLE_COST)).abs() < 1e-9, "{cost}");

        // [signed, proof, signed, signed]: the trailing two still pair
        let tx = transaction(vec![signed_update(), proof_update(), signed_update(), signed_update()]);
        let cost = transaction_cost(tx.command());
        let expected = PROOF_COST + SIGNED_PAIR_COST + SIGNED_SINGLE_COST;
        assert!((cost - expected).abs() < 1e-9, "{cost}");
    }

    #[test]
    fn test_six_proofs_fit_seven_do_not() {
        let limits = TransactionLimits::default();
        assert!(verify_transaction_limits(&transaction(vec![proof_update(); 6]), &limits).is_ok());

        let err = verify_transaction_limits(&transaction(vec![proof_update(); 7]), &limits)
            .unwrap_err();
        match err {
            TransactionBuilderError::TransactionLimitsExceeded { violations } => {
                assert_eq!(violations.len(), 1);
                assert!(violations[0].starts_with("cost"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_all_violations_reported() {
        let mut update = signed_update();
        update.push_event(vec![Field::zero(); 101]);
        update.push_action(vec![Field::zero(); 101]);
        let limits = TransactionLimits {
            max_account_updates: 0,
            max_encoded_bytes: 10,
            ..TransactionLimits::default()
        };
        let err = verify_transaction_limits(&transaction(vec![update]), &limits).unwrap_err();
        match err {
            TransactionBuilderError::TransactionLimitsExceeded { violations } => {
                assert_eq!(violations.len(), 4);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_partial_limits_config() {
        let limits: TransactionLimits = toml::from_str("max_account_updates = 5").unwrap();
        assert_eq!(limits.max_account_updates, 5);
        assert_eq!(limits.max_event_elements, MAX_EVENT_ELEMENTS);
    }
}
