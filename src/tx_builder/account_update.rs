//! Account updates, fee payer and the canonical zkApp command
//!
//! `ZkappCommand` is the JSON artifact that gets hashed, signed and submitted.
//! Everything here derives serde so that `serde_json` acts as the codec.

use serde::{Deserialize, Serialize};

use crate::types::{Field, PublicKey, TokenId};

/// Number of on-chain app state slots per zkApp account
pub const APP_STATE_SLOTS: usize = 8;

/// Authorization attached to an account update
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum Authorization {
    #[default]
    None,
    /// Signed (or to be signed) by the account key
    Signature(Option<String>),
    /// A finished proof
    Proof(String),
    /// Signature requested; filled in when the transaction is signed
    LazySignature,
    /// Proof still owed by the named method
    LazyProof { method: String },
}

impl Authorization {
    /// True while a proof obligation is outstanding
    pub fn has_lazy_proof(&self) -> bool {
        matches!(self, Authorization::LazyProof { .. })
    }

    /// True when this update is authorized (or will be) by a signature
    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Authorization::Signature(_) | Authorization::LazySignature
        )
    }

    pub fn is_proof(&self) -> bool {
        matches!(
            self,
            Authorization::Proof(_) | Authorization::LazyProof { .. }
        )
    }
}

/// One operation against a single account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    pub public_key: PublicKey,
    pub token_id: TokenId,
    #[serde(default)]
    pub label: String,
    /// Signed balance delta in nanomina
    pub balance_change: i64,
    #[serde(default)]
    pub increment_nonce: bool,
    #[serde(default)]
    pub nonce_precondition: Option<u32>,
    #[serde(default)]
    pub app_state: Vec<Option<Field>>,
    #[serde(default)]
    pub actions: Vec<Vec<Field>>,
    #[serde(default)]
    pub events: Vec<Vec<Field>>,
    #[serde(default)]
    pub authorization: Authorization,
}

impl AccountUpdate {
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            token_id: TokenId::native(),
            label: String::new(),
            balance_change: 0,
            increment_nonce: false,
            nonce_precondition: None,
            app_state: vec![None; APP_STATE_SLOTS],
            actions: Vec::new(),
            events: Vec::new(),
            authorization: Authorization::None,
        }
    }

    pub fn with_token(mut self, token_id: TokenId) -> Self {
        self.token_id = token_id;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_balance_change(mut self, delta: i64) -> Self {
        self.balance_change = delta;
        self
    }

    pub fn with_nonce_precondition(mut self, nonce: u32) -> Self {
        self.nonce_precondition = Some(nonce);
        self
    }

    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = authorization;
        self
    }

    /// Request a signature and bump the account nonce
    pub fn require_signature(mut self) -> Self {
        self.authorization = Authorization::LazySignature;
        self.increment_nonce = true;
        self
    }

    /// Write one app state slot; out-of-range slots are ignored
    pub fn set_app_state(&mut self, index: usize, value: Field) {
        if index >= APP_STATE_SLOTS {
            return;
        }
        if self.app_state.len() < APP_STATE_SLOTS {
            self.app_state.resize(APP_STATE_SLOTS, None);
        }
        self.app_state[index] = Some(value);
    }

    pub fn push_action(&mut self, action: Vec<Field>) {
        self.actions.push(action);
    }

    pub fn push_event(&mut self, event: Vec<Field>) {
        self.events.push(event);
    }

    pub fn action_elements(&self) -> usize {
        self.actions.iter().map(Vec::len).sum()
    }

    pub fn event_elements(&self) -> usize {
        self.events.iter().map(Vec::len).sum()
    }
}

/// The fee paying account of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeePayer {
    pub public_key: PublicKey,
    pub fee: u64,
    pub nonce: u32,
    #[serde(default)]
    pub valid_until: Option<u32>,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Canonical transaction body: fee payer plus ordered account updates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkappCommand {
    pub fee_payer: FeePayer,
    pub account_updates: Vec<AccountUpdate>,
    #[serde(default)]
    pub memo: String,
}

impl ZkappCommand {
    pub fn has_lazy_proof(&self) -> bool {
        self.account_updates
            .iter()
            .any(|u| u.authorization.has_lazy_proof())
    }
}

/// Who pays for the transaction and how
///
/// Converts from a bare `PublicKey` so callers can write
/// `builder.build(sender, ...)` for the common case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeePayerSpec {
    pub sender: Option<PublicKey>,
    pub fee: u64,
    pub memo: Option<String>,
    /// Overrides the nonce read from the sender account
    pub nonce: Option<u32>,
}

impl FeePayerSpec {
    /// Build without a sender; the fee payer is an empty placeholder
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    pub fn with_nonce(mut self, nonce: u32) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

impl From<PublicKey> for FeePayerSpec {
    fn from(sender: PublicKey) -> Self {
        Self {
            sender: Some(sender),
            ..Self::default()
        }
    }
}

impl From<Option<PublicKey>> for FeePayerSpec {
    fn from(sender: Option<PublicKey>) -> Self {
        Self {
            sender,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_predicates() {
        assert!(Authorization::LazyProof { method: "m".into() }.has_lazy_proof());
        assert!(!Authorization::Proof("p".into()).has_lazy_proof());
        assert!(Authorization::LazySignature.is_signed());
        assert!(Authorization::Signature(None).is_signed());
        assert!(!Authorization::None.is_signed());
    }

    #[test]
    fn test_app_state_bounds() {
        let mut update = AccountUpdate::new(PublicKey::from_bytes([1u8; 32]));
        update.set_app_state(2, Field::from(9));
        update.set_app_state(APP_STATE_SLOTS, Field::from(1));
        assert_eq!(update.app_state[2], Some(Field::from(9)));
        assert_eq!(update.app_state.len(), APP_STATE_SLOTS);
    }

    #[test]
    fn test_command_json_shape() {
        let pk = PublicKey::from_bytes([2u8; 32]);
        let command = ZkappCommand {
            fee_payer: FeePayer {
                public_key: pk.clone(),
                fee: 100,
                nonce: 3,
                valid_until: None,
                signature: None,
            },
            account_updates: vec![AccountUpdate::new(pk).require_signature()],
            memo: "hello".to_string(),
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["feePayer"]["nonce"], 3);
        assert_eq!(json["accountUpdates"][0]["authorization"]["kind"], "lazySignature");
        assert_eq!(json["accountUpdates"][0]["tokenId"], "1");
    }
}
