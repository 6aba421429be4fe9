//! The built transaction: canonical command plus signing state
//!
//! `Transaction` is what a build returns and what submission consumes. The
//! command serializes with `serde_json`; that JSON is the form used for
//! hashing, printing and sending.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::account_update::{AccountUpdate, Authorization, FeePayer, ZkappCommand};
use super::context::FetchMode;
use super::errors::TransactionBuilderError;
use crate::types::PublicKey;
use crate::wallet::TransactionSigner;

/// A built transaction
#[derive(Clone)]
pub struct Transaction {
    command: ZkappCommand,
    fetch_mode: FetchMode,
    is_final_run_outside_circuit: bool,
    signers: Vec<Arc<dyn TransactionSigner>>,
}

impl Transaction {
    pub fn new(command: ZkappCommand, fetch_mode: FetchMode, is_final_run_outside_circuit: bool) -> Self {
        Self {
            command,
            fetch_mode,
            is_final_run_outside_circuit,
            signers: Vec::new(),
        }
    }

    /// Decode a canonical JSON command
    ///
    /// The result is treated as a replayed transaction: it is final outside
    /// the circuit unless an update still owes a proof.
    pub fn from_json(json: &str) -> Result<Self, TransactionBuilderError> {
        let command: ZkappCommand = serde_json::from_str(json)
            .map_err(|e| TransactionBuilderError::Codec(e.to_string()))?;
        let is_final = !command.has_lazy_proof();
        Ok(Self::new(command, FetchMode::Cached, is_final))
    }

    pub fn command(&self) -> &ZkappCommand {
        &self.command
    }

    pub fn fee_payer(&self) -> &FeePayer {
        &self.command.fee_payer
    }

    pub fn account_updates(&self) -> &[AccountUpdate] {
        &self.command.account_updates
    }

    pub fn fetch_mode(&self) -> FetchMode {
        self.fetch_mode
    }

    pub fn is_final_run_outside_circuit(&self) -> bool {
        self.is_final_run_outside_circuit
    }

    pub fn has_lazy_proof(&self) -> bool {
        self.command.has_lazy_proof()
    }

    /// Canonical JSON value
    pub fn to_json(&self) -> Result<Value, TransactionBuilderError> {
        serde_json::to_value(&self.command).map_err(|e| TransactionBuilderError::Codec(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, TransactionBuilderError> {
        serde_json::to_string(&self.command)
            .map_err(|e| TransactionBuilderError::Codec(e.to_string()))
    }

    /// Size of the canonical JSON in bytes
    pub fn encoded_len(&self) -> Result<usize, TransactionBuilderError> {
        self.to_json_string().map(|s| s.len())
    }

    /// Short human-readable form: one entry for the fee payer, one per update
    pub fn to_pretty(&self) -> Value {
        let fee_payer = &self.command.fee_payer;
        let mut entries = vec![json!({
            "label": "feePayer",
            "publicKey": fee_payer.public_key.to_string(),
            "fee": fee_payer.fee.to_string(),
            "nonce": fee_payer.nonce.to_string(),
            "authorization": if fee_payer.signature.is_some() { "signed" } else { "unsigned" },
        })];

        for update in &self.command.account_updates {
            let mut entry = json!({
                "label": update.label,
                "publicKey": update.public_key.to_string(),
                "authorization": authorization_kind(&update.authorization),
            });
            if let Value::Object(map) = &mut entry {
                if update.token_id != Default::default() {
                    map.insert("tokenId".into(), json!(update.token_id.to_string()));
                }
                if update.balance_change != 0 {
                    map.insert("balanceChange".into(), json!(update.balance_change.to_string()));
                }
                if update.increment_nonce {
                    map.insert("incrementNonce".into(), json!(true));
                }
                let writes: Vec<Value> = update
                    .app_state
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| v.as_ref().map(|v| json!({ "index": i, "value": v.to_string() })))
                    .collect();
                if !writes.is_empty() {
                    map.insert("appState".into(), Value::Array(writes));
                }
                if !update.actions.is_empty() {
                    map.insert("actions".into(), json!(update.actions.len()));
                }
                if !update.events.is_empty() {
                    map.insert("events".into(), json!(update.events.len()));
                }
            }
            entries.push(entry);
        }
        Value::Array(entries)
    }

    /// Local hash: SHA-256 of the canonical JSON, base58 encoded
    ///
    /// A node indexes an accepted command under its own hash, which replaces
    /// this one once a send succeeds.
    pub fn hash(&self) -> Result<String, TransactionBuilderError> {
        let bytes = serde_json::to_vec(&self.command)
            .map_err(|e| TransactionBuilderError::Codec(e.to_string()))?;
        Ok(bs58::encode(Sha256::digest(&bytes)).into_string())
    }

    /// Bytes covered by every signature
    ///
    /// Signatures are blanked out so that signing is order independent and
    /// a signed command yields the same message as its unsigned form.
    pub fn signing_message(&self) -> Result<Vec<u8>, TransactionBuilderError> {
        let mut unsigned = self.command.clone();
        unsigned.fee_payer.signature = None;
        for update in &mut unsigned.account_updates {
            if update.authorization.is_signed() {
                update.authorization = Authorization::Signature(None);
            }
        }
        let bytes = serde_json::to_vec(&unsigned)
            .map_err(|e| TransactionBuilderError::Codec(e.to_string()))?;
        Ok(Sha256::digest(&bytes).to_vec())
    }

    /// Attach a key used by `sign`
    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.add_signer(signer);
        self
    }

    pub fn add_signer(&mut self, signer: Arc<dyn TransactionSigner>) {
        let key = signer.public_key();
        if !self.signers.iter().any(|s| s.public_key() == key) {
            self.signers.push(signer);
        }
    }

    /// Sign the fee payer and every signature-authorized update whose key is
    /// attached; returns how many signatures were written
    pub fn sign(&mut self) -> Result<usize, TransactionBuilderError> {
        if self.signers.is_empty() {
            return Ok(0);
        }
        let message = self.signing_message()?;
        let mut written = 0;

        if let Some(signer) = self.signer_for(&self.command.fee_payer.public_key) {
            self.command.fee_payer.signature = Some(signer.sign(&message)?);
            written += 1;
        }

        for i in 0..self.command.account_updates.len() {
            let update = &self.command.account_updates[i];
            if !update.authorization.is_signed() {
                continue;
            }
            if let Some(signer) = self.signer_for(&update.public_key) {
                let signature = signer.sign(&message)?;
                self.command.account_updates[i].authorization =
                    Authorization::Signature(Some(signature));
                written += 1;
            }
        }

        debug!(signatures = written, "Transaction signed");
        Ok(written)
    }

    /// Keys that still owe a signature
    pub fn missing_signatures(&self) -> Vec<PublicKey> {
        let mut missing = Vec::new();
        if self.command.fee_payer.signature.is_none() {
            missing.push(self.command.fee_payer.public_key.clone());
        }
        for update in &self.command.account_updates {
            if matches!(
                update.authorization,
                Authorization::LazySignature | Authorization::Signature(None)
            ) && !missing.contains(&update.public_key)
            {
                missing.push(update.public_key.clone());
            }
        }
        missing
    }

    fn signer_for(&self, key: &PublicKey) -> Option<Arc<dyn TransactionSigner>> {
        self.signers
            .iter()
            .find(|s| &s.public_key() == key)
            .cloned()
    }
}

fn authorization_kind(authorization: &Authorization) -> &'static str {
    match authorization {
        Authorization::None => "none",
        Authorization::Signature(Some(_)) => "signed",
        Authorization::Signature(None) | Authorization::LazySignature => "signature pending",
        Authorization::Proof(_) => "proved",
        Authorization::LazyProof { .. } => "proof pending",
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("command", &self.command)
            .field("fetch_mode", &self.fetch_mode)
            .field("is_final_run_outside_circuit", &self.is_final_run_outside_circuit)
            .field("signers", &self.signers.len())
            .finish()
    }
}
