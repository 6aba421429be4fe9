//! GraphQL documents and response decoding for the query and archive endpoints
//!
//! Batched requests use aliases (`a0`, `a1`, ...) so that one HTTP round trip
//! answers a whole request class and results stay aligned with the keys.

use serde_json::{json, Value};

use super::{AccountKey, ActionsKey, FailureEntry, FetchError, TransactionStatus};
use crate::types::{
    Account, ActionBatch, EventBatch, EventFilter, Field, GenesisConstants, NetworkSnapshot,
    NetworkState, PublicKey, TokenId, ZkappAccount,
};

const ACCOUNT_FIELDS: &str = "publicKey token tokenSymbol nonce balance { total } \
delegateAccount { publicKey } zkappState actionState provedState \
verificationKey { hash } zkappUri";

pub fn accounts_query(keys: &[AccountKey]) -> String {
    let mut body = String::from("query accounts {\n");
    for (i, key) in keys.iter().enumerate() {
        body.push_str(&format!(
            "  a{}: account(publicKey: \"{}\", token: \"{}\") {{ {} }}\n",
            i, key.public_key, key.token_id, ACCOUNT_FIELDS
        ));
    }
    body.push('}');
    body
}

pub fn network_query() -> &'static str {
    "query networkState {
  bestChain(maxLength: 1) {
    protocolState {
      blockchainState { snarkedLedgerHash }
      consensusState { blockHeight slotSinceGenesis totalCurrency minWindowDensity }
    }
  }
  genesisConstants { genesisTimestamp accountCreationFee }
  daemonStatus { consensusConfiguration { slotDuration } }
}"
}

pub fn actions_query(keys: &[ActionsKey]) -> String {
    let mut body = String::from("query actions {\n");
    for (i, key) in keys.iter().enumerate() {
        let mut input = format!(
            "address: \"{}\", tokenId: \"{}\"",
            key.public_key, key.token_id
        );
        if let Some(from) = &key.action_states.from_action_state {
            input.push_str(&format!(", fromActionState: \"{}\"", from));
        }
        if let Some(end) = &key.action_states.end_action_state {
            input.push_str(&format!(", endActionState: \"{}\"", end));
        }
        body.push_str(&format!(
            "  a{}: actions(input: {{ {} }}) {{ actionState {{ actionStateOne }} actionData {{ data }} }}\n",
            i, input
        ));
    }
    body.push('}');
    body
}

pub fn events_query(public_key: &PublicKey, token_id: &TokenId, filter: &EventFilter) -> String {
    let mut input = format!("address: \"{}\", tokenId: \"{}\"", public_key, token_id);
    if let Some(from) = filter.from {
        input.push_str(&format!(", from: {}", from));
    }
    if let Some(to) = filter.to {
        input.push_str(&format!(", to: {}", to));
    }
    format!(
        "query events {{\n  events(input: {{ {} }}) {{ blockInfo {{ height stateHash }} eventData {{ data }} }}\n}}",
        input
    )
}

pub fn send_zkapp_mutation() -> &'static str {
    "mutation sendZkapp($input: SendZkappInput!) {
  sendZkapp(input: $input) { zkapp { hash id failureReason { index failures } } }
}"
}

pub fn send_zkapp_variables(command: &Value) -> Value {
    json!({ "input": { "zkappCommand": command } })
}

pub fn transaction_status_query(depth: u32) -> String {
    format!(
        "query transactionStatus {{\n  bestChain(maxLength: {}) {{ transactions {{ zkappCommands {{ hash failureReason {{ index failures }} }} }} }}\n}}",
        depth
    )
}

/// Split a GraphQL response into its `data` object, failing on an error list
pub fn take_data(endpoint: &str, mut response: Value) -> Result<Value, FetchError> {
    if let Some(errors) = response.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|e| {
                    e.get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| e.to_string())
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(FetchError::GraphQl {
                endpoint: endpoint.to_string(),
                message,
            });
        }
    }
    match response.get_mut("data").map(Value::take) {
        Some(data) if !data.is_null() => Ok(data),
        _ => Err(decode_error(endpoint, "response has no data")),
    }
}

pub fn parse_accounts(
    endpoint: &str,
    data: &Value,
    keys: &[AccountKey],
) -> Result<Vec<Option<Account>>, FetchError> {
    (0..keys.len())
        .map(|i| match data.get(format!("a{}", i)) {
            None | Some(Value::Null) => Ok(None),
            Some(raw) => parse_account(endpoint, raw).map(Some),
        })
        .collect()
}

fn parse_account(endpoint: &str, raw: &Value) -> Result<Account, FetchError> {
    let public_key = PublicKey::from_base58(str_field(endpoint, raw, "publicKey")?)
        .map_err(|e| decode_error(endpoint, e))?;
    let token_id = match raw.get("token").and_then(Value::as_str) {
        Some(token) => TokenId(Field::parse(token).map_err(|e| decode_error(endpoint, e))?),
        None => TokenId::native(),
    };
    let nonce = num_field(endpoint, raw, "nonce")?;
    let balance = raw
        .get("balance")
        .map(|b| num_field(endpoint, b, "total"))
        .transpose()?
        .unwrap_or(0);
    let delegate = raw
        .pointer("/delegateAccount/publicKey")
        .and_then(Value::as_str)
        .map(PublicKey::from_base58)
        .transpose()
        .map_err(|e| decode_error(endpoint, e))?;

    let zkapp = match raw.get("zkappState") {
        Some(Value::Array(state)) => Some(ZkappAccount {
            app_state: fields(endpoint, state)?,
            action_state: match raw.get("actionState") {
                Some(Value::Array(a)) => fields(endpoint, a)?,
                _ => Vec::new(),
            },
            proved_state: raw
                .get("provedState")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            verification_key_hash: raw
                .pointer("/verificationKey/hash")
                .and_then(Value::as_str)
                .map(Field::parse)
                .transpose()
                .map_err(|e| decode_error(endpoint, e))?,
            zkapp_uri: raw
                .get("zkappUri")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        _ => None,
    };

    Ok(Account {
        public_key,
        token_id,
        token_symbol: raw
            .get("tokenSymbol")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        nonce: u32::try_from(nonce).map_err(|e| decode_error(endpoint, e))?,
        balance,
        delegate,
        zkapp,
    })
}

pub fn parse_network(endpoint: &str, data: &Value) -> Result<NetworkSnapshot, FetchError> {
    let protocol = data
        .pointer("/bestChain/0/protocolState")
        .ok_or_else(|| decode_error(endpoint, "bestChain is empty"))?;
    let consensus = protocol
        .get("consensusState")
        .ok_or_else(|| decode_error(endpoint, "missing consensusState"))?;
    let ledger_hash = protocol
        .pointer("/blockchainState/snarkedLedgerHash")
        .and_then(Value::as_str)
        .map(Field::parse)
        .transpose()
        .map_err(|e| decode_error(endpoint, e))?
        .unwrap_or_default();

    let state = NetworkState {
        blockchain_length: small_num(endpoint, consensus, "blockHeight")?,
        global_slot_since_genesis: small_num(endpoint, consensus, "slotSinceGenesis")?,
        total_currency: num_field(endpoint, consensus, "totalCurrency")?,
        min_window_density: small_num(endpoint, consensus, "minWindowDensity")?,
        snarked_ledger_hash: ledger_hash,
    };

    let genesis = match data.get("genesisConstants") {
        Some(raw) if !raw.is_null() => Some(GenesisConstants {
            genesis_timestamp: str_field(endpoint, raw, "genesisTimestamp")?.to_string(),
            account_creation_fee: num_field(endpoint, raw, "accountCreationFee")?,
            slot_duration: match data.pointer("/daemonStatus/consensusConfiguration") {
                Some(config) => num_field(endpoint, config, "slotDuration")?,
                None => crate::types::DEFAULT_SLOT_TIME_MS,
            },
        }),
        _ => None,
    };

    Ok(NetworkSnapshot { state, genesis })
}

pub fn parse_actions(
    endpoint: &str,
    data: &Value,
    keys: &[ActionsKey],
) -> Result<Vec<Vec<ActionBatch>>, FetchError> {
    (0..keys.len())
        .map(|i| {
            let batches = match data.get(format!("a{}", i)) {
                Some(Value::Array(batches)) => batches,
                None | Some(Value::Null) => return Ok(Vec::new()),
                Some(_) => return Err(decode_error(endpoint, "actions is not a list")),
            };
            batches
                .iter()
                .map(|batch| {
                    let action_state = batch
                        .pointer("/actionState/actionStateOne")
                        .and_then(Value::as_str)
                        .ok_or_else(|| decode_error(endpoint, "missing actionState"))?;
                    let actions = match batch.get("actionData") {
                        Some(Value::Array(items)) => items
                            .iter()
                            .map(|item| strings(endpoint, item.get("data")))
                            .collect::<Result<Vec<_>, _>>()?,
                        _ => Vec::new(),
                    };
                    Ok(ActionBatch {
                        action_state: Field::parse(action_state)
                            .map_err(|e| decode_error(endpoint, e))?,
                        actions,
                    })
                })
                .collect()
        })
        .collect()
}

pub fn parse_events(endpoint: &str, data: &Value) -> Result<Vec<EventBatch>, FetchError> {
    let raw = match data.get("events") {
        Some(Value::Array(events)) => events,
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(_) => return Err(decode_error(endpoint, "events is not a list")),
    };
    raw.iter()
        .map(|batch| {
            let info = batch
                .get("blockInfo")
                .ok_or_else(|| decode_error(endpoint, "missing blockInfo"))?;
            let events = match batch.get("eventData") {
                Some(Value::Array(items)) => items
                    .iter()
                    .map(|item| strings(endpoint, item.get("data")))
                    .collect::<Result<Vec<_>, _>>()?,
                _ => Vec::new(),
            };
            Ok(EventBatch {
                block_height: small_num(endpoint, info, "height")?,
                block_hash: info
                    .get("stateHash")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                events,
            })
        })
        .collect()
}

/// Scan the best chain for `hash`
///
/// Found with a failure list is a failure, found without one is success,
/// and not found yet is reported as unknown.
pub fn parse_transaction_status(
    endpoint: &str,
    data: &Value,
    hash: &str,
) -> Result<TransactionStatus, FetchError> {
    let blocks = data
        .get("bestChain")
        .and_then(Value::as_array)
        .ok_or_else(|| decode_error(endpoint, "missing bestChain"))?;

    for block in blocks {
        let commands = match block.pointer("/transactions/zkappCommands") {
            Some(Value::Array(commands)) => commands,
            _ => continue,
        };
        for command in commands {
            if command.get("hash").and_then(Value::as_str) != Some(hash) {
                continue;
            }
            return match command.get("failureReason") {
                Some(Value::Array(entries)) if !entries.is_empty() => {
                    let entries = entries
                        .iter()
                        .map(|entry| {
                            Ok(FailureEntry {
                                index: usize::try_from(num_field(endpoint, entry, "index")?)
                                    .map_err(|e| decode_error(endpoint, e))?,
                                failures: strings(endpoint, entry.get("failures"))?,
                            })
                        })
                        .collect::<Result<Vec<_>, FetchError>>()?;
                    Ok(TransactionStatus::failed(entries))
                }
                _ => Ok(TransactionStatus::included()),
            };
        }
    }
    Ok(TransactionStatus::unknown())
}

fn decode_error(endpoint: &str, message: impl ToString) -> FetchError {
    FetchError::Decode {
        endpoint: endpoint.to_string(),
        message: message.to_string(),
    }
}

fn str_field<'a>(endpoint: &str, raw: &'a Value, name: &str) -> Result<&'a str, FetchError> {
    raw.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| decode_error(endpoint, format!("missing string field {}", name)))
}

/// Numbers arrive as JSON numbers or as decimal strings (UInt64 encoding)
fn num_field(endpoint: &str, raw: &Value, name: &str) -> Result<u64, FetchError> {
    match raw.get(name) {
        Some(Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| decode_error(endpoint, format!("{} is not an unsigned integer", name))),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| decode_error(endpoint, format!("{} is not an unsigned integer: {}", name, s))),
        _ => Err(decode_error(endpoint, format!("missing numeric field {}", name))),
    }
}

fn small_num(endpoint: &str, raw: &Value, name: &str) -> Result<u32, FetchError> {
    u32::try_from(num_field(endpoint, raw, name)?)
        .map_err(|_| decode_error(endpoint, format!("{} out of range", name)))
}

fn fields(endpoint: &str, raw: &[Value]) -> Result<Vec<Field>, FetchError> {
    raw.iter()
        .map(|v| match v {
            Value::String(s) => Field::parse(s).map_err(|e| decode_error(endpoint, e)),
            Value::Number(n) => n
                .as_u64()
                .map(Field::from)
                .ok_or_else(|| decode_error(endpoint, "field element is not an integer")),
            _ => Err(decode_error(endpoint, "field element is not a string")),
        })
        .collect()
}

fn strings(endpoint: &str, raw: Option<&Value>) -> Result<Vec<String>, FetchError> {
    match raw {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| decode_error(endpoint, "expected a list of strings"))
            })
            .collect(),
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(_) => Err(decode_error(endpoint, "expected a list")),
    }
}
