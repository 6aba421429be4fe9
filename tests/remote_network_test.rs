//! Remote network flows over a mocked GraphQL endpoint.

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use zkapp_client::network::{Chain, ChainView, Network, ResolvedEndpoints};
use zkapp_client::rpc_manager::{DataCache, EndpointSet, FetchError, GraphQlTransport, HttpConfig};
use zkapp_client::submission::{RejectionRule, TransactionError, WaitOptions};
use zkapp_client::tx_builder::{AccountUpdate, ContextSlot, FeePayerSpec, FetchMode, TxBuilder};
use zkapp_client::types::{Field, NetworkId, PublicKey, TokenId};
use zkapp_client::wallet::{Ed25519Signer, TransactionSigner};

const MINA: u64 = 1_000_000_000;

fn network_for(set: EndpointSet) -> Network {
    let transport = GraphQlTransport::new(HttpConfig {
        timeout_ms: 5_000,
        ..HttpConfig::default()
    })
    .unwrap()
    .with_endpoints(set.clone())
    .unwrap();
    Network::with_transport(
        ResolvedEndpoints {
            mina: set,
            archive: None,
            network_id: NetworkId::Testnet,
        },
        Arc::new(transport),
        Arc::new(DataCache::new()),
    )
    .with_context_slot(ContextSlot::new())
}

fn graphql_url(server: &ServerGuard) -> String {
    format!("{}/graphql", server.url())
}

fn account_json(public_key: &PublicKey, nonce: u32, balance: u64) -> serde_json::Value {
    json!({
        "publicKey": public_key.to_base58(),
        "token": "1",
        "nonce": nonce.to_string(),
        "balance": { "total": balance.to_string() },
        "zkappState": null
    })
}

fn status_json(hash: &str, failure_reason: serde_json::Value) -> String {
    json!({
        "data": {
            "bestChain": [
                { "transactions": { "zkappCommands": [
                    { "hash": hash, "failureReason": failure_reason }
                ] } }
            ]
        }
    })
    .to_string()
}

const NODE_HASH: &str = "5JuNodeHash";

fn send_ok() -> String {
    json!({ "data": { "sendZkapp": { "zkapp": { "hash": NODE_HASH, "id": "y", "failureReason": null } } } })
        .to_string()
}

fn poll_fast(max_attempts: u32) -> WaitOptions {
    WaitOptions::new(max_attempts, Duration::from_millis(10))
}

#[tokio::test]
async fn test_two_pass_build_fetches_once_and_sends() {
    let mut server = Server::new_async().await;
    let signer = Arc::new(Ed25519Signer::random());
    let sender = signer.public_key();

    let accounts = server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("query accounts".into()))
        .with_status(200)
        .with_body(json!({ "data": { "a0": account_json(&sender, 5, 40 * MINA) } }).to_string())
        .expect(1)
        .create_async()
        .await;
    let send = server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("sendZkapp".into()))
        .with_status(200)
        .with_body(send_ok())
        .expect(1)
        .create_async()
        .await;

    let network = network_for(EndpointSet::new(graphql_url(&server)));
    let mut passes = Vec::new();
    let tx = TxBuilder::new(&network)
        .build(FeePayerSpec::from(sender.clone()).with_fee(MINA / 10), |scope| {
            passes.push(scope.fetch_mode());
            let from = scope.sender()?;
            let account = scope.get_account(&from, &TokenId::native())?;
            let mut update = AccountUpdate::new(from).require_signature();
            update.set_app_state(0, Field::from(account.balance));
            scope.push(update);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(passes, vec![FetchMode::Test, FetchMode::Cached]);
    assert_eq!(tx.fee_payer().nonce, 5);
    assert_eq!(tx.account_updates()[0].app_state[0], Some(Field::from(40 * MINA)));
    accounts.assert_async().await;

    let pending = network
        .send_transaction(tx.with_signer(signer.clone()))
        .await
        .unwrap();
    assert!(pending.is_success, "{:?}", pending.errors);
    send.assert_async().await;

    let status = server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("transactionStatus".into()))
        .with_status(200)
        .with_body(status_json(&pending.hash, serde_json::Value::Null))
        .expect(1)
        .create_async()
        .await;

    let hash = pending.hash.clone();
    let included = pending.wait_or_throw_if_error(poll_fast(3)).await.unwrap();
    assert_eq!(included.hash, hash);
    status.assert_async().await;
    assert!(!network.context_slot().is_open());
}

#[tokio::test]
async fn test_wait_polls_under_hash_returned_by_node() {
    let mut server = Server::new_async().await;
    let signer = Arc::new(Ed25519Signer::random());
    server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("sendZkapp".into()))
        .with_status(200)
        .with_body(send_ok())
        .create_async()
        .await;
    // The node only knows the command under its own hash
    let status = server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("transactionStatus".into()))
        .with_status(200)
        .with_body(status_json(NODE_HASH, serde_json::Value::Null))
        .expect(1)
        .create_async()
        .await;

    let network = network_for(EndpointSet::new(graphql_url(&server)));
    let tx = TxBuilder::new(&network)
        .build(FeePayerSpec::from(signer.public_key()).with_nonce(2), |_| Ok(()))
        .await
        .unwrap();
    let local_hash = tx.hash().unwrap();

    let pending = network
        .send_transaction(tx.with_signer(signer.clone()))
        .await
        .unwrap();
    assert!(pending.is_success, "{:?}", pending.errors);
    assert_eq!(pending.hash, NODE_HASH);
    assert_ne!(local_hash, NODE_HASH);

    let included = pending.wait_or_throw_if_error(poll_fast(3)).await.unwrap();
    assert_eq!(included.hash, NODE_HASH);
    status.assert_async().await;
}

#[tokio::test]
async fn test_failover_to_fallback_on_server_error() {
    let mut primary = Server::new_async().await;
    let mut fallback = Server::new_async().await;
    let key = Ed25519Signer::random().public_key();

    let down = primary
        .mock("POST", "/graphql")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let up = fallback
        .mock("POST", "/graphql")
        .with_status(200)
        .with_body(json!({ "data": { "a0": account_json(&key, 0, MINA) } }).to_string())
        .expect(1)
        .create_async()
        .await;

    let network = network_for(
        EndpointSet::new(graphql_url(&primary)).with_fallback(graphql_url(&fallback)),
    );
    let account = network
        .fetch_account(&key, &TokenId::native())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.balance, MINA);

    down.assert_async().await;
    up.assert_async().await;

    // Cached under the primary endpoint, readable outside a transaction
    let cached = network.get_account(&key, &TokenId::native(), None).unwrap();
    assert_eq!(cached.balance, MINA);
}

#[tokio::test]
async fn test_graphql_errors_do_not_fail_over() {
    let mut primary = Server::new_async().await;
    let mut fallback = Server::new_async().await;
    let key = Ed25519Signer::random().public_key();

    primary
        .mock("POST", "/graphql")
        .with_status(200)
        .with_body(r#"{"errors":[{"message":"Invalid public key"}]}"#)
        .create_async()
        .await;
    let untouched = fallback
        .mock("POST", "/graphql")
        .expect(0)
        .create_async()
        .await;

    let network = network_for(
        EndpointSet::new(graphql_url(&primary)).with_fallback(graphql_url(&fallback)),
    );
    let err = network
        .fetch_account(&key, &TokenId::native())
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::GraphQl { ref message, .. } if message == "Invalid public key"));
    untouched.assert_async().await;
}

#[tokio::test]
async fn test_reported_failure_rejects_with_creation_fee_hint() {
    let mut server = Server::new_async().await;
    let signer = Arc::new(Ed25519Signer::random());
    let receiver = Ed25519Signer::random().public_key();

    server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("sendZkapp".into()))
        .with_status(200)
        .with_body(send_ok())
        .create_async()
        .await;

    let network = network_for(EndpointSet::new(graphql_url(&server)));
    let spec = FeePayerSpec::from(signer.public_key()).with_nonce(0).with_fee(MINA / 10);
    let tx = TxBuilder::new(&network)
        .build(spec, |scope| {
            let from = scope.sender()?;
            scope.push(
                AccountUpdate::new(from)
                    .with_balance_change(-(5 * MINA as i64))
                    .require_signature(),
            );
            scope.push(AccountUpdate::new(receiver.clone()).with_balance_change(5 * MINA as i64));
            Ok(())
        })
        .await
        .unwrap();

    let pending = network
        .send_transaction(tx.with_signer(signer.clone()))
        .await
        .unwrap();
    assert!(pending.is_success);

    let failures = json!([
        { "index": 0, "failures": [] },
        { "index": 1, "failures": ["Source_insufficient_balance"] },
        { "index": 2, "failures": ["Cancelled"] }
    ]);
    server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("transactionStatus".into()))
        .with_status(200)
        .with_body(status_json(&pending.hash, failures))
        .create_async()
        .await;

    let outcome = pending.wait(poll_fast(3)).await;
    assert_eq!(outcome.status(), "rejected");
    match &outcome.errors()[0] {
        TransactionError::Rejection(rejection) => {
            assert_eq!(rejection.rule, RejectionRule::InsufficientFunds);
            assert_eq!(rejection.index, 1);
            assert_eq!(rejection.public_key, Some(signer.public_key()));
            assert!(rejection.message.contains("account creation fee of 1 MINA"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_status_exhausts_attempts() {
    let mut server = Server::new_async().await;
    let signer = Arc::new(Ed25519Signer::random());

    server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("sendZkapp".into()))
        .with_status(200)
        .with_body(send_ok())
        .create_async()
        .await;
    let polls = server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("transactionStatus".into()))
        .with_status(200)
        .with_body(json!({ "data": { "bestChain": [] } }).to_string())
        .expect(4)
        .create_async()
        .await;

    let network = network_for(EndpointSet::new(graphql_url(&server)));
    let tx = TxBuilder::new(&network)
        .build(
            FeePayerSpec::from(signer.public_key()).with_nonce(1),
            |_| Ok(()),
        )
        .await
        .unwrap();
    let pending = network
        .send_transaction(tx.with_signer(signer.clone()))
        .await
        .unwrap();
    let hash = pending.hash.clone();

    let err = pending.wait_or_throw_if_error(poll_fast(4)).await.unwrap_err();
    let text = err.to_string();
    assert!(text.contains(&format!("Exceeded max attempts.\nTransactionId: {}", hash)), "{text}");
    polls.assert_async().await;
}

#[tokio::test]
async fn test_failed_send_rejects_without_polling() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("sendZkapp".into()))
        .with_status(500)
        .create_async()
        .await;
    let polls = server
        .mock("POST", "/graphql")
        .match_body(Matcher::Regex("transactionStatus".into()))
        .expect(0)
        .create_async()
        .await;

    let signer = Arc::new(Ed25519Signer::random());
    let network = network_for(EndpointSet::new(graphql_url(&server)));
    let tx = TxBuilder::new(&network)
        .build(FeePayerSpec::from(signer.public_key()).with_nonce(0), |_| Ok(()))
        .await
        .unwrap();

    let pending = network
        .send_transaction(tx.with_signer(signer.clone()))
        .await
        .unwrap();
    assert!(!pending.is_success);
    assert!(!pending.hash.is_empty());

    let outcome = pending.wait(WaitOptions::default()).await;
    assert!(matches!(
        outcome.errors(),
        [TransactionError::Transport(FetchError::HttpStatus { status: 500, .. })]
    ));
    polls.assert_async().await;
}

#[tokio::test]
async fn test_malformed_options_rejected() {
    assert!(Network::new("localhost:3085").is_err());

    let options = zkapp_client::network::NetworkOptions::Detailed {
        mina: zkapp_client::network::EndpointList::Many(vec![]),
        archive: None,
        network_id: None,
    };
    let err = Network::new(options).unwrap_err();
    assert!(err.to_string().contains("malformed input"));
}
