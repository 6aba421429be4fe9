//! Benchmarks for transaction construction
//!
//! - Single direct pass against the local ledger
//! - Speculative pass, batched fetch and replay against a scripted transport
//! - Canonical JSON encoding and hashing of a built transaction
//! - Failure-reason translation

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

use zkapp_client::network::{LocalBlockchain, Network, ResolvedEndpoints};
use zkapp_client::rpc_manager::{DataCache, EndpointSet, FailureEntry};
use zkapp_client::submission::translate_failure_reason;
use zkapp_client::test_utils::{test_key, MockTransport};
use zkapp_client::tx_builder::{AccountUpdate, FeePayerSpec, TxBuilder};
use zkapp_client::types::{Account, Field, NetworkConstants, NetworkId, PublicKey, TokenId};

const UPDATE_COUNTS: &[usize] = &[1, 4, 16];

fn keys(count: usize) -> Vec<PublicKey> {
    (0..count).map(|i| test_key(i as u8 + 1)).collect()
}

fn remote_network(keys: &[PublicKey]) -> Network {
    let transport = Arc::new(MockTransport::new());
    for key in keys {
        transport.add_account(Account::new(key.clone(), TokenId::native(), 1_000));
    }
    Network::with_transport(
        ResolvedEndpoints {
            mina: EndpointSet::new("https://bench.test/graphql"),
            archive: None,
            network_id: NetworkId::Testnet,
        },
        transport,
        Arc::new(DataCache::new()),
    )
}

fn bench_local_build(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("local_build");

    for &count in UPDATE_COUNTS {
        let chain = LocalBlockchain::new();
        let keys = keys(count);
        for key in &keys {
            chain.add_account(Account::new(key.clone(), TokenId::native(), 1_000));
        }

        let chain = &chain;
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.to_async(&rt).iter(|| async move {
                let tx = TxBuilder::new(chain)
                    .build(FeePayerSpec::anonymous(), |scope| {
                        for key in keys {
                            let balance = scope.get_balance(key, &TokenId::native())?;
                            let mut update = AccountUpdate::new(key.clone());
                            update.set_app_state(0, Field::from(balance));
                            scope.push(update);
                        }
                        Ok(())
                    })
                    .await
                    .unwrap();
                black_box(tx)
            });
        });
    }
    group.finish();
}

fn bench_two_pass_build(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("two_pass_build");

    for &count in UPDATE_COUNTS {
        let keys = keys(count);
        let network = remote_network(&keys);

        let network = &network;
        group.bench_with_input(BenchmarkId::from_parameter(count), &keys, |b, keys| {
            b.to_async(&rt).iter(|| async move {
                let tx = TxBuilder::new(network)
                    .build(FeePayerSpec::anonymous(), |scope| {
                        for key in keys {
                            let account = scope.get_account(key, &TokenId::native())?;
                            scope.push(AccountUpdate::new(account.public_key));
                        }
                        Ok(())
                    })
                    .await
                    .unwrap();
                black_box(tx)
            });
        });
    }
    group.finish();
}

fn bench_encode_and_hash(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let chain = LocalBlockchain::new();
    let keys = keys(16);
    let tx = rt
        .block_on(TxBuilder::new(&chain).build(FeePayerSpec::anonymous(), |scope| {
            for key in &keys {
                let mut update = AccountUpdate::new(key.clone());
                update.push_event(vec![Field::from(1), Field::from(2)]);
                scope.push(update);
            }
            Ok(())
        }))
        .unwrap();

    c.bench_function("encode_and_hash_16_updates", |b| {
        b.iter(|| {
            let json = tx.to_json_string().unwrap();
            let hash = tx.hash().unwrap();
            black_box((json, hash))
        });
    });
}

fn bench_translate_failure(c: &mut Criterion) {
    let chain = LocalBlockchain::new();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let keys = keys(8);
    let tx = rt
        .block_on(TxBuilder::new(&chain).build(FeePayerSpec::anonymous(), |scope| {
            for key in &keys {
                scope.push(AccountUpdate::new(key.clone()).with_label("transfer"));
            }
            Ok(())
        }))
        .unwrap();

    let failures: Vec<FailureEntry> = (0..=8)
        .map(|index| FailureEntry {
            index,
            failures: match index {
                0 => vec![],
                5 => vec!["Source_insufficient_balance".to_string()],
                _ => vec!["Cancelled".to_string()],
            },
        })
        .collect();
    let constants = NetworkConstants::default();

    c.bench_function("translate_failure_reason", |b| {
        b.iter(|| black_box(translate_failure_reason(tx.command(), &failures, &constants)));
    });
}

criterion_group!(
    benches,
    bench_local_build,
    bench_two_pass_build,
    bench_encode_and_hash,
    bench_translate_failure
);
criterion_main!(benches);
