//! Property tests for fetch marks and the data cache.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

use zkapp_client::rpc_manager::{
    AccountKey, CacheEntry, DataCache, FetchCoordinator, GraphQlTransport, HttpConfig,
};
use zkapp_client::types::{Account, PublicKey, TokenId};

const NODE_A: &str = "https://a.test/graphql";
const NODE_B: &str = "https://b.test/graphql";

fn key(byte: u8) -> AccountKey {
    AccountKey::new(PublicKey::from_bytes([byte; 32]), TokenId::native())
}

fn coordinator() -> FetchCoordinator {
    // Marking never touches the transport
    let transport = GraphQlTransport::new(HttpConfig::default()).unwrap();
    FetchCoordinator::new(Arc::new(transport), Arc::new(DataCache::new()))
}

proptest! {
    #[test]
    fn marks_are_deduplicated(bytes in prop::collection::vec(1u8..20, 0..50), network_marks in 0usize..4) {
        let coordinator = coordinator();
        for byte in &bytes {
            coordinator.mark_account_to_be_fetched(key(*byte), NODE_A);
        }
        for _ in 0..network_marks {
            coordinator.mark_network_to_be_fetched(NODE_A);
        }

        let distinct: HashSet<u8> = bytes.iter().copied().collect();
        let expected = distinct.len() + usize::from(network_marks > 0);
        prop_assert_eq!(coordinator.pending_count(), expected);
    }

    #[test]
    fn same_key_on_other_endpoint_is_distinct(bytes in prop::collection::hash_set(1u8..20, 1..10)) {
        let coordinator = coordinator();
        for byte in &bytes {
            coordinator.mark_account_to_be_fetched(key(*byte), NODE_A);
            coordinator.mark_account_to_be_fetched(key(*byte), NODE_B);
        }
        prop_assert_eq!(coordinator.pending_count(), 2 * bytes.len());
    }

    #[test]
    fn cache_entries_are_scoped_by_endpoint(
        found in prop::collection::hash_set(1u8..40, 0..10),
        missing in prop::collection::hash_set(40u8..80, 0..10),
    ) {
        let cache = DataCache::new();
        for byte in &found {
            let account = Account::new(PublicKey::from_bytes([*byte; 32]), TokenId::native(), u64::from(*byte));
            cache.insert_account(NODE_A, key(*byte), Some(account));
        }
        for byte in &missing {
            cache.insert_account(NODE_A, key(*byte), None);
        }

        for byte in &found {
            match cache.account(NODE_A, &key(*byte)) {
                Some(CacheEntry::Found(account)) => prop_assert_eq!(account.balance, u64::from(*byte)),
                other => prop_assert!(false, "expected found, got {:?}", other),
            }
            prop_assert!(cache.account(NODE_B, &key(*byte)).is_none());
        }
        for byte in &missing {
            prop_assert!(matches!(cache.account(NODE_A, &key(*byte)), Some(CacheEntry::NotFound)));
        }

        cache.invalidate_endpoint(NODE_A);
        prop_assert!(cache.is_empty());
    }
}
