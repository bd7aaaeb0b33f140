#![cfg(test)]

use crate::{
    JanusSSEError, MemoryStore, PipelineConfig, SearchConfig, SearchStrategy, Store,
    client::{ClientStores, JanusClient},
    server::{JanusServer, ServerStores},
    testing::{CountingPuncturable, FailingStore, FeistelPermutation, SlowStore, XorSharePuncturable},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::{collections::BTreeSet, sync::Arc, thread, time::Duration};
use test_case::test_case;

type Scheme = CountingPuncturable<XorSharePuncturable>;
type Client<S = MemoryStore> = JanusClient<S, FeistelPermutation, Scheme>;
type Server = JanusServer<MemoryStore, FeistelPermutation, Scheme>;

fn setup(strategy: SearchStrategy) -> (Client, Server, Scheme) {
    let client_stores = ClientStores {
        search_counters: MemoryStore::new(),
        insertion_states: MemoryStore::new(),
        deletion_states: MemoryStore::new(),
    };
    setup_with(client_stores, strategy)
}

fn setup_with<S: Store>(client_stores: ClientStores<S>, strategy: SearchStrategy) -> (Client<S>, Server, Scheme) {
    let mut rng = ChaCha8Rng::from_os_rng();
    let mut insertion_tdp_key = [0u8; 32];
    let mut deletion_tdp_key = [0u8; 32];
    rng.fill_bytes(&mut insertion_tdp_key);
    rng.fill_bytes(&mut deletion_tdp_key);

    let scheme = CountingPuncturable::new(XorSharePuncturable);

    let client = JanusClient::setup(
        client_stores,
        FeistelPermutation::new(insertion_tdp_key),
        FeistelPermutation::new(deletion_tdp_key),
        scheme.clone(),
    );

    let server_stores = ServerStores {
        insertions: MemoryStore::new(),
        deletions: MemoryStore::new(),
        cached_results: MemoryStore::new(),
    };
    let server = JanusServer::new(
        server_stores,
        FeistelPermutation::new(insertion_tdp_key),
        FeistelPermutation::new(deletion_tdp_key),
        scheme.clone(),
        SearchConfig::default().with_pool_threads(4).with_strategy(strategy),
    )
    .expect("Server setup failed");

    (client, server, scheme)
}

fn insert<S: Store>(client: &Client<S>, server: &Server, keyword: &str, index: u64) {
    let req = client.insertion_request(keyword, index).expect("Failed to build insertion");
    server.insert_entry(&req).expect("Failed to insert");
}

fn delete<S: Store>(client: &Client<S>, server: &Server, keyword: &str, index: u64) {
    let req = client.deletion_request(keyword, index).expect("Failed to build deletion");
    server.delete_entry(&req).expect("Failed to delete");
}

fn search<S: Store>(client: &Client<S>, server: &Server, keyword: &str) -> BTreeSet<u64> {
    let req = client.search_request(keyword).expect("Failed to build search request");
    server.search(&req).expect("Search failed").into_iter().collect()
}

fn search_parallel<S: Store>(client: &Client<S>, server: &Server, keyword: &str, thread_count: usize) -> BTreeSet<u64> {
    let req = client.search_request(keyword).expect("Failed to build search request");
    server.search_parallel_collect(&req, thread_count).expect("Search failed").into_iter().collect()
}

#[test_case(SearchStrategy::Sequential; "sequential")]
#[test_case(SearchStrategy::Striped { stripes: 3 }; "striped")]
#[test_case(SearchStrategy::Staged(PipelineConfig::default()); "staged")]
fn test_insert_delete_search_across_versions(strategy: SearchStrategy) {
    let (client, server, _) = setup(strategy);

    for index in [1, 2, 3] {
        insert(&client, &server, "alice", index);
    }
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([1, 2, 3]));

    delete(&client, &server, "alice", 2);
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([1, 3]));

    insert(&client, &server, "alice", 4);
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([1, 3, 4]));

    // Nothing changed since the previous search.
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([1, 3, 4]));
}

#[test]
fn test_keywords_are_independent() {
    let (client, server, _) = setup(SearchStrategy::Sequential);

    insert(&client, &server, "alice", 1);
    insert(&client, &server, "bob", 1);
    insert(&client, &server, "bob", 2);
    delete(&client, &server, "bob", 1);

    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([1]));
    assert_eq!(search(&client, &server, "bob"), BTreeSet::from([2]));
    assert!(search(&client, &server, "carol").is_empty());
}

#[test]
fn test_insert_then_delete_in_same_version() {
    let (client, server, _) = setup(SearchStrategy::Sequential);

    insert(&client, &server, "alice", 5);
    delete(&client, &server, "alice", 5);

    // Still physically present, until the next search consumes it.
    assert_eq!(server.insertion_server().store().len(), Ok(1));
    assert_eq!(server.deletion_server().store().len(), Ok(1));

    assert!(search(&client, &server, "alice").is_empty());
    assert_eq!(server.insertion_server().store().len(), Ok(0));
    assert_eq!(server.deletion_server().store().len(), Ok(0));
    assert!(search(&client, &server, "alice").is_empty());
}

#[test]
fn test_repeated_search_is_served_from_cache() {
    let (client, server, scheme) = setup(SearchStrategy::Sequential);

    for index in 0..10 {
        insert(&client, &server, "alice", index);
    }
    let first = search(&client, &server, "alice");
    assert_eq!(first, (0..10).collect::<BTreeSet<_>>());

    let decryptions = scheme.decryption_count();
    assert_eq!(decryptions, 10);

    assert_eq!(search(&client, &server, "alice"), first);
    assert_eq!(scheme.decryption_count(), decryptions);
}

#[test_case(0; "no stripes")]
#[test_case(1; "one stripe")]
#[test_case(4; "four stripes")]
fn test_repeated_parallel_search_is_served_from_cache(thread_count: usize) {
    let (client, server, scheme) = setup(SearchStrategy::Sequential);

    for index in 0..10 {
        insert(&client, &server, "alice", index);
    }
    let first = search_parallel(&client, &server, "alice", thread_count);
    assert_eq!(first, (0..10).collect::<BTreeSet<_>>());

    let decryptions = scheme.decryption_count();
    assert_eq!(decryptions, 10);

    assert_eq!(search_parallel(&client, &server, "alice", thread_count), first);
    assert_eq!(scheme.decryption_count(), decryptions);

    delete(&client, &server, "alice", 3);
    insert(&client, &server, "alice", 10);
    let expected = (0..=10).filter(|index| *index != 3).collect::<BTreeSet<_>>();
    assert_eq!(search_parallel(&client, &server, "alice", thread_count), expected);
    assert_eq!(scheme.decryption_count(), decryptions + 1);
}

#[test]
fn test_racing_deletions_keep_live_entries() {
    let delay = Duration::from_millis(5);
    let client_stores = ClientStores {
        search_counters: SlowStore::new(MemoryStore::new(), delay),
        insertion_states: SlowStore::new(MemoryStore::new(), delay),
        deletion_states: SlowStore::new(MemoryStore::new(), delay),
    };
    let (client, server, _) = setup_with(client_stores, SearchStrategy::Sequential);

    for index in 0..4 {
        insert(&client, &server, "alice", index);
    }

    thread::scope(|s| {
        for index in [100, 101] {
            let (client, server) = (&client, &server);
            s.spawn(move || delete(client, server, "alice", index));
        }
    });

    let req = client.search_request("alice").unwrap();
    assert_eq!(req.deletion_search_request.add_count, 2);

    let matches = server.search(&req).unwrap().into_iter().collect::<BTreeSet<_>>();
    assert_eq!(matches, (0..4).collect::<BTreeSet<_>>());
}

#[test]
fn test_reinsert_after_delete() {
    let (client, server, _) = setup(SearchStrategy::Sequential);

    insert(&client, &server, "alice", 7);
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([7]));

    delete(&client, &server, "alice", 7);
    assert!(search(&client, &server, "alice").is_empty());

    insert(&client, &server, "alice", 7);
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([7]));
}

#[test]
fn test_deleting_cached_entry_in_later_version() {
    let (client, server, _) = setup(SearchStrategy::Sequential);

    insert(&client, &server, "alice", 1);
    insert(&client, &server, "alice", 2);
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([1, 2]));

    delete(&client, &server, "alice", 1);
    delete(&client, &server, "alice", 42);
    assert_eq!(search(&client, &server, "alice"), BTreeSet::from([2]));
    assert_eq!(server.cache().load(&client.search_request("alice").unwrap().keyword_token).unwrap().len(), 1);
}

#[test_case(2; "two threads")]
#[test_case(5; "five threads")]
fn test_parallel_search_matches_sequential(thread_count: usize) {
    let (seq_client, seq_server, _) = setup(SearchStrategy::Sequential);
    let (par_client, par_server, _) = setup(SearchStrategy::Sequential);

    let mut rng = ChaCha8Rng::from_os_rng();
    for round in 0..4u64 {
        for _ in 0..16 {
            let index = rng.random_range(0..32u64);
            if rng.random_bool(0.7) {
                insert(&seq_client, &seq_server, "alice", index);
                insert(&par_client, &par_server, "alice", index);
            } else {
                delete(&seq_client, &seq_server, "alice", index);
                delete(&par_client, &par_server, "alice", index);
            }
        }

        let sequential = search(&seq_client, &seq_server, "alice");
        let parallel = search_parallel(&par_client, &par_server, "alice", thread_count);
        assert_eq!(sequential, parallel, "round = {}", round);
    }
}

#[test]
fn test_parallel_search_streams_every_match() {
    let (client, server, _) = setup(SearchStrategy::Sequential);

    for index in 0..64 {
        insert(&client, &server, "alice", index);
    }
    for index in (0..64).step_by(4) {
        delete(&client, &server, "alice", index);
    }

    let req = client.search_request("alice").unwrap();
    let (tx, rx) = std::sync::mpsc::sync_channel::<u64>(1);
    let consumer = std::thread::spawn(move || rx.iter().collect::<BTreeSet<_>>());

    server.search_parallel(&req, 4, &tx).unwrap();
    drop(tx);

    let streamed = consumer.join().unwrap();
    assert_eq!(streamed, (0..64).filter(|index| index % 4 != 0).collect::<BTreeSet<_>>());
}

#[test]
fn test_store_failure_propagates() {
    let scheme = XorSharePuncturable;
    let client_stores = ClientStores {
        search_counters: MemoryStore::new(),
        insertion_states: MemoryStore::new(),
        deletion_states: MemoryStore::new(),
    };
    let client = JanusClient::setup(client_stores, FeistelPermutation::new([1u8; 32]), FeistelPermutation::new([2u8; 32]), scheme);

    let server_stores = ServerStores {
        insertions: Arc::new(FailingStore) as Arc<dyn Store>,
        deletions: Arc::new(MemoryStore::new()) as Arc<dyn Store>,
        cached_results: Arc::new(MemoryStore::new()) as Arc<dyn Store>,
    };
    let server = JanusServer::new(
        server_stores,
        FeistelPermutation::new([1u8; 32]),
        FeistelPermutation::new([2u8; 32]),
        scheme,
        SearchConfig::default().with_pool_threads(2),
    )
    .unwrap();

    let insertion = client.insertion_request("alice", 1).unwrap();
    assert!(matches!(server.insert_entry(&insertion), Err(JanusSSEError::StoreIO(_))));

    let req = client.search_request("alice").unwrap();
    assert_eq!(req.insertion_search_request.add_count, 1);
    assert!(matches!(server.search(&req), Err(JanusSSEError::StoreIO(_))));
}
