use divan;
use janus_sse::{
    MemoryStore, PipelineConfig, SearchConfig, SearchOrchestrator, SearchRequest,
    client::{ChainClient, ClientStores, JanusClient},
    server::{JanusServer, ServerStores},
    testing::{FeistelPermutation, XorSharePuncturable},
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

fn main() {
    divan::main();
}

const PAYLOAD_BYTE_LEN: usize = 8;

#[derive(Debug)]
struct ChainConfig {
    add_count: u32,
}

const ARGS: &[ChainConfig] = &[ChainConfig { add_count: 1u32 << 10 }, ChainConfig { add_count: 1u32 << 14 }];
const STRIPES: [usize; 3] = [2, 4, 8];

fn random_key(rng: &mut ChaCha8Rng) -> [u8; 32] {
    let mut key = [0u8; 32];
    rng.fill_bytes(&mut key);
    key
}

fn setup_chain(add_count: u32) -> (SearchOrchestrator<MemoryStore, FeistelPermutation>, SearchRequest) {
    let mut rng = ChaCha8Rng::from_os_rng();
    let tdp_key = random_key(&mut rng);

    let client = ChainClient::new(random_key(&mut rng), random_key(&mut rng), FeistelPermutation::new(tdp_key), MemoryStore::new());
    let server = SearchOrchestrator::new(MemoryStore::new(), FeistelPermutation::new(tdp_key), SearchConfig::default()).unwrap();

    for idx in 0..add_count {
        let req = client.update_request("keyword", &(idx as u64).to_le_bytes()).unwrap();
        server.update(&req).unwrap();
    }

    (server, client.search_request("keyword").unwrap())
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn sequential_search(bencher: divan::Bencher, chain_config: &ChainConfig) {
    let (server, req) = setup_chain(chain_config.add_count);
    bencher.bench(|| divan::black_box(&server).search::<PAYLOAD_BYTE_LEN>(divan::black_box(&req), false));
}

#[divan::bench(args = ARGS, consts = STRIPES, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn striped_search<const STRIPE_COUNT: usize>(bencher: divan::Bencher, chain_config: &ChainConfig) {
    let (server, req) = setup_chain(chain_config.add_count);
    bencher.bench(|| divan::black_box(&server).search_striped::<PAYLOAD_BYTE_LEN>(divan::black_box(&req), STRIPE_COUNT, false));
}

#[divan::bench(args = ARGS, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn staged_search(bencher: divan::Bencher, chain_config: &ChainConfig) {
    let (server, req) = setup_chain(chain_config.add_count);
    let pipeline = PipelineConfig {
        eval_threads: 4,
        ..PipelineConfig::default()
    };

    bencher.bench(|| {
        let found = std::sync::Mutex::new(Vec::<[u8; PAYLOAD_BYTE_LEN]>::new());
        divan::black_box(&server).search_staged(divan::black_box(&req), &pipeline, false, &found).unwrap();
        found
    });
}

/// Searching a keyword with nothing pending, so that every match comes out of the result cache.
#[divan::bench(args = ARGS, max_time = Duration::from_secs(100), skip_ext_time = true)]
fn janus_search_from_cache(bencher: divan::Bencher, chain_config: &ChainConfig) {
    let mut rng = ChaCha8Rng::from_os_rng();
    let (insertion_tdp_key, deletion_tdp_key) = (random_key(&mut rng), random_key(&mut rng));

    let client_stores = ClientStores {
        search_counters: MemoryStore::new(),
        insertion_states: MemoryStore::new(),
        deletion_states: MemoryStore::new(),
    };
    let client = JanusClient::setup(
        client_stores,
        FeistelPermutation::new(insertion_tdp_key),
        FeistelPermutation::new(deletion_tdp_key),
        XorSharePuncturable,
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
        XorSharePuncturable,
        SearchConfig::default(),
    )
    .unwrap();

    for index in 0..chain_config.add_count as u64 {
        server.insert_entry(&client.insertion_request("keyword", index).unwrap()).unwrap();
    }
    server.search(&client.search_request("keyword").unwrap()).unwrap();

    let req = client.search_request("keyword").unwrap();
    bencher.bench(|| divan::black_box(&server).search(divan::black_box(&req)));
}
