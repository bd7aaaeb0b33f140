//! Janus-SSE: A Rust library implementation of forward and backward private **D**ynamic **S**earchable **S**ymmetric **E**ncryption, with deletions built on puncturable encryption.
//!
//! This crate lets a client outsource an encrypted keyword index to an untrusted server, add and delete (keyword, document index) entries, and later ask the server for all documents currently matching a keyword.
//! Insertions and deletions are indexed by two forward private sub-indices, each walking a trapdoor permutation chain. Deletions are key shares puncturing the encryption key of insertions, so the server can
//! decrypt exactly the live entries, without ever learning which ones were deleted.
//!
//! ## Features
//!
//! * **Forward Privacy:** Updates can't be linked to past searches, since only the client, holding the trapdoor, can extend a keyword's chain.
//! * **Backward Privacy:** Deleted entries never decrypt, and decrypted entries are cached server-side, then dropped from the cache once deleted.
//! * **Parallel Search:** Chains are walked sequentially, in interleaved stripes on a worker pool, or through a staged pipeline connected by bounded queues. Results can be collected or streamed.
//! * **Token Tree:** Constrained key derivation over a binary tree, handing out the minimum number of subtree keys covering a range of leaves.
//! * **Error Handling:** Store failures and malformed persisted data are reported through one error type. Missing and punctured entries are routine, never errors.
//!
//! ## Usage
//!
//! The trapdoor permutation, the puncturable encryption scheme and the key-value store are external, injected through the [`TrapdoorPermutation`], [`TrapdoorInverse`], [`PuncturableEncryption`]
//! and [`Store`] traits. Insecure stand-ins for testing are available behind the `insecure-test-primitives` feature.
//!
//! ```rust,ignore
//! use janus_sse::{
//!     client::{ClientStores, JanusClient},
//!     server::{JanusServer, ServerStores},
//!     testing::{FeistelPermutation, XorSharePuncturable},
//!     MemoryStore, SearchConfig,
//! };
//!
//! fn main() {
//!     let client_stores = ClientStores {
//!         search_counters: MemoryStore::new(),
//!         insertion_states: MemoryStore::new(),
//!         deletion_states: MemoryStore::new(),
//!     };
//!     let client = JanusClient::setup(client_stores, FeistelPermutation::new([1u8; 32]), FeistelPermutation::new([2u8; 32]), XorSharePuncturable);
//!
//!     let server_stores = ServerStores {
//!         insertions: MemoryStore::new(),
//!         deletions: MemoryStore::new(),
//!         cached_results: MemoryStore::new(),
//!     };
//!     let server = JanusServer::new(
//!         server_stores,
//!         FeistelPermutation::new([1u8; 32]),
//!         FeistelPermutation::new([2u8; 32]),
//!         XorSharePuncturable,
//!         SearchConfig::default(),
//!     )
//!     .expect("Server setup failed");
//!
//!     for index in [1, 2, 3] {
//!         server.insert_entry(&client.insertion_request("alice", index).unwrap()).unwrap();
//!     }
//!     server.delete_entry(&client.deletion_request("alice", 2).unwrap()).unwrap();
//!
//!     let req = client.search_request("alice").expect("Failed to build search request");
//!     let mut matches = server.search(&req).expect("Search failed");
//!     matches.sort_unstable();
//!
//!     assert_eq!(matches, vec![1, 3]);
//! }
//! ```
//!
//! ## Modules
//!
//! * `client`: Contains the `JanusClient` struct, building insertion, deletion and search requests, on top of the chain based `ChainClient`.
//! * `server`: Contains the `JanusServer` struct, storing updates and answering search requests.
//! * `testing`: Insecure primitives for tests and benchmarks, behind the `insecure-test-primitives` feature.

pub use sse_internals::cache::{CachedResult, ResultCache};
pub use sse_internals::config::{PipelineConfig, SearchConfig, SearchStrategy};
pub use sse_internals::deletion::DeletionOverlay;
pub use sse_internals::error::JanusSSEError;
pub use sse_internals::orchestrator::SearchOrchestrator;
pub use sse_internals::params;
pub use sse_internals::prf::{DerivationKey, Prf, PrfKey, SearchToken, UpdateToken, derive_mask, derive_token, derive_token_mask, xor_mask};
pub use sse_internals::punct::{Ciphertext, DocIndex, KeyShare, PunctKey, PuncturableDecryption, PuncturableEncryption, Tag};
pub use sse_internals::request::{DeletionRequest, InsertionRequest, JanusSearchRequest, KeywordToken, SearchRequest, UpdateRequest};
pub use sse_internals::store::{MemoryStore, Store};
pub use sse_internals::tdp::{TrapdoorInverse, TrapdoorPermutation};
pub use sse_internals::token_tree::{TokenTree, TreeKey};
pub use sse_internals::workers::ResultSink;
pub mod client;
pub mod server;

#[cfg(any(test, feature = "insecure-test-primitives"))]
pub mod testing;

mod sse_internals;

mod test_janus;
