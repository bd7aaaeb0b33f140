use crate::sse_internals::{
    cache::{CachedResult, ResultCache},
    config::{SearchConfig, SearchStrategy},
    deletion::DeletionOverlay,
    error::JanusSSEError,
    orchestrator::SearchOrchestrator,
    params::{CIPHERTEXT_BYTE_LEN, KEY_SHARE_BYTE_LEN},
    punct::{Ciphertext, DocIndex, PuncturableEncryption},
    request::{DeletionRequest, InsertionRequest, JanusSearchRequest},
    store::Store,
    tdp::TrapdoorPermutation,
    workers::{ResultSink, collect_into_vec},
};
use std::sync::Mutex;
use tracing::debug;

/// Server side stores, one for each of the two indices plus one for the result cache.
pub struct ServerStores<S: Store> {
    pub insertions: S,
    pub deletions: S,
    pub cached_results: S,
}

/// Represents the server of the deletion aware searchable encryption scheme.
///
/// Insertions and deletions of a keyword land in two separate chain based indices. Insertions are puncturable
/// ciphertexts, deletions are key shares puncturing the key of the keyword's current version at the deleted entry's
/// tag. Searching retrieves and consumes both, so each ciphertext is decrypted at most once; what decrypted is kept in
/// a per keyword result cache, which later searches filter against newly punctured tags.
pub struct JanusServer<S: Store, T: TrapdoorPermutation, P: PuncturableEncryption> {
    insertion_server: SearchOrchestrator<S, T>,
    deletion_server: SearchOrchestrator<S, T>,
    cache: ResultCache<S>,
    scheme: P,
}

impl<S: Store, T: TrapdoorPermutation, P: PuncturableEncryption> JanusServer<S, T, P> {
    /// Sets up the server, given the public permutations matching the client's insertion and deletion sub-clients.
    ///
    /// Both sub-indices share the search configuration, each getting its own worker pool. Returns an error if a pool
    /// can't be built.
    pub fn new(stores: ServerStores<S>, insertion_tdp: T, deletion_tdp: T, scheme: P, config: SearchConfig) -> Result<Self, JanusSSEError> {
        Ok(JanusServer {
            insertion_server: SearchOrchestrator::new(stores.insertions, insertion_tdp, config.clone())?,
            deletion_server: SearchOrchestrator::new(stores.deletions, deletion_tdp, config)?,
            cache: ResultCache::new(stores.cached_results),
            scheme,
        })
    }

    pub fn insertion_server(&self) -> &SearchOrchestrator<S, T> {
        &self.insertion_server
    }

    pub fn deletion_server(&self) -> &SearchOrchestrator<S, T> {
        &self.deletion_server
    }

    pub fn cache(&self) -> &ResultCache<S> {
        &self.cache
    }

    pub fn insert_entry(&self, req: &InsertionRequest) -> Result<(), JanusSSEError> {
        self.insertion_server.update(req)
    }

    pub fn delete_entry(&self, req: &DeletionRequest) -> Result<(), JanusSSEError> {
        self.deletion_server.update(req)
    }

    /// Returns the document indices currently matching the keyword, walking both chains with the configured strategy.
    ///
    /// The process involves:
    /// 1. **Deletion Retrieval:** Runs the deletion sub-search, consuming every key share of the keyword's version.
    /// 2. **Overlay Construction:** Folds those shares with the request's first key share into a punctured decryptor,
    ///    and collects their tags.
    /// 3. **Cache Filtering:** Loads the cached results of the keyword, dropping those whose tag was just punctured.
    /// 4. **Insertion Decryption:** Runs the insertion sub-search, consuming every ciphertext of the keyword's version,
    ///    and decrypts each. Punctured ones fail to decrypt and are dropped for good.
    /// 5. **Cache Update:** Writes back the surviving cached results followed by the newly decrypted ones.
    ///
    /// # Arguments
    ///
    /// * `req` - The search request built by the client for the keyword's current version.
    ///
    /// # Returns
    ///
    /// The filtered cached indices, in cache order, followed by the newly decrypted ones. Any store failure aborts the
    /// search, with an error. Consumed entries are not restored then.
    pub fn search(&self, req: &JanusSearchRequest) -> Result<Vec<DocIndex>, JanusSSEError> {
        let key_shares = self
            .deletion_server
            .search_configured::<KEY_SHARE_BYTE_LEN>(&req.deletion_search_request, true)?;
        let overlay = DeletionOverlay::fold(&self.scheme, &req.first_key_share, &key_shares);

        let mut cached = ResultCache::<S>::filter_removed(self.cache.load(&req.keyword_token)?, overlay.removed_tags());
        let mut results = cached.iter().map(|entry| entry.index).collect::<Vec<_>>();

        let ciphertexts = self
            .insertion_server
            .search_configured::<CIPHERTEXT_BYTE_LEN>(&req.insertion_search_request, true)?;

        let cached_count = cached.len();
        for ciphertext in &ciphertexts {
            if let Some(index) = overlay.decrypt(ciphertext) {
                results.push(index);
                cached.push(CachedResult {
                    index,
                    tag: self.scheme.ciphertext_tag(ciphertext),
                });
            }
        }

        debug!(
            deletions = key_shares.len(),
            insertions = ciphertexts.len(),
            from_cache = cached_count,
            decrypted = cached.len() - cached_count,
            "janus search finished"
        );

        self.cache.save(&req.keyword_token, &cached)?;
        Ok(results)
    }

    /// Collecting flavour of [`JanusServer::search_parallel`].
    pub fn search_parallel_collect(&self, req: &JanusSearchRequest, thread_count: usize) -> Result<Vec<DocIndex>, JanusSSEError> {
        collect_into_vec(|sink| self.search_parallel(req, thread_count, sink))
    }

    /// Streams the document indices currently matching the keyword into `sink`, as soon as they are found.
    ///
    /// Both chains are walked in `thread_count` parallel stripes. The deletion sub-search completes before anything
    /// else starts, since filtering and decryption both depend on the overlay it yields. Then replaying the filtered
    /// cache and decrypting retrieved ciphertexts run concurrently, so indices reach the sink in no particular order.
    /// The cache is written back once both are done.
    ///
    /// # Arguments
    ///
    /// * `req` - The search request built by the client for the keyword's current version.
    /// * `thread_count` - Number of stripes each chain is walked in. Zero and one both walk it sequentially.
    /// * `sink` - Receives every matching document index, exactly once.
    ///
    /// # Returns
    ///
    /// Nothing on success, or the first error raised by a store. Indices emitted before a failure stay emitted.
    pub fn search_parallel<K: ResultSink<DocIndex>>(&self, req: &JanusSearchRequest, thread_count: usize, sink: &K) -> Result<(), JanusSSEError> {
        let strategy = SearchStrategy::Striped { stripes: thread_count };

        let key_shares = self
            .deletion_server
            .search_with::<KEY_SHARE_BYTE_LEN>(&req.deletion_search_request, &strategy, true)?;
        let overlay = DeletionOverlay::fold(&self.scheme, &req.first_key_share, &key_shares);

        let new_cache = Mutex::new(Vec::<CachedResult>::new());
        let decrypt_and_emit = |ciphertext: Ciphertext| {
            if let Some(index) = overlay.decrypt(&ciphertext) {
                sink.emit(index);
                new_cache.emit(CachedResult {
                    index,
                    tag: self.scheme.ciphertext_tag(&ciphertext),
                });
            }
        };

        let (filtered, inserted) = rayon::join(
            || -> Result<Vec<CachedResult>, JanusSSEError> {
                let filtered = ResultCache::<S>::filter_removed(self.cache.load(&req.keyword_token)?, overlay.removed_tags());
                filtered.iter().for_each(|entry| sink.emit(entry.index));
                Ok(filtered)
            },
            || {
                self.insertion_server.search_striped_callback::<CIPHERTEXT_BYTE_LEN, _>(
                    &req.insertion_search_request,
                    thread_count,
                    true,
                    &decrypt_and_emit,
                )
            },
        );

        let mut cached = filtered?;
        inserted?;

        let new_cache = new_cache.into_inner().map_err(|_| JanusSSEError::WorkerPanicked)?;
        debug!(
            deletions = key_shares.len(),
            from_cache = cached.len(),
            decrypted = new_cache.len(),
            "parallel janus search finished"
        );

        cached.extend(new_cache);
        self.cache.save(&req.keyword_token, &cached)
    }
}

#[cfg(test)]
mod test {
    use super::{JanusServer, ServerStores};
    use crate::{
        JanusSSEError,
        sse_internals::{
            config::SearchConfig,
            punct::PuncturableEncryption,
            request::{JanusSearchRequest, SearchRequest},
            store::MemoryStore,
        },
        testing::{FailingStore, FeistelPermutation, XorSharePuncturable},
    };

    fn empty_request(scheme: &XorSharePuncturable) -> JanusSearchRequest {
        let empty = SearchRequest {
            token: [0u8; 32],
            derivation_key: [0u8; 32],
            add_count: 0,
        };

        JanusSearchRequest {
            keyword_token: [1u8; 32],
            insertion_search_request: empty.clone(),
            deletion_search_request: empty,
            first_key_share: scheme.initial_keyshare(&[0u8; 32], 0),
        }
    }

    #[test]
    fn searching_unknown_keyword_yields_nothing() {
        let stores = ServerStores {
            insertions: MemoryStore::new(),
            deletions: MemoryStore::new(),
            cached_results: MemoryStore::new(),
        };
        let server = JanusServer::new(
            stores,
            FeistelPermutation::new([1u8; 32]),
            FeistelPermutation::new([2u8; 32]),
            XorSharePuncturable,
            SearchConfig::default().with_pool_threads(2),
        )
        .unwrap();
        let req = empty_request(&XorSharePuncturable);

        assert_eq!(server.search(&req), Ok(vec![]));
        assert_eq!(server.search_parallel_collect(&req, 4), Ok(vec![]));
    }

    #[test]
    fn failing_cache_store_aborts_search() {
        let stores = ServerStores {
            insertions: FailingStore,
            deletions: FailingStore,
            cached_results: FailingStore,
        };
        let server = JanusServer::new(
            stores,
            FeistelPermutation::new([1u8; 32]),
            FeistelPermutation::new([2u8; 32]),
            XorSharePuncturable,
            SearchConfig::default().with_pool_threads(2),
        )
        .unwrap();
        let req = empty_request(&XorSharePuncturable);

        assert!(matches!(server.search(&req), Err(JanusSSEError::StoreIO(_))));
        assert!(matches!(server.search_parallel_collect(&req, 4), Err(JanusSSEError::StoreIO(_))));
    }
}
