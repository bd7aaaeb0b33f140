use super::{
    config::{PipelineConfig, SearchConfig, SearchStrategy},
    error::JanusSSEError,
    prf::{Prf, SearchToken, UpdateToken, derive_mask, derive_token, derive_token_mask, xor_mask},
    request::{SearchRequest, UpdateRequest},
    store::Store,
    tdp::TrapdoorPermutation,
    workers::{ResultSink, SharedReceiver, TaskGroup, collect_into_vec},
};
use rayon::{ThreadPool, ThreadPoolBuilder, prelude::*};
use std::sync::{Arc, mpsc::sync_channel};
use tracing::{debug, trace};

/// Server side engine of the chain based sub-scheme.
///
/// A keyword's updates are stored under tokens derived from the successive elements of a trapdoor permutation chain.
/// Given the chain's head, a search walks the chain with the public permutation, re-derives every update token,
/// looks it up in the store and unmasks what it finds. Tokens without a stored entry are skipped, that's a routine
/// outcome after deletions. `N` is the byte width of stored payloads.
pub struct SearchOrchestrator<S: Store, T: TrapdoorPermutation> {
    store: S,
    tdp: T,
    pool: ThreadPool,
    config: SearchConfig,
}

impl<S: Store, T: TrapdoorPermutation> SearchOrchestrator<S, T> {
    pub fn new(store: S, tdp: T, config: SearchConfig) -> Result<Self, JanusSSEError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(config.pool_threads.max(1))
            .thread_name(|idx| format!("sse-search-{idx}"))
            .build()
            .map_err(|e| JanusSSEError::ThreadPoolBuild(e.to_string()))?;

        Ok(SearchOrchestrator { store, tdp, pool, config })
    }

    pub fn public_key(&self) -> String {
        self.tdp.public_key()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn update<const N: usize>(&self, req: &UpdateRequest<N>) -> Result<(), JanusSSEError> {
        trace!(update_token = %hex::encode(req.token), "storing update");
        self.store.put(&req.token, &req.payload)
    }

    /// Collects all payloads of the keyword using the strategy configured at construction.
    pub fn search_configured<const N: usize>(&self, req: &SearchRequest, delete_items: bool) -> Result<Vec<[u8; N]>, JanusSSEError> {
        self.search_with(req, &self.config.strategy, delete_items)
    }

    /// Collects all payloads of the keyword using `strategy`.
    pub fn search_with<const N: usize>(&self, req: &SearchRequest, strategy: &SearchStrategy, delete_items: bool) -> Result<Vec<[u8; N]>, JanusSSEError> {
        let results = collect_into_vec(|sink| self.search_with_callback(req, strategy, delete_items, sink))?;
        debug!(add_count = req.add_count, hits = results.len(), "search finished");

        Ok(results)
    }

    /// Streams all payloads of the keyword into `sink` using `strategy`.
    pub fn search_with_callback<const N: usize, K: ResultSink<[u8; N]>>(
        &self,
        req: &SearchRequest,
        strategy: &SearchStrategy,
        delete_items: bool,
        sink: &K,
    ) -> Result<(), JanusSSEError> {
        match strategy {
            SearchStrategy::Sequential => self.search_callback(req, delete_items, sink),
            SearchStrategy::Striped { stripes } => self.search_striped_callback(req, *stripes, delete_items, sink),
            SearchStrategy::Staged(pipeline) => self.search_staged(req, pipeline, delete_items, sink),
        }
    }

    /// Walks the chain one element after another. In deletion mode retrieved entries are removed from the store.
    pub fn search<const N: usize>(&self, req: &SearchRequest, delete_items: bool) -> Result<Vec<[u8; N]>, JanusSSEError> {
        self.search_with(req, &SearchStrategy::Sequential, delete_items)
    }

    pub fn search_callback<const N: usize, K: ResultSink<[u8; N]>>(&self, req: &SearchRequest, delete_items: bool, sink: &K) -> Result<(), JanusSSEError> {
        self.begin_search(req, "sequential")?;

        let derivation_prf = Prf::new(req.derivation_key);
        let mut element = req.token;

        for idx in 0..req.add_count {
            if let Some(payload) = self.process_element::<N>(&derivation_prf, &element, delete_items)? {
                sink.emit(payload);
            }

            if idx + 1 < req.add_count {
                element = self.tdp.eval(&element);
            }
        }

        Ok(())
    }

    /// Splits the chain in `stripes` interleaved stripes, walked in parallel.
    ///
    /// Stripe `t` fast-forwards to the `t`-th element, then keeps jumping `stripes` elements ahead, so it handles
    /// elements `t, t + stripes, t + 2 * stripes, ...`. Each stripe derives, looks up and unmasks its own elements.
    pub fn search_striped<const N: usize>(&self, req: &SearchRequest, stripes: usize, delete_items: bool) -> Result<Vec<[u8; N]>, JanusSSEError> {
        self.search_with(req, &SearchStrategy::Striped { stripes }, delete_items)
    }

    pub fn search_striped_callback<const N: usize, K: ResultSink<[u8; N]>>(
        &self,
        req: &SearchRequest,
        stripes: usize,
        delete_items: bool,
        sink: &K,
    ) -> Result<(), JanusSSEError> {
        let stripes = stripes.min(req.add_count as usize);
        if stripes <= 1 {
            return self.search_callback(req, delete_items, sink);
        }

        self.begin_search(req, "striped")?;

        let derivation_prf = Prf::new(req.derivation_key);
        let chain_len = req.add_count as u64;
        let stride = stripes as u64;

        self.pool.install(|| {
            (0..stride).into_par_iter().try_for_each(|stripe| {
                let mut element = self.tdp.eval_n(&req.token, stripe);
                let mut idx = stripe;

                loop {
                    if let Some(payload) = self.process_element::<N>(&derivation_prf, &element, delete_items)? {
                        sink.emit(payload);
                    }

                    idx += stride;
                    if idx >= chain_len {
                        break;
                    }
                    element = self.tdp.eval_n(&element, stride);
                }

                Ok(())
            })
        })
    }

    /// Runs the search as a pipeline of four stages, each with its own workers, connected by bounded queues:
    /// chain evaluation, update token derivation, store lookup and payload unmasking.
    pub fn search_staged<const N: usize, K: ResultSink<[u8; N]>>(
        &self,
        req: &SearchRequest,
        pipeline: &PipelineConfig,
        delete_items: bool,
        sink: &K,
    ) -> Result<(), JanusSSEError> {
        self.begin_search(req, "staged")?;
        if req.add_count == 0 {
            return Ok(());
        }

        let derivation_prf = Prf::new(req.derivation_key);
        let chain_len = req.add_count as u64;
        let stride = pipeline.eval_threads.clamp(1, req.add_count as usize) as u64;
        let capacity = pipeline.queue_capacity.max(1);

        let (element_tx, element_rx) = sync_channel::<SearchToken>(capacity);
        let (token_tx, token_rx) = sync_channel::<(SearchToken, UpdateToken)>(capacity);
        let (hit_tx, hit_rx) = sync_channel::<(SearchToken, [u8; N])>(capacity);

        // Receivers are owned by their consumers only, so that upstream sends fail instead of blocking forever
        // once every consumer of a stage is gone.
        let element_rx = Arc::new(SharedReceiver::new(element_rx));
        let token_rx = Arc::new(SharedReceiver::new(token_rx));
        let hit_rx = Arc::new(SharedReceiver::new(hit_rx));

        let tdp = &self.tdp;
        let head = &req.token;
        let derivation_prf = &derivation_prf;

        std::thread::scope(|s| {
            let mut group = TaskGroup::new(s);

            group.spawn_n(stride as usize, |stripe| {
                let tx = element_tx.clone();
                let stripe = stripe as u64;

                move || {
                    let mut element = tdp.eval_n(head, stripe);
                    let mut idx = stripe;

                    loop {
                        if tx.send(element).is_err() {
                            break;
                        }

                        idx += stride;
                        if idx >= chain_len {
                            break;
                        }
                        element = tdp.eval_n(&element, stride);
                    }

                    Ok(())
                }
            });
            drop(element_tx);

            group.spawn_n(pipeline.derive_threads.max(1), |_| {
                let (rx, tx) = (element_rx.clone(), token_tx.clone());

                move || {
                    while let Some(element) = rx.recv() {
                        let token = derive_token(derivation_prf, &element);
                        if tx.send((element, token)).is_err() {
                            break;
                        }
                    }

                    Ok(())
                }
            });
            drop((element_rx, token_tx));

            group.spawn_n(pipeline.lookup_threads.max(1), |_| {
                let (rx, tx) = (token_rx.clone(), hit_tx.clone());

                move || {
                    while let Some((element, token)) = rx.recv() {
                        if let Some(stored) = self.lookup::<N>(&token, delete_items)? {
                            if tx.send((element, stored)).is_err() {
                                break;
                            }
                        }
                    }

                    Ok(())
                }
            });
            drop((token_rx, hit_tx));

            group.spawn_n(pipeline.assemble_threads.max(1), |_| {
                let rx = hit_rx.clone();

                move || {
                    while let Some((element, stored)) = rx.recv() {
                        let mask = derive_mask::<N>(derivation_prf, &element);
                        sink.emit(xor_mask(&stored, &mask));
                    }

                    Ok(())
                }
            });
            drop(hit_rx);

            group.join()
        })
    }

    fn begin_search(&self, req: &SearchRequest, strategy: &'static str) -> Result<(), JanusSSEError> {
        req.validate(self.config.max_add_count)?;

        debug!(add_count = req.add_count, strategy, "starting chain search");
        trace!(search_token = %hex::encode(req.token), "chain head");

        Ok(())
    }

    fn process_element<const N: usize>(&self, derivation_prf: &Prf, element: &SearchToken, delete_items: bool) -> Result<Option<[u8; N]>, JanusSSEError> {
        let (token, mask) = derive_token_mask::<N>(derivation_prf, element);
        Ok(self.lookup::<N>(&token, delete_items)?.map(|stored| xor_mask(&stored, &mask)))
    }

    fn lookup<const N: usize>(&self, token: &UpdateToken, delete_items: bool) -> Result<Option<[u8; N]>, JanusSSEError> {
        trace!(update_token = %hex::encode(token), "looking up derived token");

        let stored = if delete_items { self.store.take(token)? } else { self.store.get(token)? };
        match stored {
            Some(value) => <[u8; N]>::try_from(value.as_slice()).map(Some).map_err(|_| JanusSSEError::MalformedStoreValue {
                expected: N,
                found: value.len(),
            }),
            None => Ok(None),
        }
    }
}
