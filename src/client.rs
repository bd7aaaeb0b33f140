use crate::sse_internals::{
    error::JanusSSEError,
    params::{PRF_KEY_BYTE_LEN, SEARCH_TOKEN_BYTE_LEN},
    prf::{Prf, PrfKey, SearchToken, derive_token_mask, xor_mask},
    punct::{DocIndex, PuncturableEncryption, Tag},
    request::{DeletionRequest, InsertionRequest, JanusSearchRequest, SearchRequest, UpdateRequest},
    store::Store,
    tdp::TrapdoorInverse,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use std::sync::Mutex;
use tracing::{debug, trace};
use zeroize::Zeroize;

const ADD_COUNT_BYTE_LEN: usize = std::mem::size_of::<u32>();
const CHAIN_STATE_BYTE_LEN: usize = ADD_COUNT_BYTE_LEN + SEARCH_TOKEN_BYTE_LEN;

/// Per keyword state of the chain client: number of updates so far and the chain element of the latest one.
struct ChainState {
    add_count: u32,
    latest: SearchToken,
}

impl ChainState {
    fn to_bytes(&self) -> [u8; CHAIN_STATE_BYTE_LEN] {
        let mut bytes = [0u8; CHAIN_STATE_BYTE_LEN];
        bytes[..ADD_COUNT_BYTE_LEN].copy_from_slice(&self.add_count.to_le_bytes());
        bytes[ADD_COUNT_BYTE_LEN..].copy_from_slice(&self.latest);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Result<ChainState, JanusSSEError> {
        if bytes.len() != CHAIN_STATE_BYTE_LEN {
            return Err(JanusSSEError::MalformedClientState);
        }

        let mut add_count = [0u8; ADD_COUNT_BYTE_LEN];
        let mut latest = [0u8; SEARCH_TOKEN_BYTE_LEN];
        add_count.copy_from_slice(&bytes[..ADD_COUNT_BYTE_LEN]);
        latest.copy_from_slice(&bytes[ADD_COUNT_BYTE_LEN..]);

        Ok(ChainState {
            add_count: u32::from_le_bytes(add_count),
            latest,
        })
    }
}

/// Client of the chain based sub-scheme.
///
/// The first update of a keyword is stored under a chain element derived from the keyword, every following one under
/// the trapdoor inverse of the previous element. So only the client can extend a chain, while the server, given its
/// head, can walk it back to the first element with the public permutation.
pub struct ChainClient<S: Store, T: TrapdoorInverse> {
    derivation_master: Prf,
    kw_token_master: Prf,
    tdp: T,
    states: S,
    update_lock: Mutex<()>,
}

impl<S: Store, T: TrapdoorInverse> ChainClient<S, T> {
    pub fn new(derivation_master_key: PrfKey, kw_token_master_key: PrfKey, tdp: T, states: S) -> Self {
        ChainClient {
            derivation_master: Prf::new(derivation_master_key),
            kw_token_master: Prf::new(kw_token_master_key),
            tdp,
            states,
            update_lock: Mutex::new(()),
        }
    }

    /// Public key of the permutation, for setting up the matching server.
    pub fn public_key(&self) -> String {
        self.tdp.public_key()
    }

    /// Number of updates issued for `keyword` since it was last removed.
    pub fn match_count(&self, keyword: &str) -> Result<u32, JanusSSEError> {
        Ok(self.load_state(keyword)?.map_or(0, |state| state.add_count))
    }

    pub fn update_request<const N: usize>(&self, keyword: &str, payload: &[u8; N]) -> Result<UpdateRequest<N>, JanusSSEError> {
        let _guard = self.update_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let state = match self.load_state(keyword)? {
            Some(state) => ChainState {
                add_count: state.add_count.checked_add(1).ok_or(JanusSSEError::CounterOverflow)?,
                latest: self.tdp.invert(&state.latest),
            },
            None => ChainState {
                add_count: 1,
                latest: self.first_element(keyword),
            },
        };
        self.states.put(keyword.as_bytes(), &state.to_bytes())?;

        let derivation_prf = self.derivation_prf(keyword);
        let (token, mask) = derive_token_mask::<N>(&derivation_prf, &state.latest);
        trace!(keyword, add_count = state.add_count, update_token = %hex::encode(token), "built update request");

        Ok(UpdateRequest {
            token,
            payload: xor_mask(payload, &mask),
        })
    }

    /// Request replaying every update of `keyword`. For a never updated keyword, `add_count` is zero.
    pub fn search_request(&self, keyword: &str) -> Result<SearchRequest, JanusSSEError> {
        let (token, add_count) = match self.load_state(keyword)? {
            Some(state) => (state.latest, state.add_count),
            None => (self.first_element(keyword), 0),
        };

        Ok(SearchRequest {
            token,
            derivation_key: self.derivation_master.prf::<PRF_KEY_BYTE_LEN>(keyword.as_bytes()),
            add_count,
        })
    }

    /// Forgets the keyword's state, so that its next update starts a fresh chain.
    pub fn remove_keyword(&self, keyword: &str) -> Result<bool, JanusSSEError> {
        let _guard = self.update_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        self.states.remove(keyword.as_bytes())
    }

    fn first_element(&self, keyword: &str) -> SearchToken {
        self.kw_token_master.prf::<SEARCH_TOKEN_BYTE_LEN>(keyword.as_bytes())
    }

    fn derivation_prf(&self, keyword: &str) -> Prf {
        Prf::new(self.derivation_master.prf::<PRF_KEY_BYTE_LEN>(keyword.as_bytes()))
    }

    fn load_state(&self, keyword: &str) -> Result<Option<ChainState>, JanusSSEError> {
        self.states.get(keyword.as_bytes())?.map(|bytes| ChainState::from_bytes(&bytes)).transpose()
    }
}

/// Client side stores, one per kind of persisted state.
pub struct ClientStores<S: Store> {
    /// Keyword to its search version.
    pub search_counters: S,
    /// Meta-keyword to its insertion chain state.
    pub insertion_states: S,
    /// Meta-keyword to its deletion chain state.
    pub deletion_states: S,
}

/// Client of the deletion aware scheme.
///
/// Every keyword has a search version, advanced by each search that found updates. Insertions and deletions are
/// indexed under the meta-keyword `hex(version) || keyword`, so that a search only replays the updates issued since
/// the previous one. Entries are encrypted under a per meta-keyword puncturable key. Each deletion punctures that key
/// at the tag of the deleted entry, where tags are derived from the keyword and the document index only, so that they
/// stay the same across versions.
///
/// Building a request reads the keyword's version and sub-client states, then writes them back. Requests of one client
/// are therefore serialized, so that a deletion index is never issued twice and a search never drops an update.
pub struct JanusClient<S: Store, T: TrapdoorInverse, P: PuncturableEncryption> {
    tag_prf: Prf,
    punct_enc_master: Prf,
    kw_token_prf: Prf,
    insertion_client: ChainClient<S, T>,
    deletion_client: ChainClient<S, T>,
    search_counters: S,
    scheme: P,
    request_lock: Mutex<()>,
}

impl<S: Store, T: TrapdoorInverse, P: PuncturableEncryption> JanusClient<S, T, P> {
    /// Sets up a client under a freshly sampled master key.
    pub fn setup(stores: ClientStores<S>, insertion_tdp: T, deletion_tdp: T, scheme: P) -> Self {
        let mut rng = ChaCha8Rng::from_os_rng();
        let mut master_key = [0u8; PRF_KEY_BYTE_LEN];
        rng.fill_bytes(&mut master_key);

        let client = Self::from_master_key(master_key, stores, insertion_tdp, deletion_tdp, scheme);
        master_key.zeroize();

        client
    }

    /// Every other key is derived from `master_key`, each for its own purpose.
    pub fn from_master_key(master_key: PrfKey, stores: ClientStores<S>, insertion_tdp: T, deletion_tdp: T, scheme: P) -> Self {
        let master_prf = Prf::new(master_key);

        let insertion_client = ChainClient::new(
            master_prf.prf_string("add_derivation_master_key"),
            master_prf.prf_string("add_kw_token_master_key"),
            insertion_tdp,
            stores.insertion_states,
        );
        let deletion_client = ChainClient::new(
            master_prf.prf_string("del_derivation_master_key"),
            master_prf.prf_string("del_kw_token_master_key"),
            deletion_tdp,
            stores.deletion_states,
        );

        JanusClient {
            tag_prf: Prf::new(master_prf.prf_string("tag_derivation")),
            punct_enc_master: Prf::new(master_prf.prf_string("punct_enc")),
            kw_token_prf: Prf::new(master_prf.prf_string("keyword_token")),
            insertion_client,
            deletion_client,
            search_counters: stores.search_counters,
            scheme,
            request_lock: Mutex::new(()),
        }
    }

    pub fn insertion_client(&self) -> &ChainClient<S, T> {
        &self.insertion_client
    }

    pub fn deletion_client(&self) -> &ChainClient<S, T> {
        &self.deletion_client
    }

    pub fn meta_keyword(keyword: &str, version: u32) -> String {
        hex::encode(version.to_be_bytes()) + keyword
    }

    pub fn keyword_doc_string(keyword: &str, index: DocIndex) -> String {
        format!("{}||{}", hex::encode(index.to_be_bytes()), keyword)
    }

    /// Current search version of `keyword`, zero if it was never searched with updates pending.
    pub fn search_version(&self, keyword: &str) -> Result<u32, JanusSSEError> {
        match self.search_counters.get(keyword.as_bytes())? {
            Some(bytes) => <[u8; 4]>::try_from(bytes.as_slice())
                .map(u32::from_le_bytes)
                .map_err(|_| JanusSSEError::MalformedClientState),
            None => Ok(0),
        }
    }

    /// Builds the request inserting document `index` under `keyword`.
    ///
    /// # Arguments
    ///
    /// * `keyword` - The keyword to index the document under.
    /// * `index` - The document index.
    ///
    /// # Returns
    ///
    /// An update request carrying the masked puncturable ciphertext of `index`, under the current version of
    /// `keyword`, or an error if the client state can't be read or written.
    pub fn insertion_request(&self, keyword: &str, index: DocIndex) -> Result<InsertionRequest, JanusSSEError> {
        let _guard = self.request_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let meta_keyword = Self::meta_keyword(keyword, self.search_version(keyword)?);

        let tag = self.tag(keyword, index);
        let ciphertext = self.scheme.encrypt(&self.punct_key(&meta_keyword), index, &tag);
        trace!(meta_keyword = %meta_keyword, tag = %hex::encode(tag), "built insertion");

        self.insertion_client.update_request(&meta_keyword, &ciphertext)
    }

    /// Builds the request deleting document `index` from `keyword`.
    ///
    /// # Arguments
    ///
    /// * `keyword` - The keyword the document was indexed under.
    /// * `index` - The document index.
    ///
    /// # Returns
    ///
    /// An update request carrying the masked key share puncturing the current version's key at the tag of `index`,
    /// or an error if the client state can't be read or written, or the deletion counter overflows.
    pub fn deletion_request(&self, keyword: &str, index: DocIndex) -> Result<DeletionRequest, JanusSSEError> {
        let _guard = self.request_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let meta_keyword = Self::meta_keyword(keyword, self.search_version(keyword)?);

        let deletion_index = self
            .deletion_client
            .match_count(&meta_keyword)?
            .checked_add(1)
            .ok_or(JanusSSEError::CounterOverflow)?;

        let tag = self.tag(keyword, index);
        let key_share = self.scheme.inc_puncture(&self.punct_key(&meta_keyword), deletion_index, &tag);
        trace!(meta_keyword = %meta_keyword, deletion_index, tag = %hex::encode(tag), "built deletion");

        self.deletion_client.update_request(&meta_keyword, &key_share)
    }

    /// Builds the search request of `keyword`, then moves the keyword to its next version if anything was updated.
    ///
    /// # Arguments
    ///
    /// * `keyword` - The keyword to search for.
    ///
    /// # Returns
    ///
    /// A request holding the keyword's cache token, a search request for each of the two chains of the current
    /// version, and the first key share of that version. Returns an error if the client state can't be read or
    /// written, or the version counter overflows.
    pub fn search_request(&self, keyword: &str) -> Result<JanusSearchRequest, JanusSSEError> {
        let _guard = self.request_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let version = self.search_version(keyword)?;
        let meta_keyword = Self::meta_keyword(keyword, version);

        let insertion_search_request = self.insertion_client.search_request(&meta_keyword)?;
        let deletion_search_request = self.deletion_client.search_request(&meta_keyword)?;

        // Deletion add count is the number of deleted entries of this version.
        let first_key_share = self
            .scheme
            .initial_keyshare(&self.punct_key(&meta_keyword), deletion_search_request.add_count);

        let insertions = insertion_search_request.add_count;
        let deletions = deletion_search_request.add_count;
        debug!(version, insertions, deletions, "built search request");

        if insertions > 0 || deletions > 0 {
            let next_version = version.checked_add(1).ok_or(JanusSSEError::CounterOverflow)?;
            self.search_counters.put(keyword.as_bytes(), &next_version.to_le_bytes())?;
        }
        if insertions > 0 {
            self.insertion_client.remove_keyword(&meta_keyword)?;
        }
        if deletions > 0 {
            self.deletion_client.remove_keyword(&meta_keyword)?;
        }

        Ok(JanusSearchRequest {
            keyword_token: self.kw_token_prf.prf(keyword.as_bytes()),
            insertion_search_request,
            deletion_search_request,
            first_key_share,
        })
    }

    fn tag(&self, keyword: &str, index: DocIndex) -> Tag {
        self.tag_prf.prf(Self::keyword_doc_string(keyword, index).as_bytes())
    }

    fn punct_key(&self, meta_keyword: &str) -> PrfKey {
        self.punct_enc_master.prf(meta_keyword.as_bytes())
    }
}
