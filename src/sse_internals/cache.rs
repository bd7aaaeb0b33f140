use super::{
    error::JanusSSEError,
    params::{CACHED_RESULT_BYTE_LEN, INDEX_BYTE_LEN, TAG_BYTE_LEN},
    punct::{DocIndex, Tag},
    request::KeywordToken,
    store::Store,
};
use std::collections::HashSet;
use tracing::{debug, error};

/// A search result the server already decrypted once, along with the tag its ciphertext was bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedResult {
    pub index: DocIndex,
    pub tag: Tag,
}

impl CachedResult {
    /// Serializes as the index, little-endian, followed by the tag.
    pub fn to_bytes(&self) -> [u8; CACHED_RESULT_BYTE_LEN] {
        let mut bytes = [0u8; CACHED_RESULT_BYTE_LEN];
        bytes[..INDEX_BYTE_LEN].copy_from_slice(&self.index.to_le_bytes());
        bytes[INDEX_BYTE_LEN..].copy_from_slice(&self.tag);
        bytes
    }

    /// Deserializes one entry from the front of `bytes`, ignoring whatever follows it.
    pub fn from_bytes(bytes: &[u8]) -> Result<CachedResult, JanusSSEError> {
        if bytes.len() < CACHED_RESULT_BYTE_LEN {
            return Err(JanusSSEError::InsufficientCacheData {
                expected: CACHED_RESULT_BYTE_LEN,
                found: bytes.len(),
            });
        }

        let mut index = [0u8; INDEX_BYTE_LEN];
        let mut tag = [0u8; TAG_BYTE_LEN];
        index.copy_from_slice(&bytes[..INDEX_BYTE_LEN]);
        tag.copy_from_slice(&bytes[INDEX_BYTE_LEN..CACHED_RESULT_BYTE_LEN]);

        Ok(CachedResult {
            index: DocIndex::from_le_bytes(index),
            tag,
        })
    }
}

pub fn encode_cached_results(entries: &[CachedResult]) -> Vec<u8> {
    entries.iter().flat_map(|entry| entry.to_bytes()).collect()
}

/// Decodes a concatenation of serialized entries.
pub fn decode_cached_results(bytes: &[u8]) -> Result<Vec<CachedResult>, JanusSSEError> {
    bytes.chunks(CACHED_RESULT_BYTE_LEN).map(CachedResult::from_bytes).collect()
}

/// Persistent per-keyword list of already decrypted results.
///
/// Entries are re-validated on each search, against the tags punctured since the previous one, and dropped for good
/// once their tag is punctured. Once a search has written its list back, no entry of it carries a punctured tag.
pub struct ResultCache<S: Store> {
    store: S,
}

impl<S: Store> ResultCache<S> {
    pub fn new(store: S) -> ResultCache<S> {
        ResultCache { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Cached entries of the keyword, in insertion order. A malformed list reads as empty.
    pub fn load(&self, keyword_token: &KeywordToken) -> Result<Vec<CachedResult>, JanusSSEError> {
        let Some(bytes) = self.store.get(keyword_token)? else {
            return Ok(Vec::new());
        };

        match decode_cached_results(&bytes) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                if !bytes.is_empty() {
                    error!(keyword_token = %hex::encode(keyword_token), "Unable to deserialize cached results: {}", e);
                }
                Ok(Vec::new())
            }
        }
    }

    pub fn save(&self, keyword_token: &KeywordToken, entries: &[CachedResult]) -> Result<(), JanusSSEError> {
        debug!(entries = entries.len(), "saving cached results");
        self.store.put(keyword_token, &encode_cached_results(entries))
    }

    /// Drops entries whose tag was punctured since the last search, keeping the order of the survivors.
    pub fn filter_removed(entries: Vec<CachedResult>, removed_tags: &HashSet<Tag>) -> Vec<CachedResult> {
        if removed_tags.is_empty() {
            return entries;
        }

        entries.into_iter().filter(|entry| !removed_tags.contains(&entry.tag)).collect()
    }
}
