use super::{
    error::JanusSSEError,
    params::{CIPHERTEXT_BYTE_LEN, KEY_SHARE_BYTE_LEN, KEYWORD_TOKEN_BYTE_LEN},
    prf::{DerivationKey, SearchToken, UpdateToken},
    punct::KeyShare,
};

/// Search request of the chain based sub-scheme.
///
/// `token` is the head of the keyword's chain i.e. the element of its most recent update, `add_count` is the number
/// of updates issued for the keyword when the request was built. The server replays exactly `add_count` elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchRequest {
    pub token: SearchToken,
    pub derivation_key: DerivationKey,
    pub add_count: u32,
}

impl SearchRequest {
    pub fn validate(&self, max_add_count: u32) -> Result<(), JanusSSEError> {
        if self.add_count > max_add_count {
            return Err(JanusSSEError::AddCountExceedsLimit {
                add_count: self.add_count,
                limit: max_add_count,
            });
        }

        Ok(())
    }
}

/// Update request of the chain based sub-scheme, storing a masked, fixed width payload under a one-shot token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateRequest<const N: usize> {
    pub token: UpdateToken,
    pub payload: [u8; N],
}

/// Inserts a puncturable ciphertext in the insertion index.
pub type InsertionRequest = UpdateRequest<CIPHERTEXT_BYTE_LEN>;
/// Inserts a key share, puncturing one tag, in the deletion index.
pub type DeletionRequest = UpdateRequest<KEY_SHARE_BYTE_LEN>;

pub type KeywordToken = [u8; KEYWORD_TOKEN_BYTE_LEN];

/// Search request of the deletion aware scheme, bundling one request per sub-scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JanusSearchRequest {
    /// Version independent keyword identifier, under which the server caches results.
    pub keyword_token: KeywordToken,
    pub insertion_search_request: SearchRequest,
    pub deletion_search_request: SearchRequest,
    /// Share completing the deletion key shares into the punctured key of this keyword version.
    pub first_key_share: KeyShare,
}
