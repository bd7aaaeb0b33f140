//! Insecure stand-ins for the external primitives, for tests and benchmarks only.
//!
//! None of these provide the security the scheme relies on. The permutation can be inverted by anyone knowing its
//! public key, and the puncturable scheme enforces puncturing by an explicit tag check, not cryptographically.
//! They do honour the algebraic contracts of their traits, which is all the search engine depends on.

use crate::sse_internals::{
    error::JanusSSEError,
    params::{CIPHERTEXT_BYTE_LEN, INDEX_BYTE_LEN, KEY_SHARE_BYTE_LEN, PUNCT_KEY_BYTE_LEN, TAG_BYTE_LEN},
    prf::{Prf, SearchToken},
    punct::{Ciphertext, DocIndex, KeyShare, PunctKey, PuncturableDecryption, PuncturableEncryption, Tag},
    store::Store,
    tdp::{TrapdoorInverse, TrapdoorPermutation},
};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

const FEISTEL_ROUNDS: u8 = 4;
const HALF_BYTE_LEN: usize = std::mem::size_of::<SearchToken>() / 2;

/// Compares two byte strings without early exit on first mismatch.
fn ct_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    if lhs.len() != rhs.len() {
        return false;
    }

    lhs.iter().zip(rhs.iter()).fold(0u8, |acc, (&l, &r)| acc | (l ^ r)) == 0
}

/// Balanced Feistel network over search tokens, with a TurboSHAKE128 based round function.
#[derive(Clone)]
pub struct FeistelPermutation {
    key: [u8; 32],
}

impl FeistelPermutation {
    pub fn new(key: [u8; 32]) -> Self {
        FeistelPermutation { key }
    }

    fn round(&self, round_idx: u8, half: &[u8]) -> [u8; HALF_BYTE_LEN] {
        Prf::new(self.key).prf_parts::<HALF_BYTE_LEN>(&[b"feistel".as_slice(), &[round_idx], half])
    }

    fn xor_into(dst: &mut [u8], src: &[u8]) {
        dst.iter_mut().zip(src.iter()).for_each(|(d, &s)| *d ^= s);
    }
}

impl TrapdoorPermutation for FeistelPermutation {
    fn eval(&self, x: &SearchToken) -> SearchToken {
        let mut y = *x;
        for round_idx in 0..FEISTEL_ROUNDS {
            let (left, right) = y.split_at_mut(HALF_BYTE_LEN);
            let f = self.round(round_idx, right);
            Self::xor_into(left, &f);
            y.rotate_left(HALF_BYTE_LEN);
        }
        y
    }

    fn public_key(&self) -> String {
        hex::encode(self.key)
    }
}

impl TrapdoorInverse for FeistelPermutation {
    fn invert(&self, y: &SearchToken) -> SearchToken {
        let mut x = *y;
        for round_idx in (0..FEISTEL_ROUNDS).rev() {
            x.rotate_right(HALF_BYTE_LEN);
            let (left, right) = x.split_at_mut(HALF_BYTE_LEN);
            let f = self.round(round_idx, right);
            Self::xor_into(left, &f);
        }
        x
    }
}

/// Puncturable scheme whose key is XOR shared between the initial share and one share per deletion.
///
/// Key share layout is `secret || tag`, ciphertext layout is `tag || masked index || check value`.
#[derive(Clone, Copy, Default)]
pub struct XorSharePuncturable;

impl XorSharePuncturable {
    fn share_secret(key: &PunctKey, deletion_index: u32) -> PunctKey {
        Prf::new(*key).prf_parts::<PUNCT_KEY_BYTE_LEN>(&[b"share".as_slice(), &deletion_index.to_le_bytes()])
    }

    fn index_mask(key: &PunctKey, tag: &Tag) -> [u8; INDEX_BYTE_LEN] {
        Prf::new(*key).prf_parts::<INDEX_BYTE_LEN>(&[b"index".as_slice(), tag])
    }

    fn check_value(key: &PunctKey, tag: &Tag) -> [u8; INDEX_BYTE_LEN] {
        Prf::new(*key).prf_parts::<INDEX_BYTE_LEN>(&[b"check".as_slice(), tag])
    }

    fn key_share(secret: &PunctKey, tag: &Tag) -> KeyShare {
        let mut share = [0u8; KEY_SHARE_BYTE_LEN];
        share[..PUNCT_KEY_BYTE_LEN].copy_from_slice(secret);
        share[PUNCT_KEY_BYTE_LEN..].copy_from_slice(tag);
        share
    }
}

impl PuncturableEncryption for XorSharePuncturable {
    type Decryptor = XorShareDecryptor;

    fn initial_keyshare(&self, key: &PunctKey, deletion_count: u32) -> KeyShare {
        let mut secret = *key;
        for deletion_index in 1..=deletion_count {
            FeistelPermutation::xor_into(&mut secret, &Self::share_secret(key, deletion_index));
        }
        Self::key_share(&secret, &[0u8; TAG_BYTE_LEN])
    }

    fn encrypt(&self, key: &PunctKey, index: DocIndex, tag: &Tag) -> Ciphertext {
        let mut ciphertext = [0u8; CIPHERTEXT_BYTE_LEN];
        let (ct_tag, rest) = ciphertext.split_at_mut(TAG_BYTE_LEN);
        let (masked_index, check) = rest.split_at_mut(INDEX_BYTE_LEN);

        ct_tag.copy_from_slice(tag);
        masked_index.copy_from_slice(&index.to_le_bytes());
        FeistelPermutation::xor_into(masked_index, &Self::index_mask(key, tag));
        check.copy_from_slice(&Self::check_value(key, tag));

        ciphertext
    }

    fn inc_puncture(&self, key: &PunctKey, deletion_index: u32, tag: &Tag) -> KeyShare {
        Self::key_share(&Self::share_secret(key, deletion_index), tag)
    }

    fn ciphertext_tag(&self, ciphertext: &Ciphertext) -> Tag {
        let mut tag = [0u8; TAG_BYTE_LEN];
        tag.copy_from_slice(&ciphertext[..TAG_BYTE_LEN]);
        tag
    }

    fn key_share_tag(&self, key_share: &KeyShare) -> Tag {
        let mut tag = [0u8; TAG_BYTE_LEN];
        tag.copy_from_slice(&key_share[PUNCT_KEY_BYTE_LEN..]);
        tag
    }

    fn decryptor(&self, initial: &KeyShare, punctures: &[KeyShare]) -> XorShareDecryptor {
        let mut key = [0u8; PUNCT_KEY_BYTE_LEN];
        key.copy_from_slice(&initial[..PUNCT_KEY_BYTE_LEN]);

        let mut punctured = HashSet::with_capacity(punctures.len());
        for share in punctures {
            FeistelPermutation::xor_into(&mut key, &share[..PUNCT_KEY_BYTE_LEN]);
            punctured.insert(self.key_share_tag(share));
        }

        XorShareDecryptor { key, punctured }
    }
}

pub struct XorShareDecryptor {
    key: PunctKey,
    punctured: HashSet<Tag>,
}

impl PuncturableDecryption for XorShareDecryptor {
    fn decrypt(&self, ciphertext: &Ciphertext) -> Option<DocIndex> {
        let tag = XorSharePuncturable.ciphertext_tag(ciphertext);
        if self.punctured.contains(&tag) {
            return None;
        }

        let check_offset = TAG_BYTE_LEN + INDEX_BYTE_LEN;
        if !ct_eq(&ciphertext[check_offset..], &XorSharePuncturable::check_value(&self.key, &tag)) {
            return None;
        }

        let mut index = [0u8; INDEX_BYTE_LEN];
        index.copy_from_slice(&ciphertext[TAG_BYTE_LEN..check_offset]);
        FeistelPermutation::xor_into(&mut index, &XorSharePuncturable::index_mask(&self.key, &tag));

        Some(DocIndex::from_le_bytes(index))
    }
}

/// Wraps a puncturable scheme, counting decryption attempts of all decryptors it builds.
#[derive(Clone, Default)]
pub struct CountingPuncturable<P> {
    inner: P,
    decryptions: Arc<AtomicUsize>,
}

impl<P> CountingPuncturable<P> {
    pub fn new(inner: P) -> Self {
        CountingPuncturable {
            inner,
            decryptions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn decryption_count(&self) -> usize {
        self.decryptions.load(Ordering::SeqCst)
    }
}

impl<P: PuncturableEncryption> PuncturableEncryption for CountingPuncturable<P> {
    type Decryptor = CountingDecryptor<P::Decryptor>;

    fn initial_keyshare(&self, key: &PunctKey, deletion_count: u32) -> KeyShare {
        self.inner.initial_keyshare(key, deletion_count)
    }

    fn encrypt(&self, key: &PunctKey, index: DocIndex, tag: &Tag) -> Ciphertext {
        self.inner.encrypt(key, index, tag)
    }

    fn inc_puncture(&self, key: &PunctKey, deletion_index: u32, tag: &Tag) -> KeyShare {
        self.inner.inc_puncture(key, deletion_index, tag)
    }

    fn ciphertext_tag(&self, ciphertext: &Ciphertext) -> Tag {
        self.inner.ciphertext_tag(ciphertext)
    }

    fn key_share_tag(&self, key_share: &KeyShare) -> Tag {
        self.inner.key_share_tag(key_share)
    }

    fn decryptor(&self, initial: &KeyShare, punctures: &[KeyShare]) -> Self::Decryptor {
        CountingDecryptor {
            inner: self.inner.decryptor(initial, punctures),
            decryptions: self.decryptions.clone(),
        }
    }
}

pub struct CountingDecryptor<D> {
    inner: D,
    decryptions: Arc<AtomicUsize>,
}

impl<D: PuncturableDecryption> PuncturableDecryption for CountingDecryptor<D> {
    fn decrypt(&self, ciphertext: &Ciphertext) -> Option<DocIndex> {
        self.decryptions.fetch_add(1, Ordering::SeqCst);
        self.inner.decrypt(ciphertext)
    }
}

/// Store whose every operation fails, as a disk gone bad would.
#[derive(Clone, Copy, Default)]
pub struct FailingStore;

impl FailingStore {
    fn failure() -> JanusSSEError {
        JanusSSEError::StoreIO(String::from("injected I/O failure"))
    }
}

impl Store for FailingStore {
    fn get(&self, _: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        Err(Self::failure())
    }

    fn put(&self, _: &[u8], _: &[u8]) -> Result<(), JanusSSEError> {
        Err(Self::failure())
    }

    fn remove(&self, _: &[u8]) -> Result<bool, JanusSSEError> {
        Err(Self::failure())
    }

    fn len(&self) -> Result<usize, JanusSSEError> {
        Err(Self::failure())
    }
}

/// Store sleeping before every read, so that racing read-modify-write sequences over it interleave.
pub struct SlowStore<S> {
    inner: S,
    delay: Duration,
}

impl<S: Store> SlowStore<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        SlowStore { inner, delay }
    }
}

impl<S: Store> Store for SlowStore<S> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        thread::sleep(self.delay);
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), JanusSSEError> {
        self.inner.put(key, value)
    }

    fn remove(&self, key: &[u8]) -> Result<bool, JanusSSEError> {
        self.inner.remove(key)
    }

    fn take(&self, key: &[u8]) -> Result<Option<Vec<u8>>, JanusSSEError> {
        thread::sleep(self.delay);
        self.inner.take(key)
    }

    fn len(&self) -> Result<usize, JanusSSEError> {
        self.inner.len()
    }
}

#[cfg(test)]
mod test {
    use super::{FeistelPermutation, XorSharePuncturable, ct_eq};
    use crate::sse_internals::{
        punct::{PuncturableDecryption, PuncturableEncryption},
        tdp::{TrapdoorInverse, TrapdoorPermutation},
    };
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn feistel_inverts(key in any::<[u8; 32]>(), x in any::<[u8; 32]>()) {
            let tdp = FeistelPermutation::new(key);
            let y = tdp.eval(&x);

            prop_assert_ne!(x, y);
            prop_assert_eq!(tdp.invert(&y), x);
        }
    }

    #[test]
    fn constant_time_equality() {
        assert!(ct_eq(b"same", b"same"));
        assert!(!ct_eq(b"same", b"sane"));
        assert!(!ct_eq(b"same", b"sam"));
    }

    #[test]
    fn eval_n_composes() {
        let tdp = FeistelPermutation::new([9u8; 32]);
        let x = [3u8; 32];

        assert_eq!(tdp.eval_n(&x, 0), x);
        assert_eq!(tdp.eval_n(&x, 3), tdp.eval(&tdp.eval(&tdp.eval(&x))));
        assert_eq!(tdp.eval_n(&tdp.eval_n(&x, 2), 5), tdp.eval_n(&x, 7));
    }

    #[test]
    fn punctured_tags_stop_decrypting() {
        let scheme = XorSharePuncturable;
        let key = [11u8; 32];
        let (tag_a, tag_b) = ([1u8; 16], [2u8; 16]);

        let ct_a = scheme.encrypt(&key, 100, &tag_a);
        let ct_b = scheme.encrypt(&key, 200, &tag_b);

        let unpunctured = scheme.decryptor(&scheme.initial_keyshare(&key, 0), &[]);
        assert_eq!(unpunctured.decrypt(&ct_a), Some(100));
        assert_eq!(unpunctured.decrypt(&ct_b), Some(200));

        let share = scheme.inc_puncture(&key, 1, &tag_a);
        let punctured = scheme.decryptor(&scheme.initial_keyshare(&key, 1), &[share]);
        assert_eq!(punctured.decrypt(&ct_a), None);
        assert_eq!(punctured.decrypt(&ct_b), Some(200));
    }

    #[test]
    fn missing_share_decrypts_nothing() {
        let scheme = XorSharePuncturable;
        let key = [12u8; 32];
        let ct = scheme.encrypt(&key, 7, &[5u8; 16]);

        let incomplete = scheme.decryptor(&scheme.initial_keyshare(&key, 2), &[scheme.inc_puncture(&key, 1, &[6u8; 16])]);
        assert_eq!(incomplete.decrypt(&ct), None);

        let other_key = scheme.decryptor(&scheme.initial_keyshare(&[13u8; 32], 0), &[]);
        assert_eq!(other_key.decrypt(&ct), None);
    }
}
