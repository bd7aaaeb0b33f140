use super::params::{DERIVATION_KEY_BYTE_LEN, PRF_DOMAIN_SEPARATOR, PRF_KEY_BYTE_LEN, SEARCH_TOKEN_BYTE_LEN, UPDATE_TOKEN_BYTE_LEN};
use turboshake::TurboShake128;
use zeroize::Zeroize;

pub type PrfKey = [u8; PRF_KEY_BYTE_LEN];
pub type SearchToken = [u8; SEARCH_TOKEN_BYTE_LEN];
pub type UpdateToken = [u8; UPDATE_TOKEN_BYTE_LEN];
pub type DerivationKey = [u8; DERIVATION_KEY_BYTE_LEN];

/// Suffix appended to a chain element before deriving its update token.
const TOKEN_SUFFIX: u8 = b'0';
/// Suffix appended to a chain element before deriving its payload mask.
const MASK_SUFFIX: u8 = b'1';

/// Keyed pseudorandom function, instantiated with TurboSHAKE128.
///
/// Output is `TurboSHAKE128(key || input)` squeezed to the requested length, finalized with a PRF specific
/// domain separator. The key has fixed length, so `key || input` is an unambiguous encoding.
/// Callers domain separate distinct uses of one key by appending a distinct label to `input`.
pub struct Prf {
    key: PrfKey,
}

impl Prf {
    pub fn new(key: PrfKey) -> Prf {
        Prf { key }
    }

    /// Evaluates the PRF, producing a fixed length output.
    #[inline]
    pub fn prf<const OUT_BYTE_LEN: usize>(&self, input: &[u8]) -> [u8; OUT_BYTE_LEN] {
        let mut out = [0u8; OUT_BYTE_LEN];
        self.fill(&[input], &mut out);
        out
    }

    /// Evaluates the PRF on a sequence of input fragments, as if they were concatenated.
    #[inline]
    pub fn prf_parts<const OUT_BYTE_LEN: usize>(&self, parts: &[&[u8]]) -> [u8; OUT_BYTE_LEN] {
        let mut out = [0u8; OUT_BYTE_LEN];
        self.fill(parts, &mut out);
        out
    }

    /// Derives a fresh PRF key from this one and a purpose label.
    ///
    /// Keys derived under distinct labels are independent, which is what allows compartmentalizing one master key.
    #[inline]
    pub fn prf_string(&self, label: &str) -> PrfKey {
        self.prf::<PRF_KEY_BYTE_LEN>(label.as_bytes())
    }

    fn fill(&self, parts: &[&[u8]], out: &mut [u8]) {
        let mut hasher = TurboShake128::default();
        hasher.absorb(&self.key);
        for part in parts {
            hasher.absorb(part);
        }
        hasher.finalize::<{ PRF_DOMAIN_SEPARATOR }>();
        hasher.squeeze(out);
    }
}

impl Drop for Prf {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Derives the update token under which the payload of chain element `element` is stored.
#[inline]
pub fn derive_token(derivation_prf: &Prf, element: &SearchToken) -> UpdateToken {
    derivation_prf.prf_parts::<UPDATE_TOKEN_BYTE_LEN>(&[element.as_slice(), &[TOKEN_SUFFIX]])
}

/// Derives the mask hiding the payload of chain element `element`.
#[inline]
pub fn derive_mask<const N: usize>(derivation_prf: &Prf, element: &SearchToken) -> [u8; N] {
    derivation_prf.prf_parts::<N>(&[element.as_slice(), &[MASK_SUFFIX]])
}

/// Derives both the update token and the payload mask of a chain element.
#[inline]
pub fn derive_token_mask<const N: usize>(derivation_prf: &Prf, element: &SearchToken) -> (UpdateToken, [u8; N]) {
    (derive_token(derivation_prf, element), derive_mask::<N>(derivation_prf, element))
}

/// XORs `mask` into `value`. Self-inverse, so it both masks and unmasks. Runs in time independent of the operands.
#[inline(always)]
pub fn xor_mask<const N: usize>(value: &[u8; N], mask: &[u8; N]) -> [u8; N] {
    let mut out = [0u8; N];
    out.iter_mut().zip(value.iter().zip(mask.iter())).for_each(|(o, (&v, &m))| *o = v ^ m);
    out
}

#[cfg(test)]
mod test {
    use super::{Prf, derive_mask, derive_token, derive_token_mask, xor_mask};
    use proptest::prelude::*;
    use test_case::test_case;

    #[test]
    fn prf_is_deterministic_and_keyed() {
        let prf_a = Prf::new([7u8; 32]);
        let prf_b = Prf::new([8u8; 32]);

        assert_eq!(prf_a.prf::<32>(b"keyword"), prf_a.prf::<32>(b"keyword"));
        assert_ne!(prf_a.prf::<32>(b"keyword"), prf_b.prf::<32>(b"keyword"));
        assert_ne!(prf_a.prf::<32>(b"keyword"), prf_a.prf::<32>(b"keyworD"));
    }

    #[test]
    fn prf_parts_matches_concatenation() {
        let prf = Prf::new([42u8; 32]);
        assert_eq!(prf.prf_parts::<24>(&[b"abc".as_slice(), b"def".as_slice()]), prf.prf::<24>(b"abcdef"));
    }

    #[test_case("tag_derivation", "punct_enc"; "tag vs puncturable key")]
    #[test_case("add_derivation_master_key", "del_derivation_master_key"; "insertion vs deletion derivation")]
    #[test_case("keyword_token", "add_kw_token_master_key"; "keyword token vs insertion token")]
    fn derived_keys_are_distinct(label_a: &str, label_b: &str) {
        let master = Prf::new([1u8; 32]);
        assert_ne!(master.prf_string(label_a), master.prf_string(label_b));
    }

    #[test]
    fn token_and_mask_are_domain_separated() {
        let derivation_prf = Prf::new([3u8; 32]);
        let element = [9u8; 32];

        let token = derive_token(&derivation_prf, &element);
        let mask = derive_mask::<16>(&derivation_prf, &element);
        assert_ne!(token, mask);

        let (token_again, mask_again) = derive_token_mask::<16>(&derivation_prf, &element);
        assert_eq!(token, token_again);
        assert_eq!(mask, mask_again);
    }

    proptest! {
        #[test]
        fn unmasking_recovers_payload(payload in any::<[u8; 32]>(), key in any::<[u8; 32]>(), element in any::<[u8; 32]>()) {
            let derivation_prf = Prf::new(key);
            let mask = derive_mask::<32>(&derivation_prf, &element);

            prop_assert_eq!(xor_mask(&xor_mask(&payload, &mask), &mask), payload);
        }
    }
}
