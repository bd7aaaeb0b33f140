use super::punct::{Ciphertext, DocIndex, KeyShare, PuncturableDecryption, PuncturableEncryption, Tag};
use std::collections::HashSet;
use tracing::debug;

/// What the deletion index of a keyword version says about its insertions.
///
/// Built once per search from the first key share plus every puncturing share retrieved from the deletion index.
/// Holds a decryptor refusing every punctured ciphertext, and the set of punctured tags, which the result cache is
/// filtered against.
pub struct DeletionOverlay<D: PuncturableDecryption> {
    decryptor: D,
    removed_tags: HashSet<Tag>,
}

impl<D: PuncturableDecryption> DeletionOverlay<D> {
    /// Folds the retrieved key shares, given in any order, into an overlay.
    pub fn fold<P>(scheme: &P, first_key_share: &KeyShare, key_shares: &[KeyShare]) -> DeletionOverlay<D>
    where
        P: PuncturableEncryption<Decryptor = D>,
    {
        let removed_tags = key_shares.iter().map(|share| scheme.key_share_tag(share)).collect::<HashSet<_>>();
        debug!(key_shares = key_shares.len(), removed_tags = removed_tags.len(), "folded deletion overlay");

        DeletionOverlay {
            decryptor: scheme.decryptor(first_key_share, key_shares),
            removed_tags,
        }
    }

    pub fn is_removed(&self, tag: &Tag) -> bool {
        self.removed_tags.contains(tag)
    }

    pub fn removed_tags(&self) -> &HashSet<Tag> {
        &self.removed_tags
    }

    pub fn decrypt(&self, ciphertext: &Ciphertext) -> Option<DocIndex> {
        self.decryptor.decrypt(ciphertext)
    }
}

#[cfg(test)]
mod test {
    use super::DeletionOverlay;
    use crate::{sse_internals::punct::PuncturableEncryption, testing::XorSharePuncturable};

    #[test]
    fn no_deletions() {
        let scheme = XorSharePuncturable;
        let key = [1u8; 32];
        let overlay = DeletionOverlay::fold(&scheme, &scheme.initial_keyshare(&key, 0), &[]);

        assert!(overlay.removed_tags().is_empty());
        assert_eq!(overlay.decrypt(&scheme.encrypt(&key, 42, &[3u8; 16])), Some(42));
    }

    #[test]
    fn shares_in_any_order_puncture_their_tags() {
        let scheme = XorSharePuncturable;
        let key = [2u8; 32];
        let tags = [[10u8; 16], [11u8; 16], [12u8; 16]];

        let mut shares = tags
            .iter()
            .enumerate()
            .map(|(idx, tag)| scheme.inc_puncture(&key, idx as u32 + 1, tag))
            .collect::<Vec<_>>();
        shares.reverse();

        let overlay = DeletionOverlay::fold(&scheme, &scheme.initial_keyshare(&key, 3), &shares);

        assert!(tags.iter().all(|tag| overlay.is_removed(tag)));
        assert!(!overlay.is_removed(&[13u8; 16]));

        assert_eq!(overlay.decrypt(&scheme.encrypt(&key, 1, &tags[1])), None);
        assert_eq!(overlay.decrypt(&scheme.encrypt(&key, 2, &[13u8; 16])), Some(2));
    }
}
