use super::{
    error::JanusSSEError,
    params::{TOKEN_TREE_DOMAIN_SEPARATOR, TOKEN_TREE_KEY_BYTE_LEN, TOKEN_TREE_MAX_DEPTH},
};
use turboshake::TurboShake128;

pub type TreeKey = [u8; TOKEN_TREE_KEY_BYTE_LEN];

const LEFT: u8 = 0;
const RIGHT: u8 = 1;

/// Binary tree of keys, where every child key is derived from its parent's.
///
/// A tree of depth `D` has `2^D` leaves, indexed from the left. Depths count from the leaves up: a leaf has depth 0,
/// the root depth `D`. Whoever holds a node's key can derive every key of its subtree and nothing else, so handing out
/// a few inner nodes grants access to exactly the leaves beneath them.
pub struct TokenTree;

impl TokenTree {
    /// Key of the `side` child of the node keyed `parent`, which sits at `depth`.
    #[inline]
    fn child(parent: &TreeKey, side: u8, depth: u8) -> TreeKey {
        let mut hasher = TurboShake128::default();
        hasher.absorb(parent);
        hasher.absorb(&[side, depth]);
        hasher.finalize::<{ TOKEN_TREE_DOMAIN_SEPARATOR }>();

        let mut child = [0u8; TOKEN_TREE_KEY_BYTE_LEN];
        hasher.squeeze(&mut child);
        child
    }

    #[inline]
    fn leaf_count(depth: u8) -> u64 {
        1u64 << depth
    }

    fn check_depth(depth: u8) -> Result<(), JanusSSEError> {
        if depth > TOKEN_TREE_MAX_DEPTH {
            return Err(JanusSSEError::InvalidTreeDepth(depth));
        }
        Ok(())
    }

    /// Derives leaf `node_index` of the tree rooted at `root`, walking down its bit path.
    pub fn derive_node(root: &TreeKey, node_index: u64, depth: u8) -> Result<TreeKey, JanusSSEError> {
        Self::check_depth(depth)?;
        if node_index >= Self::leaf_count(depth) {
            return Err(JanusSSEError::NodeIndexOutOfRange { index: node_index, depth });
        }

        let mut key = *root;
        for d in (1..=depth).rev() {
            let side = ((node_index >> (d - 1)) & 1) as u8;
            key = Self::child(&key, side, d);
        }

        Ok(key)
    }

    /// Derives the leftmost leaf, handing every right sibling met on the way down to `right_node_callback`, along
    /// with its depth. Those siblings, together with the returned leaf, cover the whole tree.
    pub fn derive_leftmost_node(root: &TreeKey, depth: u8, mut right_node_callback: impl FnMut(TreeKey, u8)) -> Result<TreeKey, JanusSSEError> {
        Self::check_depth(depth)?;

        let mut key = *root;
        for d in (1..=depth).rev() {
            right_node_callback(Self::child(&key, RIGHT, d), d - 1);
            key = Self::child(&key, LEFT, d);
        }

        Ok(key)
    }

    /// Derives all leaves beneath `key`, left to right.
    pub fn derive_all_leaves(key: &TreeKey, depth: u8, mut callback: impl FnMut(&TreeKey)) -> Result<(), JanusSSEError> {
        Self::check_depth(depth)?;
        Self::all_leaves_aux(key, depth, &mut callback);
        Ok(())
    }

    fn all_leaves_aux<F: FnMut(&TreeKey)>(key: &TreeKey, depth: u8, callback: &mut F) {
        if depth == 0 {
            callback(key);
            return;
        }

        Self::all_leaves_aux(&Self::child(key, LEFT, depth), depth - 1, callback);
        Self::all_leaves_aux(&Self::child(key, RIGHT, depth), depth - 1, callback);
    }

    /// Derives the leaves with index in `[start_index, end_index)`, left to right.
    ///
    /// Subtrees entirely inside the range are expanded as a whole, subtrees outside of it are never entered, so the
    /// cost is proportional to the range size plus the depth.
    pub fn derive_leaves(
        root: &TreeKey,
        depth: u8,
        start_index: u64,
        end_index: u64,
        mut callback: impl FnMut(&TreeKey),
    ) -> Result<(), JanusSSEError> {
        Self::check_depth(depth)?;
        if start_index > end_index || end_index > Self::leaf_count(depth) {
            return Err(JanusSSEError::InvalidLeafRange { start: start_index, end: end_index });
        }

        Self::leaves_aux(root, depth, 0, start_index, end_index, &mut callback);
        Ok(())
    }

    fn leaves_aux<F: FnMut(&TreeKey)>(key: &TreeKey, depth: u8, offset: u64, start: u64, end: u64, callback: &mut F) {
        let subtree_end = offset + Self::leaf_count(depth);

        if subtree_end <= start || end <= offset {
            return;
        }
        if start <= offset && subtree_end <= end {
            Self::all_leaves_aux(key, depth, callback);
            return;
        }

        let half = Self::leaf_count(depth - 1);
        Self::leaves_aux(&Self::child(key, LEFT, depth), depth - 1, offset, start, end, callback);
        Self::leaves_aux(&Self::child(key, RIGHT, depth), depth - 1, offset + half, start, end, callback);
    }

    /// Minimal left to right list of `(node key, depth)` whose leaves are exactly the first `node_count` leaves.
    ///
    /// Holds at most `depth + 1` nodes. It is empty iff `node_count == 0` and it is the root alone iff the tree is
    /// full.
    pub fn covering_list(root: &TreeKey, node_count: u64, depth: u8) -> Result<Vec<(TreeKey, u8)>, JanusSSEError> {
        Self::check_depth(depth)?;
        if node_count > Self::leaf_count(depth) {
            return Err(JanusSSEError::InvalidLeafRange { start: 0, end: node_count });
        }

        let mut list = Vec::with_capacity(depth as usize + 1);
        Self::covering_list_aux(root, node_count, depth, &mut list);
        Ok(list)
    }

    fn covering_list_aux(key: &TreeKey, node_count: u64, depth: u8, list: &mut Vec<(TreeKey, u8)>) {
        if node_count == 0 {
            return;
        }
        if node_count == Self::leaf_count(depth) {
            list.push((*key, depth));
            return;
        }

        let half = Self::leaf_count(depth - 1);
        let left = Self::child(key, LEFT, depth);

        if node_count <= half {
            Self::covering_list_aux(&left, node_count, depth - 1, list);
        } else {
            list.push((left, depth - 1));
            Self::covering_list_aux(&Self::child(key, RIGHT, depth), node_count - half, depth - 1, list);
        }
    }

    /// Like [`TokenTree::covering_list`], leaving out every leaf whose deletion count is non zero.
    ///
    /// `deletion_counts[i]` belongs to leaf `i`, leaves past the end of the slice have no deletions. A node enters the
    /// list whole iff all of its leaves are live, otherwise it's split.
    pub fn covering_list_with_deletions(root: &TreeKey, node_count: u64, depth: u8, deletion_counts: &[u32]) -> Result<Vec<(TreeKey, u8)>, JanusSSEError> {
        Self::check_depth(depth)?;
        if node_count > Self::leaf_count(depth) {
            return Err(JanusSSEError::InvalidLeafRange { start: 0, end: node_count });
        }

        let tracked = (deletion_counts.len() as u64).min(node_count) as usize;
        let deleted_prefix = std::iter::once(0u64)
            .chain(deletion_counts[..tracked].iter().scan(0u64, |acc, &count| {
                *acc += (count != 0) as u64;
                Some(*acc)
            }))
            .collect::<Vec<_>>();

        let live = LiveLeaves { node_count, deleted_prefix };

        let mut list = Vec::new();
        Self::covering_list_with_deletions_aux(root, depth, 0, &live, &mut list);
        Ok(list)
    }

    fn covering_list_with_deletions_aux(key: &TreeKey, depth: u8, offset: u64, live: &LiveLeaves, list: &mut Vec<(TreeKey, u8)>) {
        let leaf_count = Self::leaf_count(depth);
        let live_count = live.count(offset, offset + leaf_count);

        if live_count == 0 {
            return;
        }
        if live_count == leaf_count {
            list.push((*key, depth));
            return;
        }

        let half = Self::leaf_count(depth - 1);
        Self::covering_list_with_deletions_aux(&Self::child(key, LEFT, depth), depth - 1, offset, live, list);
        Self::covering_list_with_deletions_aux(&Self::child(key, RIGHT, depth), depth - 1, offset + half, live, list);
    }
}

/// Answers "how many live leaves in `[lo, hi)`" in constant time.
struct LiveLeaves {
    node_count: u64,
    /// `deleted_prefix[i]` is the number of deleted leaves among the first `i` tracked ones.
    deleted_prefix: Vec<u64>,
}

impl LiveLeaves {
    fn count(&self, lo: u64, hi: u64) -> u64 {
        let hi = hi.min(self.node_count);
        if lo >= hi {
            return 0;
        }

        let tracked = (self.deleted_prefix.len() - 1) as u64;
        let deleted = self.deleted_prefix[hi.min(tracked) as usize] - self.deleted_prefix[lo.min(tracked) as usize];

        (hi - lo) - deleted
    }
}

#[cfg(test)]
mod test {
    use super::{TokenTree, TreeKey};
    use crate::JanusSSEError;
    use proptest::prelude::*;
    use test_case::test_case;

    fn leaves_of(list: &[(TreeKey, u8)]) -> Vec<TreeKey> {
        let mut leaves = Vec::new();
        for (key, depth) in list {
            TokenTree::derive_all_leaves(key, *depth, |leaf| leaves.push(*leaf)).unwrap();
        }
        leaves
    }

    fn range_leaves(root: &TreeKey, depth: u8, start: u64, end: u64) -> Vec<TreeKey> {
        let mut leaves = Vec::new();
        TokenTree::derive_leaves(root, depth, start, end, |leaf| leaves.push(*leaf)).unwrap();
        leaves
    }

    #[test]
    fn all_leaves_follow_node_indices() {
        let root = [1u8; 32];
        let depth = 5;

        let mut leaves = Vec::new();
        TokenTree::derive_all_leaves(&root, depth, |leaf| leaves.push(*leaf)).unwrap();

        assert_eq!(leaves.len(), 32);
        for (idx, leaf) in leaves.iter().enumerate() {
            assert_eq!(*leaf, TokenTree::derive_node(&root, idx as u64, depth).unwrap());
        }
    }

    #[test]
    fn leftmost_walk_reveals_whole_tree() {
        let root = [2u8; 32];
        let depth = 6;

        let mut siblings = Vec::new();
        let leftmost = TokenTree::derive_leftmost_node(&root, depth, |key, d| siblings.push((key, d))).unwrap();
        assert_eq!(leftmost, TokenTree::derive_node(&root, 0, depth).unwrap());
        assert_eq!(siblings.iter().map(|&(_, d)| d).collect::<Vec<_>>(), vec![5, 4, 3, 2, 1, 0]);

        // Right siblings, from the deepest up, cover leaves [1, 2), [2, 4), [4, 8), ...
        let mut rebuilt = vec![leftmost];
        for (key, d) in siblings.iter().rev() {
            TokenTree::derive_all_leaves(key, *d, |leaf| rebuilt.push(*leaf)).unwrap();
        }
        assert_eq!(rebuilt, range_leaves(&root, depth, 0, 64));
    }

    #[test_case(0, 4, 0 ; "empty")]
    #[test_case(16, 4, 1 ; "full tree is root alone")]
    #[test_case(15, 4, 4 ; "one short of full")]
    #[test_case(1, 4, 1 ; "single leaf")]
    #[test_case(0b1011, 4, 3 ; "one node per set bit")]
    fn covering_list_length(node_count: u64, depth: u8, expected_len: usize) {
        let list = TokenTree::covering_list(&[3u8; 32], node_count, depth).unwrap();
        assert_eq!(list.len(), expected_len);
    }

    #[test]
    fn covering_list_of_full_tree_is_root() {
        let root = [4u8; 32];
        assert_eq!(TokenTree::covering_list(&root, 8, 3).unwrap(), vec![(root, 3)]);
    }

    #[test]
    fn deleted_leaves_are_not_covered() {
        let root = [5u8; 32];
        let depth = 4;
        let node_count = 13;
        let mut deletion_counts = vec![0u32; 16];
        deletion_counts[2] = 1;
        deletion_counts[9] = 3;
        deletion_counts[14] = 1;

        let list = TokenTree::covering_list_with_deletions(&root, node_count, depth, &deletion_counts).unwrap();
        let expected = (0..node_count)
            .filter(|&idx| deletion_counts[idx as usize] == 0)
            .map(|idx| TokenTree::derive_node(&root, idx, depth).unwrap())
            .collect::<Vec<_>>();

        assert_eq!(leaves_of(&list), expected);
    }

    #[test]
    fn no_deletions_matches_plain_covering_list() {
        let root = [6u8; 32];
        assert_eq!(
            TokenTree::covering_list_with_deletions(&root, 11, 4, &[]).unwrap(),
            TokenTree::covering_list(&root, 11, 4).unwrap()
        );
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        let root = [7u8; 32];

        assert_eq!(TokenTree::derive_node(&root, 8, 3), Err(JanusSSEError::NodeIndexOutOfRange { index: 8, depth: 3 }));
        assert_eq!(TokenTree::covering_list(&root, 9, 3), Err(JanusSSEError::InvalidLeafRange { start: 0, end: 9 }));
        assert_eq!(
            TokenTree::derive_leaves(&root, 3, 5, 4, |_| {}),
            Err(JanusSSEError::InvalidLeafRange { start: 5, end: 4 })
        );
        assert_eq!(TokenTree::derive_node(&root, 0, 64), Err(JanusSSEError::InvalidTreeDepth(64)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn covering_list_covers_exactly_the_first_leaves(root in any::<[u8; 32]>(), depth in 0u8..8, fraction in 0.0f64..=1.0) {
            let node_count = ((1u64 << depth) as f64 * fraction).floor() as u64;
            let list = TokenTree::covering_list(&root, node_count, depth).unwrap();

            prop_assert!(list.len() <= depth as usize + 1);
            prop_assert_eq!(list.is_empty(), node_count == 0);
            prop_assert_eq!(leaves_of(&list), range_leaves(&root, depth, 0, node_count));
        }

        #[test]
        fn derive_leaves_matches_derive_node(root in any::<[u8; 32]>(), depth in 0u8..7, a in any::<u64>(), b in any::<u64>()) {
            let leaf_count = 1u64 << depth;
            let (start, end) = {
                let (x, y) = (a % (leaf_count + 1), b % (leaf_count + 1));
                (x.min(y), x.max(y))
            };

            let expected = (start..end).map(|idx| TokenTree::derive_node(&root, idx, depth).unwrap()).collect::<Vec<_>>();
            prop_assert_eq!(range_leaves(&root, depth, start, end), expected);
        }
    }
}
