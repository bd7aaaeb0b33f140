use super::prf::SearchToken;
use std::sync::Arc;

/// Public direction of a trapdoor permutation over search tokens.
///
/// Anyone holding the public key can evaluate it, only the holder of the trapdoor can invert it. The search server
/// walks a keyword's chain forward with this trait, it never needs to invert.
pub trait TrapdoorPermutation: Send + Sync {
    fn eval(&self, x: &SearchToken) -> SearchToken;

    /// `n`-fold evaluation. Implementations with a faster way of fast-forwarding should override it.
    fn eval_n(&self, x: &SearchToken, n: u64) -> SearchToken {
        let mut y = *x;
        for _ in 0..n {
            y = self.eval(&y);
        }
        y
    }

    fn public_key(&self) -> String;
}

/// Secret direction of a trapdoor permutation, held by the client.
pub trait TrapdoorInverse: TrapdoorPermutation {
    fn invert(&self, y: &SearchToken) -> SearchToken;
}

impl<T: TrapdoorPermutation + ?Sized> TrapdoorPermutation for Arc<T> {
    fn eval(&self, x: &SearchToken) -> SearchToken {
        (**self).eval(x)
    }

    fn eval_n(&self, x: &SearchToken, n: u64) -> SearchToken {
        (**self).eval_n(x, n)
    }

    fn public_key(&self) -> String {
        (**self).public_key()
    }
}

impl<T: TrapdoorInverse + ?Sized> TrapdoorInverse for Arc<T> {
    fn invert(&self, y: &SearchToken) -> SearchToken {
        (**self).invert(y)
    }
}
