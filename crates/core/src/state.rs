//! State hashing strategies.
//!
//! Planners memoise per-state results (expectation caches, cached policies)
//! under a key derived from the state's *value*. How that key is derived is
//! a pluggable strategy so the core never assumes a state encoding.

use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// Derives a value-equality key for a state.
///
/// Two states that should share memoised results must map to equal keys.
pub trait StateHasher<S> {
    /// The hashed form of a state.
    type Key: Clone + Eq + Hash + Debug;

    /// Compute the key for `state`.
    fn key(&self, state: &S) -> Self::Key;
}

/// Uses the state itself as its key.
///
/// Suitable whenever the state type already has value semantics for
/// `Eq` and `Hash`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueHasher;

impl<S> StateHasher<S> for ValueHasher
where
    S: Clone + Eq + Hash + Debug,
{
    type Key = S;

    fn key(&self, state: &S) -> S {
        state.clone()
    }
}

/// Projects a state onto a key with a function.
///
/// Useful for ignoring parts of a state (e.g. object identifiers) or for
/// states that are not `Hash` themselves.
///
/// ```rust
/// use semimdp_core::{FnHasher, StateHasher};
///
/// // Only the position matters, not the step counter
/// let hasher = FnHasher::new(|s: &(i32, u64)| s.0);
/// assert_eq!(hasher.key(&(3, 10)), hasher.key(&(3, 99)));
/// ```
pub struct FnHasher<F, S, K> {
    f: F,
    _phantom: PhantomData<fn(&S) -> K>,
}

impl<F, S, K> FnHasher<F, S, K>
where
    F: Fn(&S) -> K,
{
    /// Create a hasher from a projection function.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: PhantomData,
        }
    }
}

impl<F, S, K> StateHasher<S> for FnHasher<F, S, K>
where
    F: Fn(&S) -> K,
    K: Clone + Eq + Hash + Debug,
{
    type Key = K;

    fn key(&self, state: &S) -> K {
        (self.f)(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_hasher_uses_equality() {
        let h = ValueHasher;
        assert_eq!(h.key(&(1, 2)), (1, 2));
        assert_ne!(h.key(&"a".to_string()), h.key(&"b".to_string()));
    }

    #[test]
    fn test_fn_hasher_projects() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Obj {
            id: u32,
            x: i32,
        }

        let h = FnHasher::new(|o: &Obj| o.x);
        assert_eq!(h.key(&Obj { id: 1, x: 5 }), h.key(&Obj { id: 2, x: 5 }));
        assert_ne!(h.key(&Obj { id: 1, x: 5 }), h.key(&Obj { id: 1, x: 6 }));
    }
}
