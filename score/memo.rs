//! Exact-match memoization for the scoring operations.
//!
//! Every cached operation of a scoring function is a pure function of its
//! numeric arguments. Keys therefore compare scalars by their IEEE-754 bit
//! pattern and the expectations vector by a bit-level snapshot of every
//! element, so a hit only happens when the call is identical, never when it is
//! merely close.

use ahash::AHashMap;
use ndarray::ArrayView1;
use std::cell::{Cell, RefCell};
use std::hash::Hash;

/// Bit-level snapshot of an expectations vector, usable as a hash key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpectationsKey(Vec<u64>);

impl ExpectationsKey {
    pub fn snapshot(expectations: ArrayView1<'_, f64>) -> Self {
        Self(expectations.iter().map(|&p| p.to_bits()).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A single memoized operation: stored results plus a hit counter.
///
/// Interior mutability keeps the scoring API on `&self`. The `RefCell` makes the
/// owner `!Sync`: concurrent drivers build one scoring function per worker.
#[derive(Debug)]
pub struct Memo<K, V> {
    entries: RefCell<AHashMap<K, V>>,
    hits: Cell<u64>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(AHashMap::new()),
            hits: Cell::new(0),
        }
    }
}

impl<K: Eq + Hash, V: Clone> Memo<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored value for `key`, or runs `compute` and stores its result.
    ///
    /// The map is not borrowed while `compute` runs, so the computation is free
    /// to consult other memos owned by the same scoring function.
    pub fn evaluate(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(stored) = self.lookup(&key) {
            return stored;
        }
        let value = compute();
        self.entries.borrow_mut().insert(key, value.clone());
        value
    }

    /// Fallible variant of [`Memo::evaluate`]. Errors are returned to the caller
    /// and never stored.
    pub fn try_evaluate<E>(
        &self,
        key: K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(stored) = self.lookup(&key) {
            return Ok(stored);
        }
        let value = compute()?;
        self.entries.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    pub fn hits(&self) -> u64 {
        self.hits.get()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    fn lookup(&self, key: &K) -> Option<V> {
        let stored = self.entries.borrow().get(key).cloned();
        if stored.is_some() {
            self.hits.set(self.hits.get() + 1);
        }
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn second_evaluation_is_a_hit() {
        let memo: Memo<u64, f64> = Memo::new();
        let mut calls = 0;
        let first = memo.evaluate(7, || {
            calls += 1;
            1.5
        });
        let second = memo.evaluate(7, || {
            calls += 1;
            99.0
        });
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(calls, 1);
        assert_eq!(memo.hits(), 1);
        assert_eq!(memo.len(), 1);
    }

    #[test]
    fn errors_are_not_stored() {
        let memo: Memo<u64, f64> = Memo::new();
        let failed: Result<f64, &str> = memo.try_evaluate(1, || Err("no root"));
        assert!(failed.is_err());
        assert!(memo.is_empty());

        let recovered: Result<f64, &str> = memo.try_evaluate(1, || Ok(2.0));
        assert_eq!(recovered, Ok(2.0));
        assert_eq!(memo.hits(), 0);
    }

    #[test]
    fn snapshot_distinguishes_signed_zero_and_order() {
        let a = ExpectationsKey::snapshot(array![0.0, 0.5].view());
        let b = ExpectationsKey::snapshot(array![-0.0, 0.5].view());
        let c = ExpectationsKey::snapshot(array![0.5, 0.0].view());
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, ExpectationsKey::snapshot(array![0.0, 0.5].view()));
        assert_eq!(a.len(), 2);
        assert!(!a.is_empty());
    }
}
