//! Search states, their canonical keys, and the shared seen-set.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use smallvec::SmallVec;

use crate::fraction::DyadicFraction;

/// A multiset of values, kept in ascending order
pub type State = Vec<DyadicFraction>;

/// Renders a state as `[a b c]`
#[derive(Debug, Clone, Copy)]
pub struct StateDisplay<'a>(pub &'a [DyadicFraction]);

impl fmt::Display for StateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (index, value) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str("]")
    }
}

/// Order-independent key of a multiset of fractions.
///
/// Every value is reduced before it is recorded, so two states holding the
/// same values produce the same key no matter how they were written.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalKey(SmallVec<[(u64, u8); 8]>);

impl CanonicalKey {
    pub fn of<'a>(values: impl IntoIterator<Item = &'a DyadicFraction>) -> Self {
        let mut reduced: SmallVec<[DyadicFraction; 8]> =
            values.into_iter().map(|value| value.reduce()).collect();
        reduced.sort_unstable();
        Self(
            reduced
                .into_iter()
                .map(|value| (value.numerator(), value.exponent()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Set of states visited during one solve, with the shallowest depth each
/// was reached at.
///
/// Shared by every branch of the search; `test_and_set` is the only way in.
#[derive(Debug, Default)]
pub struct SeenSet {
    keys: Mutex<HashMap<CanonicalKey, usize>>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as reached at `depth`, returning whether it was already
    /// reached at the same depth or shallower.
    ///
    /// A deeper earlier visit does not count: the new visit has more mixes
    /// left before any depth limit and replaces it.
    pub fn test_and_set(&self, key: CanonicalKey, depth: usize) -> bool {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        match keys.entry(key) {
            Entry::Occupied(mut entry) => {
                if *entry.get() <= depth {
                    return true;
                }
                entry.insert(depth);
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(depth);
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
