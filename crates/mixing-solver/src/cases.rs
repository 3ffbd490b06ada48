//! Enumeration of solvable-looking target sets for batch runs.

use thiserror::Error;

use crate::fraction::{DyadicFraction, MAX_EXPONENT};
use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaseError {
    #[error("width must be at least 1")]
    ZeroWidth,

    #[error("denominators of 2^{0} and larger are not supported")]
    PrecisionOutOfRange(u8),
}

/// Iterates every sorted multiset of `width` values in `[0, 1]` with
/// denominator `2^precision` whose sum is an integer.
///
/// Values are yielded reduced, in lexicographic order of their numerators.
#[derive(Debug, Clone)]
pub struct CaseGenerator {
    precision: u8,
    unit: u64,
    next: Option<Vec<u64>>,
}

impl CaseGenerator {
    pub fn new(width: usize, precision: u8) -> Result<Self, CaseError> {
        if width == 0 {
            return Err(CaseError::ZeroWidth);
        }
        if precision >= MAX_EXPONENT {
            return Err(CaseError::PrecisionOutOfRange(precision));
        }
        Ok(Self {
            precision,
            unit: 1u64 << precision,
            next: Some(vec![0; width]),
        })
    }

    /// Step `numerators` to the next non-decreasing tuple, or `false` when
    /// every slot is already at the top.
    fn advance(&self, numerators: &mut [u64]) -> bool {
        let Some(index) = numerators.iter().rposition(|&n| n < self.unit) else {
            return false;
        };
        let value = numerators[index] + 1;
        numerators[index..].fill(value);
        true
    }

    fn is_integral(&self, numerators: &[u64]) -> bool {
        let total: u128 = numerators.iter().map(|&n| u128::from(n)).sum();
        total % u128::from(self.unit) == 0
    }
}

impl Iterator for CaseGenerator {
    type Item = State;

    fn next(&mut self) -> Option<State> {
        loop {
            let current = self.next.take()?;
            let mut following = current.clone();
            if self.advance(&mut following) {
                self.next = Some(following);
            }
            if self.is_integral(&current) {
                return Some(
                    current
                        .iter()
                        .map(|&n| DyadicFraction::new(n, self.precision).reduce())
                        .collect(),
                );
            }
        }
    }
}
