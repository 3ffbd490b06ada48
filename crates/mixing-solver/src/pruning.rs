//! Reachability pruning for the solver.
//!
//! These checks detect (state, target) pairs that no sequence of mixes can
//! ever connect, allowing the solver to skip whole subtrees. They are
//! necessary conditions only: passing them proves nothing.

use thiserror::Error;

use crate::fraction::DyadicFraction;

/// Why a target cannot be reached from a state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Infeasible {
    #[error("state has {state} elements but the target has {target}")]
    LengthMismatch { state: usize, target: usize },

    #[error("insufficient instances of min value to reach target: {have} < {need}")]
    InsufficientMinimum { have: usize, need: usize },

    #[error("no mix will ever reach minimum: {target} < {best}")]
    MinimumUnreachable {
        target: DyadicFraction,
        best: DyadicFraction,
    },

    #[error("insufficient instances of max value to reach target: {have} < {need}")]
    InsufficientMaximum { have: usize, need: usize },

    #[error("no mix will ever reach maximum: {best} < {target}")]
    MaximumUnreachable {
        target: DyadicFraction,
        best: DyadicFraction,
    },
}

/// Check whether `target` might still be reachable from `state`.
///
/// Both slices must be sorted ascending and have the same length.
pub fn check_reachable(
    state: &[DyadicFraction],
    target: &[DyadicFraction],
) -> Result<(), Infeasible> {
    if state.len() != target.len() {
        return Err(Infeasible::LengthMismatch {
            state: state.len(),
            target: target.len(),
        });
    }
    let (Some(&lowest), Some(&highest)) = (target.first(), target.last()) else {
        return Ok(());
    };

    // Minimum end
    let need = target.iter().take_while(|value| **value == lowest).count();
    let have = count_equal(state, lowest);
    if have < need {
        // Nothing below the floor means no mix can produce another copy of it
        if state[0] >= lowest {
            return Err(Infeasible::InsufficientMinimum { have, need });
        }
        if let Some(best) = lowest_reachable(state, lowest) {
            if best > lowest {
                return Err(Infeasible::MinimumUnreachable { target: lowest, best });
            }
        }
    }

    // Maximum end
    let need = target.iter().rev().take_while(|value| **value == highest).count();
    let have = count_equal(state, highest);
    if have < need {
        if state[state.len() - 1] <= highest {
            return Err(Infeasible::InsufficientMaximum { have, need });
        }
        if let Some(best) = highest_reachable(state, highest) {
            if best < highest {
                return Err(Infeasible::MaximumUnreachable { target: highest, best });
            }
        }
    }

    Ok(())
}

/// Convenience wrapper around [`check_reachable`]
pub fn is_reachable(state: &[DyadicFraction], target: &[DyadicFraction]) -> bool {
    check_reachable(state, target).is_ok()
}

fn count_equal(state: &[DyadicFraction], value: DyadicFraction) -> usize {
    state.iter().filter(|v| **v == value).count()
}

/// Lowest value the smallest element at or above `goal` can be pulled down to
/// by mixing it once with each element below `goal`, nearest first.
///
/// `None` when there is no such element or the arithmetic fails; either way
/// the caller cannot conclude anything.
fn lowest_reachable(state: &[DyadicFraction], goal: DyadicFraction) -> Option<DyadicFraction> {
    let start = state.iter().position(|value| *value >= goal)?;
    state[..start]
        .iter()
        .rev()
        .try_fold(state[start], |mix, &value| mix.mix(value).ok())
}

/// Mirror of [`lowest_reachable`] at the top end.
fn highest_reachable(state: &[DyadicFraction], goal: DyadicFraction) -> Option<DyadicFraction> {
    let end = state.iter().rposition(|value| *value <= goal)?;
    state[end + 1..]
        .iter()
        .try_fold(state[end], |mix, &value| mix.mix(value).ok())
}
