//! Replay of a solution path, one mix at a time.
//!
//! The solver reports a path of whole states. These functions recover the
//! individual mixes between consecutive states and check that applying them
//! to the starting multiset really ends at the target.

use serde::Serialize;
use thiserror::Error;

use crate::fraction::{DyadicFraction, FractionError};
use crate::solver::Solution;
use crate::state::{State, StateDisplay};

/// A single mix: one copy each of `left` and `right` become two of `result`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MixStep {
    pub left: DyadicFraction,
    pub right: DyadicFraction,
    pub result: DyadicFraction,
}

impl MixStep {
    pub fn new(left: DyadicFraction, right: DyadicFraction) -> Result<Self, FractionError> {
        let result = left.mix(right)?;
        Ok(Self {
            left,
            right,
            result,
        })
    }
}

/// Steps are numbered from 1
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplayError {
    #[error("path is empty")]
    EmptyPath,

    #[error("path starts at {} instead of {}", StateDisplay(.found), StateDisplay(.expected))]
    WrongStart { expected: State, found: State },

    #[error("path ends at {} instead of {}", StateDisplay(.found), StateDisplay(.expected))]
    WrongEnd { expected: State, found: State },

    #[error("step {step}: states hold {before} and {after} values")]
    WidthChanged {
        step: usize,
        before: usize,
        after: usize,
    },

    #[error("step {step}: {removed} values removed and {added} added, not a single mix")]
    NotASingleMix {
        step: usize,
        removed: usize,
        added: usize,
    },

    #[error("step {step}: {left} and {right} do not mix to {result}")]
    WrongResult {
        step: usize,
        left: DyadicFraction,
        right: DyadicFraction,
        result: DyadicFraction,
    },

    #[error("step {step}: cannot mix {left} and {right}: {source}")]
    Arithmetic {
        step: usize,
        left: DyadicFraction,
        right: DyadicFraction,
        source: FractionError,
    },

    #[error("step {step}: {value} is not in the state")]
    MissingOperand { step: usize, value: DyadicFraction },

    #[error("step {step}: denominator of {value} exceeds the precision bound {precision_bound}")]
    PrecisionExceeded {
        step: usize,
        value: DyadicFraction,
        precision_bound: u8,
    },

    #[error("replay ends at {} but the path ends at {}", StateDisplay(.replayed), StateDisplay(.path))]
    FinalMismatch { replayed: State, path: State },
}

fn sorted(values: &[DyadicFraction]) -> State {
    let mut values = values.to_vec();
    values.sort_unstable();
    values
}

/// Values of `from` missing in `to`, and values of `to` missing in `from`.
/// Both slices must be sorted.
fn difference(from: &[DyadicFraction], to: &[DyadicFraction]) -> (State, State) {
    let (mut removed, mut added) = (Vec::new(), Vec::new());
    let (mut i, mut j) = (0, 0);
    while i < from.len() && j < to.len() {
        match from[i].cmp(&to[j]) {
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => {
                removed.push(from[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                added.push(to[j]);
                j += 1;
            }
        }
    }
    removed.extend_from_slice(&from[i..]);
    added.extend_from_slice(&to[j..]);
    (removed, added)
}

/// Recover the mix performed between each pair of consecutive states.
pub fn mix_steps(path: &[State]) -> Result<Vec<MixStep>, ReplayError> {
    let mut steps = Vec::with_capacity(path.len().saturating_sub(1));
    for (index, pair) in path.windows(2).enumerate() {
        let step = index + 1;
        let (from, to) = (sorted(&pair[0]), sorted(&pair[1]));
        if from.len() != to.len() {
            return Err(ReplayError::WidthChanged {
                step,
                before: from.len(),
                after: to.len(),
            });
        }

        let (removed, added) = difference(&from, &to);
        let (&[left, right], &[first, second]) = (removed.as_slice(), added.as_slice()) else {
            return Err(ReplayError::NotASingleMix {
                step,
                removed: removed.len(),
                added: added.len(),
            });
        };
        let mix = MixStep::new(left, right).map_err(|source| ReplayError::Arithmetic {
            step,
            left,
            right,
            source,
        })?;
        if left == right || first != second || mix.result != first {
            return Err(ReplayError::WrongResult {
                step,
                left,
                right,
                result: first,
            });
        }
        steps.push(mix);
    }
    Ok(steps)
}

/// Apply `steps` to `initial`, returning the sorted final state.
pub fn replay(initial: &[DyadicFraction], steps: &[MixStep]) -> Result<State, ReplayError> {
    let mut state = sorted(initial);
    for (index, mix) in steps.iter().enumerate() {
        let step = index + 1;
        let expected = mix.left.mix(mix.right).map_err(|source| ReplayError::Arithmetic {
            step,
            left: mix.left,
            right: mix.right,
            source,
        })?;
        if expected != mix.result {
            return Err(ReplayError::WrongResult {
                step,
                left: mix.left,
                right: mix.right,
                result: mix.result,
            });
        }

        for value in [mix.left, mix.right] {
            let position = state
                .iter()
                .position(|v| *v == value)
                .ok_or(ReplayError::MissingOperand { step, value })?;
            state.remove(position);
        }
        state.push(mix.result);
        state.push(mix.result);
        state.sort_unstable();
    }
    Ok(state)
}

/// Check a solution end to end and return its mixes.
///
/// The path must start at the initial state, end at the target, move one
/// mix at a time without exceeding the precision bound, and replaying the
/// recovered mixes must land on its final state.
pub fn verify_solution(solution: &Solution) -> Result<Vec<MixStep>, ReplayError> {
    let (Some(first), Some(last)) = (solution.path.first(), solution.path.last()) else {
        return Err(ReplayError::EmptyPath);
    };

    let (first, initial) = (sorted(first), sorted(&solution.initial));
    if first != initial {
        return Err(ReplayError::WrongStart {
            expected: initial,
            found: first,
        });
    }
    let (last, target) = (sorted(last), sorted(&solution.target));
    if last != target {
        return Err(ReplayError::WrongEnd {
            expected: target,
            found: last,
        });
    }

    let steps = mix_steps(&solution.path)?;
    for (index, mix) in steps.iter().enumerate() {
        if mix.result.exponent() > solution.precision_bound {
            return Err(ReplayError::PrecisionExceeded {
                step: index + 1,
                value: mix.result,
                precision_bound: solution.precision_bound,
            });
        }
    }

    let replayed = replay(&initial, &steps)?;
    if replayed != last {
        return Err(ReplayError::FinalMismatch {
            replayed,
            path: last,
        });
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frac(s: &str) -> DyadicFraction {
        s.parse().unwrap()
    }

    fn state(values: &[&str]) -> State {
        values.iter().map(|v| frac(v)).collect()
    }

    fn quarters_solution() -> Solution {
        Solution {
            precision_bound: 2,
            initial: state(&["0", "0", "0", "1"]),
            target: state(&["1/4", "1/4", "1/4", "1/4"]),
            path: vec![
                state(&["0", "0", "0", "1"]),
                state(&["0", "0", "1/2", "1/2"]),
                state(&["0", "1/4", "1/4", "1/2"]),
                state(&["1/4", "1/4", "1/4", "1/4"]),
            ],
            nodes_explored: 4,
            states_seen: 3,
            time_elapsed_ms: 0,
        }
    }

    #[test]
    fn test_mix_steps_recovers_each_mix() {
        let steps = mix_steps(&quarters_solution().path).unwrap();
        assert_eq!(
            steps,
            vec![
                MixStep::new(frac("0"), frac("1")).unwrap(),
                MixStep::new(frac("0"), frac("1/2")).unwrap(),
                MixStep::new(frac("0"), frac("1/2")).unwrap(),
            ]
        );
        assert_eq!(steps[1].result, frac("1/4"));
    }

    #[test]
    fn test_mix_steps_ignores_order_within_states() {
        let path = vec![state(&["1", "0"]), state(&["1/2", "1/2"])];
        assert_eq!(mix_steps(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_mix_steps_rejects_non_mixes() {
        let path = vec![state(&["0", "1"]), state(&["1/4", "3/4"])];
        assert_eq!(
            mix_steps(&path),
            Err(ReplayError::WrongResult {
                step: 1,
                left: frac("0"),
                right: frac("1"),
                result: frac("1/4"),
            })
        );

        let path = vec![state(&["0", "0", "1"]), state(&["0", "0", "1"]), state(&["0", "1"])];
        assert_eq!(
            mix_steps(&path),
            Err(ReplayError::NotASingleMix {
                step: 1,
                removed: 0,
                added: 0,
            })
        );

        let path = vec![state(&["0", "1"]), state(&["1/2"])];
        assert_eq!(
            mix_steps(&path),
            Err(ReplayError::WidthChanged {
                step: 1,
                before: 2,
                after: 1,
            })
        );
    }

    #[test]
    fn test_replay_applies_steps() {
        let steps = mix_steps(&quarters_solution().path).unwrap();
        let end = replay(&state(&["1", "0", "0", "0"]), &steps).unwrap();
        assert_eq!(end, state(&["1/4", "1/4", "1/4", "1/4"]));
    }

    #[test]
    fn test_replay_missing_operand() {
        let steps = [MixStep::new(frac("0"), frac("1")).unwrap()];
        assert_eq!(
            replay(&state(&["0", "1/2"]), &steps),
            Err(ReplayError::MissingOperand {
                step: 1,
                value: frac("1"),
            })
        );
    }

    #[test]
    fn test_replay_wrong_result() {
        let steps = [MixStep {
            left: frac("0"),
            right: frac("1"),
            result: frac("1/4"),
        }];
        assert!(matches!(
            replay(&state(&["0", "1"]), &steps),
            Err(ReplayError::WrongResult { step: 1, .. })
        ));
    }

    #[test]
    fn test_verify_solution() {
        let steps = verify_solution(&quarters_solution()).unwrap();
        assert_eq!(steps.len(), 3);
    }

    #[test]
    fn test_verify_rejects_bad_ends() {
        let mut solution = quarters_solution();
        solution.path.remove(0);
        assert!(matches!(
            verify_solution(&solution),
            Err(ReplayError::WrongStart { .. })
        ));

        let mut solution = quarters_solution();
        solution.path.pop();
        let err = verify_solution(&solution).unwrap_err();
        assert_eq!(
            err.to_string(),
            "path ends at [0 1/4 1/4 1/2] instead of [1/4 1/4 1/4 1/4]"
        );

        let mut solution = quarters_solution();
        solution.path.clear();
        assert_eq!(verify_solution(&solution), Err(ReplayError::EmptyPath));
    }

    #[test]
    fn test_verify_rejects_precision_overrun() {
        let mut solution = quarters_solution();
        solution.precision_bound = 1;
        assert_eq!(
            verify_solution(&solution),
            Err(ReplayError::PrecisionExceeded {
                step: 2,
                value: frac("1/4"),
                precision_bound: 1,
            })
        );
    }
}
