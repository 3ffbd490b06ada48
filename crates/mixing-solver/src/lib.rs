//! Mixing solver for dyadic fractions.
//!
//! Starting from a multiset of zeros and ones, the solver searches for a
//! sequence of pairwise mixes (each replacing two values by two copies of
//! their mean) that produces a requested multiset of dyadic fractions,
//! without any intermediate value needing a denominator above a fixed
//! power of two. When no such sequence exists it explains why as a tree of
//! failed branches.

pub mod cases;
pub mod failure;
pub mod fraction;
pub mod pruning;
pub mod replay;
pub mod solver;
pub mod state;

// Re-export main types
pub use cases::{CaseError, CaseGenerator};
pub use failure::{FailureReason, FailureTree};
pub use fraction::{DyadicFraction, FractionError, MAX_EXPONENT};
pub use pruning::{check_reachable, is_reachable, Infeasible};
pub use replay::{mix_steps, replay, verify_solution, MixStep, ReplayError};
pub use solver::{solve, solve_with_config, Solution, SolveError, SolverConfig};
pub use state::{CanonicalKey, SeenSet, State, StateDisplay};
