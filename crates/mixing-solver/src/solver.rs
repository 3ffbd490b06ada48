//! Concurrent search for a sequence of mixes that reaches a target state.
//!
//! Every pair of distinct values in the current state is mixed, the result is
//! checked against a seen-set shared by the whole solve, pruned with the
//! reachability rules, and explored on the rayon pool. The first branch to
//! reach the target wins and tells the others to stop; when no branch gets
//! there, the failures of every branch are collected into a [`FailureTree`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info_span, trace};

use crate::failure::{FailureReason, FailureTree};
use crate::fraction::{DyadicFraction, FractionError, MAX_EXPONENT};
use crate::pruning::check_reachable;
use crate::state::{CanonicalKey, SeenSet, State, StateDisplay};

/// Configuration for the solver
#[derive(Debug, Clone)]
pub struct SolverConfig {
    /// Worker threads for the search; `None` runs on rayon's global pool
    pub threads: Option<usize>,
    /// Branches shallower than this are explored in parallel, deeper ones
    /// one after another
    pub parallel_depth: usize,
    /// Maximum number of mixes along any branch
    pub max_depth: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            threads: None,
            parallel_depth: 8,
            max_depth: None,
        }
    }
}

/// A successful search
#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub precision_bound: u8,
    /// Sorted starting state of zeros and ones
    pub initial: State,
    /// Sorted target
    pub target: State,
    /// Every state from `initial` to the target, one mix apart
    pub path: Vec<State>,
    /// Number of search nodes visited
    pub nodes_explored: usize,
    /// Number of distinct states recorded in the seen-set
    pub states_seen: usize,
    pub time_elapsed_ms: u64,
}

impl Solution {
    pub fn final_state(&self) -> &[DyadicFraction] {
        self.path.last().map_or(&[], Vec::as_slice)
    }

    pub fn mix_count(&self) -> usize {
        self.path.len().saturating_sub(1)
    }
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Fraction(#[from] FractionError),

    #[error("sum of the inputs does not fit in 64 bits at precision {precision_bound}")]
    TotalOverflow { precision_bound: u8 },

    #[error("inputs do not sum to an integer: total is {total}")]
    NonIntegerTotal { total: DyadicFraction },

    #[error("inputs sum to {total}, more than their count of {width}")]
    TotalExceedsWidth { total: u64, width: usize },

    #[error("cannot build solver thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// Every branch stopped after another reported success, yet no success
    /// reached the root. The winning branch always propagates its path, so a
    /// single solve never returns this.
    #[error("search was cancelled without a result")]
    Interrupted,

    #[error("no path to the target:\n{tree}")]
    NoPath { tree: Box<FailureTree> },
}

/// Result of exploring one branch
#[derive(Debug)]
enum Outcome {
    /// Path of whole states from this branch to the target
    Success(Vec<State>),
    Exhausted(FailureTree),
    /// Another branch already succeeded
    Cancelled,
}

/// One search position.
///
/// `before` and `after` hold values already matched to their final place in
/// the target; only `state` is still mixed, against the remaining `target`.
#[derive(Debug, Clone)]
struct Node {
    target: State,
    state: State,
    before: State,
    after: State,
}

impl Node {
    fn root(target: State, state: State) -> Self {
        Self {
            target,
            state,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    /// `before ++ state ++ after`
    fn whole(&self) -> State {
        let mut whole = Vec::with_capacity(self.before.len() + self.state.len() + self.after.len());
        whole.extend_from_slice(&self.before);
        whole.extend_from_slice(&self.state);
        whole.extend_from_slice(&self.after);
        whole
    }

    /// Successor holding `state`, with matching ends moved out of the search.
    fn child(&self, mut state: State) -> Node {
        let mut target = self.target.clone();
        let mut before = self.before.clone();

        let lead = state
            .iter()
            .zip(&target)
            .take_while(|(value, goal)| value == goal)
            .count();
        before.extend(state.drain(..lead));
        target.drain(..lead);

        let trail = state
            .iter()
            .rev()
            .zip(target.iter().rev())
            .take_while(|(value, goal)| value == goal)
            .count();
        let keep = state.len() - trail;
        let mut after = state.split_off(keep);
        target.truncate(keep);
        after.extend_from_slice(&self.after);

        Node {
            target,
            state,
            before,
            after,
        }
    }
}

/// Everything shared by the branches of a single solve
struct SearchContext<'a> {
    config: &'a SolverConfig,
    precision_bound: u8,
    seen: SeenSet,
    solved: AtomicBool,
    nodes: AtomicUsize,
}

impl<'a> SearchContext<'a> {
    fn new(config: &'a SolverConfig, precision_bound: u8) -> Self {
        Self {
            config,
            precision_bound,
            seen: SeenSet::new(),
            solved: AtomicBool::new(false),
            nodes: AtomicUsize::new(0),
        }
    }

    fn is_solved(&self) -> bool {
        self.solved.load(Ordering::Relaxed)
    }
}

/// Explore every mix reachable from `node`.
fn explore(ctx: &SearchContext<'_>, node: Node, depth: usize) -> Outcome {
    if ctx.is_solved() {
        return Outcome::Cancelled;
    }
    ctx.nodes.fetch_add(1, Ordering::Relaxed);

    let whole = node.whole();
    if node.state == node.target {
        ctx.solved.store(true, Ordering::Relaxed);
        return Outcome::Success(vec![whole]);
    }
    if let Some(limit) = ctx.config.max_depth {
        if depth >= limit {
            return Outcome::Exhausted(FailureTree::leaf(whole, FailureReason::DepthLimit(limit)));
        }
    }
    trace!(depth, state = %StateDisplay(&whole), "exploring");

    let mut failures = Vec::new();
    let mut children = Vec::new();
    for i in 0..node.state.len() {
        if ctx.is_solved() {
            return Outcome::Cancelled;
        }
        for j in i + 1..node.state.len() {
            let (left, right) = (node.state[i], node.state[j]);
            if left == right {
                continue;
            }
            let mixed = match left.mix(right) {
                Ok(mixed) => mixed,
                Err(source) => {
                    failures.push(FailureTree::leaf(
                        whole.clone(),
                        FailureReason::Arithmetic {
                            left,
                            right,
                            source,
                        },
                    ));
                    continue;
                }
            };
            match branch(ctx, &node, depth, i, j, mixed) {
                Ok(child) => children.push(child),
                Err(leaf) => failures.push(leaf),
            }
        }
    }

    let outcomes: Vec<Outcome> = if depth < ctx.config.parallel_depth {
        children
            .into_par_iter()
            .map(|child| explore(ctx, child, depth + 1))
            .collect()
    } else {
        let mut outcomes = Vec::with_capacity(children.len());
        for child in children {
            let outcome = explore(ctx, child, depth + 1);
            let done = matches!(outcome, Outcome::Success(_));
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        outcomes
    };

    let mut cancelled = false;
    for outcome in outcomes {
        match outcome {
            Outcome::Success(rest) => {
                let mut path = Vec::with_capacity(rest.len() + 1);
                path.push(whole);
                path.extend(rest);
                return Outcome::Success(path);
            }
            Outcome::Exhausted(tree) => failures.push(tree),
            Outcome::Cancelled => cancelled = true,
        }
    }
    if cancelled {
        return Outcome::Cancelled;
    }
    Outcome::Exhausted(FailureTree::exhausted(whole, failures))
}

/// Build the successor where positions `i` and `j` both become `mixed`, or
/// the leaf explaining why it is not worth exploring.
fn branch(
    ctx: &SearchContext<'_>,
    node: &Node,
    depth: usize,
    i: usize,
    j: usize,
    mixed: DyadicFraction,
) -> Result<Node, FailureTree> {
    let mut candidate = node.state.clone();
    candidate[i] = mixed;
    candidate[j] = mixed;
    candidate.sort_unstable();

    let key = CanonicalKey::of(node.before.iter().chain(&candidate).chain(&node.after));
    // Depth only matters under a limit
    let seen_depth = ctx.config.max_depth.map_or(0, |_| depth + 1);
    let already_seen = ctx.seen.test_and_set(key, seen_depth);

    let child = node.child(candidate);
    if already_seen {
        return Err(FailureTree::leaf(child.whole(), FailureReason::AlreadySeen));
    }
    if let Err(reason) = check_reachable(&child.state, &child.target) {
        return Err(FailureTree::leaf(child.whole(), reason.into()));
    }
    if mixed.exponent() > ctx.precision_bound {
        return Err(FailureTree::leaf(
            child.whole(),
            FailureReason::PrecisionExceeded {
                exponent: mixed.exponent(),
            },
        ));
    }
    Ok(child)
}

/// Search for a mixing sequence reaching `targets` using the default
/// configuration.
pub fn solve(precision_bound: u8, targets: &[DyadicFraction]) -> Result<Solution, SolveError> {
    solve_with_config(precision_bound, targets, &SolverConfig::default())
}

/// Search for a mixing sequence that turns a multiset of zeros and ones into
/// `targets` without any intermediate value needing a denominator above
/// `2^precision_bound`.
pub fn solve_with_config(
    precision_bound: u8,
    targets: &[DyadicFraction],
    config: &SolverConfig,
) -> Result<Solution, SolveError> {
    let span = info_span!("solve", precision_bound, width = targets.len());
    let _enter = span.enter();
    let start_time = Instant::now();

    if precision_bound >= MAX_EXPONENT {
        return Err(FractionError::ExponentOutOfRange {
            exponent: precision_bound.into(),
        }
        .into());
    }

    let mut total: u64 = 0;
    let mut target = Vec::with_capacity(targets.len());
    for &value in targets {
        let scaled = value.set_precision(precision_bound)?;
        total = total
            .checked_add(scaled.numerator())
            .ok_or(SolveError::TotalOverflow { precision_bound })?;
        target.push(value.reduce());
    }

    let unit = 1u64 << precision_bound;
    if total % unit != 0 {
        return Err(SolveError::NonIntegerTotal {
            total: DyadicFraction::new(total, precision_bound).reduce(),
        });
    }
    let width = targets.len();
    let ones = total / unit;
    if ones > width as u64 {
        return Err(SolveError::TotalExceedsWidth { total: ones, width });
    }
    let ones = ones as usize;

    let mut initial = vec![DyadicFraction::ZERO; width - ones];
    initial.resize(width, DyadicFraction::ONE);
    target.sort_unstable();

    debug!(
        initial = %StateDisplay(&initial),
        target = %StateDisplay(&target),
        "starting search"
    );

    let context = SearchContext::new(config, precision_bound);
    let root = Node::root(target.clone(), initial.clone());
    let outcome = match config.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?
            .install(|| explore(&context, root, 0)),
        None => explore(&context, root, 0),
    };

    let nodes_explored = context.nodes.load(Ordering::Relaxed);
    let states_seen = context.seen.len();
    debug!(nodes_explored, states_seen, "search finished");

    match outcome {
        Outcome::Success(mut path) => {
            // Saved values sit outside the active part, so whole states may be out of order
            for step in &mut path {
                step.sort_unstable();
            }
            Ok(Solution {
                precision_bound,
                initial,
                target,
                path,
                nodes_explored,
                states_seen,
                time_elapsed_ms: start_time.elapsed().as_millis() as u64,
            })
        }
        Outcome::Exhausted(tree) => Err(SolveError::NoPath {
            tree: Box::new(tree),
        }),
        Outcome::Cancelled => Err(SolveError::Interrupted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(values: &[&str]) -> State {
        values.iter().map(|v| v.parse().unwrap()).collect()
    }

    fn sequential() -> SolverConfig {
        SolverConfig {
            parallel_depth: 0,
            ..SolverConfig::default()
        }
    }

    #[test]
    fn test_child_trims_matching_ends() {
        let node = Node::root(state(&["1/4", "1/4", "1/2", "3/4"]), state(&["0", "0", "1", "1"]));
        let child = node.child(state(&["1/4", "1/2", "3/4", "3/4"]));
        assert_eq!(child.before, state(&["1/4"]));
        assert_eq!(child.state, state(&["1/2", "3/4"]));
        assert_eq!(child.target, state(&["1/4", "1/2"]));
        assert_eq!(child.after, state(&["3/4"]));
        assert_eq!(child.whole(), state(&["1/4", "1/2", "3/4", "3/4"]));
    }

    #[test]
    fn test_child_keeps_earlier_saved_values() {
        let node = Node {
            target: state(&["1/4", "1/2"]),
            state: state(&["0", "3/4"]),
            before: state(&["1/8"]),
            after: state(&["7/8"]),
        };
        let child = node.child(state(&["3/8", "3/8"]));
        assert_eq!(child.before, state(&["1/8"]));
        assert_eq!(child.after, state(&["7/8"]));
        assert_eq!(child.whole(), state(&["1/8", "3/8", "3/8", "7/8"]));

        let solved = node.child(state(&["1/4", "1/2"]));
        assert!(solved.state.is_empty());
        assert!(solved.target.is_empty());
        assert_eq!(solved.whole(), state(&["1/8", "1/4", "1/2", "7/8"]));
    }

    #[test]
    fn test_equal_halves_report_tree() {
        let result = solve(2, &state(&["1/4", "3/4"]));
        let Err(SolveError::NoPath { tree }) = result else {
            panic!("expected no path, got {:?}", result);
        };
        let expected = "\
[0 1] exhausted
└─ [1/2 1/2] insufficient instances of min value to reach target: 0 < 1
";
        assert_eq!(tree.to_string(), expected);
    }

    #[test]
    fn test_duplicate_pairs_are_seen_once() {
        let result = solve_with_config(2, &state(&["0", "1/4", "3/4"]), &sequential());
        let Err(SolveError::NoPath { tree }) = result else {
            panic!("expected no path, got {:?}", result);
        };
        let expected = "\
[0 0 1] exhausted
├─ [0 1/2 1/2] insufficient instances of min value to reach target: 0 < 1
└─ [0 1/2 1/2] state already seen
";
        assert_eq!(tree.to_string(), expected);
    }

    #[test]
    fn test_precision_exceeded_leaf() {
        let targets = state(&["1/8", "3/8", "3/8", "3/8", "3/4"]);
        let result = solve_with_config(3, &targets, &sequential());
        let Err(SolveError::NoPath { tree }) = result else {
            panic!("expected no path, got {:?}", result);
        };
        assert!(tree
            .leaves()
            .iter()
            .any(|leaf| leaf.reason == FailureReason::PrecisionExceeded { exponent: 4 }));
        assert!(tree
            .to_string()
            .contains("[1/8 3/16 3/16 1/2 1] denominator 16 too large"));
    }

    #[test]
    fn test_already_solved() {
        let solution = solve(0, &state(&["1", "0"])).unwrap();
        assert_eq!(solution.path, vec![state(&["0", "1"])]);
        assert_eq!(solution.mix_count(), 0);
    }

    #[test]
    fn test_empty_targets() {
        let solution = solve(0, &[]).unwrap();
        assert_eq!(solution.path, vec![State::new()]);
        assert!(solution.final_state().is_empty());
    }

    #[test]
    fn test_non_integer_total() {
        let result = solve(2, &state(&["1/4", "1/2"]));
        match result {
            Err(SolveError::NonIntegerTotal { total }) => assert_eq!(total, "3/4".parse().unwrap()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precision_below_target() {
        let result = solve(2, &state(&["1/8", "7/8"]));
        assert!(matches!(
            result,
            Err(SolveError::Fraction(FractionError::PrecisionLoss { precision: 2, .. }))
        ));
    }

    #[test]
    fn test_precision_bound_out_of_range() {
        assert!(matches!(
            solve(64, &[]),
            Err(SolveError::Fraction(FractionError::ExponentOutOfRange { exponent: 64 }))
        ));
    }

    #[test]
    fn test_total_exceeds_width() {
        assert!(matches!(
            solve(0, &state(&["2", "1"])),
            Err(SolveError::TotalExceedsWidth { total: 3, width: 2 })
        ));
    }

    #[test]
    fn test_depth_limit() {
        let config = SolverConfig {
            max_depth: Some(0),
            ..SolverConfig::default()
        };
        let result = solve_with_config(1, &state(&["1/2", "1/2"]), &config);
        let Err(SolveError::NoPath { tree }) = result else {
            panic!("expected no path, got {:?}", result);
        };
        assert_eq!(tree.reason, FailureReason::DepthLimit(0));
        assert_eq!(tree.to_string(), "[0 1] depth limit of 0 reached\n");

        let config = SolverConfig {
            max_depth: Some(1),
            ..SolverConfig::default()
        };
        assert!(solve_with_config(1, &state(&["1/2", "1/2"]), &config).is_ok());
    }

    #[test]
    fn test_depth_limit_allows_shortest_path() {
        // Shortest path is six mixes; some of its states are first met deeper
        let targets = state(&["1/2", "1/2", "1/2", "5/8", "7/8"]);
        for limit in [6, 7] {
            let config = SolverConfig {
                max_depth: Some(limit),
                ..sequential()
            };
            let solution = solve_with_config(3, &targets, &config)
                .unwrap_or_else(|e| panic!("limit {}: {}", limit, e));
            assert!(solution.mix_count() <= limit);
            assert_eq!(solution.final_state(), targets.as_slice());
        }

        let config = SolverConfig {
            max_depth: Some(5),
            ..sequential()
        };
        assert!(matches!(
            solve_with_config(3, &targets, &config),
            Err(SolveError::NoPath { .. })
        ));
    }

    #[test]
    fn test_solved_context_cancels_exploration() {
        let config = SolverConfig::default();
        let context = SearchContext::new(&config, 1);
        context.solved.store(true, Ordering::Relaxed);
        let root = Node::root(state(&["1/2", "1/2"]), state(&["0", "1"]));
        assert!(matches!(explore(&context, root, 0), Outcome::Cancelled));
        assert_eq!(context.nodes.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_dedicated_thread_pool() {
        let config = SolverConfig {
            threads: Some(2),
            ..SolverConfig::default()
        };
        let solution =
            solve_with_config(2, &state(&["1/4", "1/4", "1/4", "1/4"]), &config).unwrap();
        assert_eq!(solution.final_state(), state(&["1/4", "1/4", "1/4", "1/4"]).as_slice());
    }

    #[test]
    fn test_seen_set_is_per_solve() {
        let targets = state(&["1/2", "1/2"]);
        let first = solve(1, &targets).unwrap();
        let second = solve(1, &targets).unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(first.states_seen, 1);
        assert_eq!(second.states_seen, 1);
    }
}
