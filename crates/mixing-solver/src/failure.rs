//! Failure trees explaining why a search found no path.

use std::fmt;

use thiserror::Error;

use crate::fraction::{DyadicFraction, FractionError};
use crate::pruning::Infeasible;
use crate::state::{State, StateDisplay};

/// Why a single branch of the search ended
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// Every mix from this state was tried and none reached the target
    #[error("exhausted")]
    Exhausted,

    #[error("cannot mix {left} and {right}: {source}")]
    Arithmetic {
        left: DyadicFraction,
        right: DyadicFraction,
        source: FractionError,
    },

    #[error("state already seen")]
    AlreadySeen,

    #[error(transparent)]
    Infeasible(#[from] Infeasible),

    #[error("denominator {} too large", denominator(.exponent))]
    PrecisionExceeded { exponent: u8 },

    #[error("depth limit of {0} reached")]
    DepthLimit(usize),
}

/// `2^exponent` in decimal
fn denominator(exponent: &u8) -> String {
    if *exponent < 128 {
        (1u128 << *exponent).to_string()
    } else {
        format!("2^{}", exponent)
    }
}

/// One node of the explanation: a state, why it failed, and the failures
/// of every branch it spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureTree {
    pub state: State,
    pub reason: FailureReason,
    pub children: Vec<FailureTree>,
}

impl FailureTree {
    pub fn leaf(state: State, reason: FailureReason) -> Self {
        Self {
            state,
            reason,
            children: Vec::new(),
        }
    }

    pub fn exhausted(state: State, children: Vec<FailureTree>) -> Self {
        Self {
            state,
            reason: FailureReason::Exhausted,
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// All leaves, left to right
    pub fn leaves(&self) -> Vec<&FailureTree> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_leaf() {
                out.push(node);
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        out
    }

    /// Number of nodes in the tree
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(FailureTree::size).sum::<usize>()
    }

    fn render(&self, f: &mut fmt::Formatter<'_>, prefix: &str, branch: Branch) -> fmt::Result {
        writeln!(
            f,
            "{}{}{} {}",
            prefix,
            branch.connector(),
            StateDisplay(&self.state),
            self.reason
        )?;

        let prefix = format!("{}{}", prefix, branch.continuation());
        let last = self.children.len().saturating_sub(1);
        for (index, child) in self.children.iter().enumerate() {
            let branch = if index == last { Branch::Last } else { Branch::Middle };
            child.render(f, &prefix, branch)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum Branch {
    Root,
    Middle,
    Last,
}

impl Branch {
    fn connector(self) -> &'static str {
        match self {
            Branch::Root => "",
            Branch::Middle => "├─ ",
            Branch::Last => "└─ ",
        }
    }

    fn continuation(self) -> &'static str {
        match self {
            Branch::Root => "",
            Branch::Middle => "│  ",
            Branch::Last => "   ",
        }
    }
}

impl fmt::Display for FailureTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.render(f, "", Branch::Root)
    }
}
