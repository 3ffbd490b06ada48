//! CLI entry point for the mixing solver.
//!
//! Usage:
//!   mixing-solver solve <FRACTION>... [options]
//!   mixing-solver generate <WIDTH> <PRECISION> [--solve]
//!
//! Options for `solve`:
//!   --precision <n>       Largest allowed denominator exponent
//!                         (default: largest target exponent + (count - 1) / 4)
//!   --threads <n>         Worker threads (default: rayon's global pool)
//!   --parallel-depth <n>  Depth below which branches run in parallel (default: 8)
//!   --max-depth <n>       Maximum number of mixes along a branch
//!   --json                Print a JSON report to stdout
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default: warn).

use std::io;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use mixing_solver::{
    solve_with_config, verify_solution, CaseGenerator, DyadicFraction, MixStep, Solution,
    SolveError, SolverConfig, StateDisplay, MAX_EXPONENT,
};

#[derive(Parser)]
#[command(name = "mixing-solver")]
#[command(about = "Search for mixing sequences that produce dyadic fractions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find a sequence of mixes producing the given fractions
    Solve {
        /// Target values such as 1/4 or 3/8
        #[arg(value_name = "FRACTION", required = true)]
        targets: Vec<String>,

        /// Largest allowed denominator exponent
        #[arg(long)]
        precision: Option<u8>,

        /// Worker threads for the search
        #[arg(long)]
        threads: Option<usize>,

        /// Depth below which branches are explored in parallel
        #[arg(long, default_value = "8")]
        parallel_depth: usize,

        /// Maximum number of mixes along a branch
        #[arg(long)]
        max_depth: Option<usize>,

        /// Print a JSON report to stdout instead of the path
        #[arg(long)]
        json: bool,
    },

    /// Print every target set of a given width and precision
    Generate {
        /// Number of values per case
        width: usize,

        /// Denominator exponent of the generated values
        precision: u8,

        /// Also solve each case
        #[arg(long)]
        solve: bool,
    },
}

/// JSON report for a successful solve
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SolveOutput<'a> {
    precision_bound: u8,
    max_denominator: String,
    targets: &'a [DyadicFraction],
    path: &'a [Vec<DyadicFraction>],
    steps: &'a [MixStep],
    nodes_explored: usize,
    states_seen: usize,
    time_elapsed_ms: u64,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Solve {
            targets,
            precision,
            threads,
            parallel_depth,
            max_depth,
            json,
        } => {
            let targets = match parse_targets(&targets) {
                Ok(targets) => targets,
                Err(errors) => {
                    eprintln!("Error: Failed to parse arguments:");
                    for error in errors {
                        eprintln!("{}", error);
                    }
                    std::process::exit(1);
                }
            };

            let precision_bound = match resolve_precision(precision, &targets) {
                Ok(precision_bound) => precision_bound,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            eprintln!(
                "Mixing targets {} with maximum denominator {}",
                StateDisplay(&targets),
                max_denominator(precision_bound)
            );

            let config = SolverConfig {
                threads,
                parallel_depth,
                max_depth,
            };
            let solution = match solve_with_config(precision_bound, &targets, &config) {
                Ok(solution) => solution,
                Err(e) => {
                    eprintln!("No such graph: {}", e);
                    std::process::exit(1);
                }
            };
            let steps = match verify_solution(&solution) {
                Ok(steps) => steps,
                Err(e) => {
                    eprintln!("Error: solver returned an invalid path: {}", e);
                    std::process::exit(1);
                }
            };

            if json {
                let output = SolveOutput {
                    precision_bound,
                    max_denominator: max_denominator(precision_bound),
                    targets: &solution.target,
                    path: &solution.path,
                    steps: &steps,
                    nodes_explored: solution.nodes_explored,
                    states_seen: solution.states_seen,
                    time_elapsed_ms: solution.time_elapsed_ms,
                };
                match serde_json::to_string_pretty(&output) {
                    Ok(text) => println!("{}", text),
                    Err(e) => {
                        eprintln!("Error serializing report: {}", e);
                        std::process::exit(1);
                    }
                }
            } else {
                print_solution(&solution, &steps);
            }
        }

        Commands::Generate {
            width,
            precision,
            solve,
        } => {
            let cases = match CaseGenerator::new(width, precision) {
                Ok(cases) => cases,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            };
            let config = SolverConfig::default();

            for case in cases {
                if solve {
                    println!("{}", describe_case(&case, &config));
                } else {
                    println!("{}", StateDisplay(&case));
                }
            }
        }
    }
}

/// Parse every argument, collecting all failures rather than stopping at the
/// first.
fn parse_targets(args: &[String]) -> Result<Vec<DyadicFraction>, Vec<String>> {
    let mut targets = Vec::with_capacity(args.len());
    let mut errors = Vec::new();
    for arg in args {
        match arg.parse::<DyadicFraction>() {
            Ok(value) => targets.push(value.reduce()),
            Err(e) => errors.push(e.to_string()),
        }
    }
    if errors.is_empty() {
        Ok(targets)
    } else {
        Err(errors)
    }
}

/// Largest target exponent, plus one extra bit for every four values
/// beyond the first.
fn default_precision(targets: &[DyadicFraction]) -> usize {
    let widest = targets.iter().map(|t| t.reduce().exponent()).max().unwrap_or(0);
    usize::from(widest) + targets.len().saturating_sub(1) / 4
}

/// The explicit bound if given, otherwise the derived one; either must be
/// below 64.
fn resolve_precision(explicit: Option<u8>, targets: &[DyadicFraction]) -> Result<u8, String> {
    match explicit {
        Some(precision) if precision < MAX_EXPONENT => Ok(precision),
        Some(precision) => Err(format!(
            "precision {} is out of bounds, denominators of 2^{} and larger are not supported",
            precision, MAX_EXPONENT
        )),
        None => {
            let derived = default_precision(targets);
            match u8::try_from(derived) {
                Ok(precision) if precision < MAX_EXPONENT => Ok(precision),
                _ => Err(format!(
                    "derived precision {} is out of bounds, pass --precision below {}",
                    derived, MAX_EXPONENT
                )),
            }
        }
    }
}

/// One line of `generate --solve` output
fn describe_case(case: &[DyadicFraction], config: &SolverConfig) -> String {
    let precision_bound = match resolve_precision(None, case) {
        Ok(precision_bound) => precision_bound,
        Err(e) => return format!("{} error: {}", StateDisplay(case), e),
    };
    match solve_with_config(precision_bound, case, config) {
        Ok(solution) => format!("{} ok ({} mixes)", StateDisplay(case), solution.mix_count()),
        Err(SolveError::NoPath { .. }) => format!("{} no path", StateDisplay(case)),
        Err(e) => format!("{} error: {}", StateDisplay(case), e),
    }
}

/// `2^precision_bound` in decimal
fn max_denominator(precision_bound: u8) -> String {
    match 1u128.checked_shl(u32::from(precision_bound)) {
        Some(denominator) => denominator.to_string(),
        None => format!("2^{}", precision_bound),
    }
}

fn print_solution(solution: &Solution, steps: &[MixStep]) {
    if let Some(first) = solution.path.first() {
        eprintln!("{}", StateDisplay(first));
    }
    for (mix, state) in steps.iter().zip(solution.path.iter().skip(1)) {
        eprintln!(
            "  mix {} and {} -> {}    {}",
            mix.left,
            mix.right,
            mix.result,
            StateDisplay(state)
        );
    }
    eprintln!(
        "{} mixes, {} nodes explored, {} states seen, {} ms",
        solution.mix_count(),
        solution.nodes_explored,
        solution.states_seen,
        solution.time_elapsed_ms
    );
}
