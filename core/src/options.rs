//! # Options
//!
//! This module contains all configuration options of the pseudo-boolean solver.

use std::fmt;

/// Solver-wide configuration options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Options {
    /// Enable variable elimination in the SAT oracle
    pub preprocessing: bool,
    /// Attach structural hints to constraints before clausification
    pub find_intervals: bool,
    /// Split almost-clauses into a clause and a residual constraint
    pub rewrite_almost_clauses: bool,
    /// The maximum number of distinct weights for a constraint to count as having few levels
    pub max_weight_levels: usize,
    /// The encoding to use for weighted constraints
    pub pb_encoding: PbEncoding,
    /// Solution-guided search (aka phasing solutions)
    pub solution_guided_search: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            preprocessing: false,
            find_intervals: true,
            rewrite_almost_clauses: true,
            max_weight_levels: 8,
            pb_encoding: PbEncoding::default(),
            solution_guided_search: false,
        }
    }
}

/// Encodings for weighted constraints and the objective
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum PbEncoding {
    /// Generalized totalizer for few weight levels, dynamic polynomial watchdog otherwise
    #[default]
    Auto,
    /// Always use the generalized totalizer
    Gte,
    /// Always use the dynamic polynomial watchdog
    Dpw,
}

impl fmt::Display for PbEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PbEncoding::Auto => write!(f, "auto"),
            PbEncoding::Gte => write!(f, "gte"),
            PbEncoding::Dpw => write!(f, "dpw"),
        }
    }
}

/// What a call to [`crate::PbSolver::solve`] searches for
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Mode {
    /// Find a solution with minimal objective value
    #[default]
    Minimize,
    /// Stop at the first solution
    FirstSolution,
    /// Enumerate all solutions over the problem variables
    AllSolutions,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Minimize => write!(f, "minimize"),
            Mode::FirstSolution => write!(f, "first-solution"),
            Mode::AllSolutions => write!(f, "all-solutions"),
        }
    }
}

/// Limits for a call to [`crate::PbSolver::solve`]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Limits {
    /// The maximum number of solutions to find
    pub sols: Option<usize>,
    /// The maximum number of SAT oracle calls to make
    pub oracle_calls: Option<usize>,
}

impl Limits {
    /// No limits
    pub fn none() -> Limits {
        Limits {
            sols: None,
            oracle_calls: None,
        }
    }
}
