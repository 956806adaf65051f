//! # pbsat
//!
//! A pseudo-boolean solver that reduces linear constraints over boolean variables to clauses for
//! an incremental SAT oracle. Constraints are normalized, simplified by unit propagation,
//! structurally rewritten and finally clausified. The optimization driver then finds a first
//! solution, enumerates all solutions or minimizes a linear objective by branch-and-bound.

use rustsat::solvers::SolverResult;

pub mod options;
pub use options::{Limits, Mode, Options, PbEncoding};

pub mod types;
pub use types::{Ineq, Shape, Weight, INF, NEG_INF};

pub mod arena;
pub mod normalize;
pub mod occurs;

pub mod bridge;
pub use bridge::{Engine, Preprocess, SolverBridge};

mod solver;
pub use solver::PbSolver;

mod clausify;
mod propagate;
mod rewrite;

pub mod algs;
pub use algs::{Interrupter, Outcome};

pub mod prepro;

pub(crate) mod termination;
pub use termination::Termination;

/// Errors from misusing the solver API
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("an objective function has already been set")]
    GoalAlreadySet,
    #[error("weight arithmetic overflowed")]
    WeightOverflow,
    #[error("cannot declare new problem variables after clausification started")]
    VarAfterClausify,
}

/// Statistics of the solver
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct Stats {
    /// The number of calls to the SAT oracle
    pub n_oracle_calls: usize,
    /// The number of solutions found
    pub n_solutions: usize,
    /// The number of constraints passed to [`PbSolver::add_constr`]
    pub n_orig_constrs: usize,
    /// The number of constraints in the store after rewriting
    pub n_stored_constrs: usize,
    /// The number of literals fixed by propagation
    pub n_fixed_lits: usize,
    /// The number of almost-clauses split into a clause and a residual constraint
    pub n_almost_clause_splits: usize,
    /// The number of constraints flagged for a cheaper than weighted encoding
    pub n_flagged_intervals: usize,
    /// The number of clauses passed to the oracle
    pub n_clauses: usize,
}

/// A logger to attach to a solver
pub trait WriteSolverLog {
    /// Adds an oracle call to the log
    fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()>;
    /// Adds a solution with its objective value, if an objective exists, to the log
    fn log_solution(&mut self, value: Option<Weight>) -> anyhow::Result<()>;
    /// Adds a tightened objective bound to the log
    fn log_bound(&mut self, bound: Weight) -> anyhow::Result<()>;
    /// Adds the result of the simplification passes to the log
    fn log_preprocessing(
        &mut self,
        n_fixed: usize,
        n_split: usize,
        n_flagged: usize,
    ) -> anyhow::Result<()>;
    /// Adds a new routine starting to the log
    fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()>;
    /// Adds a new routine ending to the log
    fn log_routine_end(&mut self) -> anyhow::Result<()>;
    /// Adds end of solving to the log
    fn log_end_solve(&mut self) -> anyhow::Result<()>;
    /// Logs any string
    fn log_message(&mut self, msg: &str) -> anyhow::Result<()>;
}
