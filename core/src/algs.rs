//! # Search Driver
//!
//! Runs the preprocessing pipeline once and then drives the SAT oracle to find a first
//! solution, enumerate all solutions or minimize the objective by linear SAT-UNSAT search.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rustsat::{
    solvers::SolverResult,
    types::{Clause, Lit, TernaryVal, Var},
};

use crate::{
    bridge::{Engine, OracleInterrupter},
    clausify::GoalBound,
    options::{Limits, Mode},
    termination::{self, Termination},
    types::{Weight, INF},
    PbSolver,
};

/// The result of a call to [`PbSolver::solve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// No solution exists
    Unsat,
    /// At least one solution was found
    Sat,
    /// A solution with minimal objective value was found
    Optimum,
    /// The search stopped early, solutions found so far stay available
    Terminated(Termination),
}

/// Handle to interrupt a running solver from another thread
pub struct Interrupter {
    /// Termination flag of the solver
    term_flag: Arc<AtomicBool>,
    /// The terminator of the underlying SAT oracle
    oracle_interrupter: OracleInterrupter,
}

impl Interrupter {
    /// Interrupts the solver asynchronously
    pub fn interrupt(&mut self) {
        self.term_flag.store(true, Ordering::Relaxed);
        if let Ok(mut oracle) = self.oracle_interrupter.lock() {
            oracle.interrupt();
        }
    }
}

impl<O: Engine> PbSolver<O> {
    /// Gets a handle to interrupt the solver
    pub fn interrupter(&self) -> Interrupter {
        Interrupter {
            term_flag: self.term_flag.clone(),
            oracle_interrupter: self.sat_solver.interrupter(),
        }
    }

    /// Solves the problem in the given mode. Early termination because of limits or an
    /// interrupt is reported as [`Outcome::Terminated`].
    pub fn solve(&mut self, mode: Mode, limits: Limits) -> anyhow::Result<Outcome> {
        self.lims = limits;
        let outcome = match termination::split(self.run(mode))? {
            Ok(outcome) => outcome,
            Err(term) => Outcome::Terminated(term),
        };
        self.log_end_solve()?;
        Ok(outcome)
    }

    fn run(&mut self, mode: Mode) -> anyhow::Result<Outcome> {
        let bound = if self.converted {
            self.convert_pbs(false)?
        } else {
            self.preprocess()?
        };
        if !self.okay() {
            return Ok(Outcome::Unsat);
        }
        match mode {
            Mode::FirstSolution => self.first_solution(),
            Mode::AllSolutions => self.all_solutions(),
            Mode::Minimize if self.goal.is_none() => self.first_solution(),
            // an earlier call already proved the best model optimal
            Mode::Minimize if bound == GoalBound::Infeasible => Ok(Outcome::Optimum),
            Mode::Minimize => self.minimize(),
        }
    }

    /// Simplifies the store and clausifies it
    fn preprocess(&mut self) -> anyhow::Result<GoalBound> {
        self.log_routine_start("preprocessing")?;
        self.converted = true;
        self.sat_solver.var_manager.mark_orig_vars();
        let n_fixed = self.trail.len();
        self.propagate()?;
        self.simplify()?;
        let n_flagged = if self.opts.find_intervals && self.okay() {
            self.find_intervals()
        } else {
            0
        };
        let n_split = if self.opts.rewrite_almost_clauses {
            self.rewrite_almost_clauses()?
        } else {
            0
        };
        self.freeze_vars()?;
        self.log_preprocessing(self.trail.len() - n_fixed, n_split, n_flagged)?;
        self.log_routine_end()?;
        self.log_routine_start("clausification")?;
        let bound = self.convert_pbs(true)?;
        self.log_routine_end()?;
        Ok(bound)
    }

    /// Protects problem and objective variables from elimination
    fn freeze_vars(&mut self) -> anyhow::Result<()> {
        if !self.sat_solver.preprocessing() {
            return Ok(());
        }
        let pb_vars: Vec<Var> = self.pb_vars().collect();
        for var in pb_vars {
            self.sat_solver.freeze(var)?;
        }
        if let Some((goal, _)) = self.goal {
            let goal_vars: Vec<Var> = self.arena.lits(&goal).iter().map(|l| l.var()).collect();
            for var in goal_vars {
                self.sat_solver.freeze(var)?;
            }
        }
        Ok(())
    }

    /// Calls the oracle and checks for termination afterwards
    fn call_oracle(&mut self, assumps: &[Lit]) -> anyhow::Result<SolverResult> {
        self.check_oracle_calls()?;
        let res = if assumps.is_empty() {
            self.sat_solver.solve()?
        } else {
            self.sat_solver.solve_assumps(assumps)?
        };
        self.log_oracle_call(res)?;
        if res == SolverResult::Interrupted {
            return Err(Termination::Interrupted.into());
        }
        self.check_termination()?;
        Ok(res)
    }

    /// Gets the current model over the problem variables
    fn pb_model(&self) -> anyhow::Result<Vec<bool>> {
        let Some(max_var) = self.pb_vars().last() else {
            return Ok(vec![]);
        };
        let sol = self.sat_solver.model(max_var)?;
        Ok(self
            .pb_vars()
            .map(|v| sol.lit_value(v.pos_lit()) == TernaryVal::True)
            .collect())
    }

    /// The objective value of the current model
    fn goal_value(&self) -> anyhow::Result<Option<Weight>> {
        let Some((goal, offset)) = self.goal else {
            return Ok(None);
        };
        let mut value = offset;
        for (l, w) in self.arena.iter(&goal) {
            if self.sat_solver.model_value(l)? == TernaryVal::True {
                value = crate::types::add_weights(value, w)?;
            }
        }
        Ok(Some(value))
    }

    /// If solution-guided search is turned on, phases the model in the oracle
    fn phase_solution(&mut self, model: &[bool]) -> anyhow::Result<()> {
        if !self.opts.solution_guided_search {
            return Ok(());
        }
        let pb_vars: Vec<Var> = self.pb_vars().collect();
        for (var, &val) in pb_vars.into_iter().zip(model) {
            self.sat_solver
                .phase_lit(if val { var.pos_lit() } else { var.neg_lit() })?;
        }
        Ok(())
    }

    fn first_solution(&mut self) -> anyhow::Result<Outcome> {
        self.log_routine_start("first solution")?;
        let res = self.call_oracle(&[])?;
        let outcome = if res == SolverResult::Sat {
            let model = self.pb_model()?;
            let value = self.goal_value()?;
            self.best_model = Some(model);
            self.best_goalvalue = value.unwrap_or(INF);
            self.log_solution(value)?;
            Outcome::Sat
        } else {
            Outcome::Unsat
        };
        self.log_routine_end()?;
        Ok(outcome)
    }

    fn all_solutions(&mut self) -> anyhow::Result<Outcome> {
        self.log_routine_start("all solutions")?;
        while self.okay() {
            if self.call_oracle(&[])? != SolverResult::Sat {
                break;
            }
            let model = self.pb_model()?;
            let block: Clause = self
                .pb_vars()
                .zip(&model)
                .map(|(var, &val)| if val { var.neg_lit() } else { var.pos_lit() })
                .collect();
            self.best_model = Some(model.clone());
            self.all_models.push(model);
            self.log_solution(None)?;
            self.sat_solver.add_clause(block)?;
        }
        self.log_routine_end()?;
        Ok(if self.all_models.is_empty() {
            Outcome::Unsat
        } else {
            Outcome::Sat
        })
    }

    /// Linear SAT-UNSAT search on the objective
    fn minimize(&mut self) -> anyhow::Result<Outcome> {
        self.log_routine_start("minimize")?;
        loop {
            let assumps: Vec<Lit> = self.goal_guard.into_iter().collect();
            if self.call_oracle(&assumps)? != SolverResult::Sat {
                break;
            }
            let model = self.pb_model()?;
            let value = self.goal_value()?.unwrap_or(INF);
            debug_assert!(value < self.best_goalvalue);
            self.phase_solution(&model)?;
            self.best_model = Some(model);
            self.best_goalvalue = value;
            self.log_solution(Some(value))?;
            if self.convert_pbs(false)? == GoalBound::Infeasible || !self.okay() {
                break;
            }
        }
        self.log_routine_end()?;
        Ok(if self.best_model.is_some() {
            Outcome::Optimum
        } else {
            Outcome::Unsat
        })
    }
}
