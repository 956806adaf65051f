//! # Pseudo-Boolean Solver State
//!
//! The constraint store, the objective, the fixed-value table and the problem variable names,
//! together with the construction API. Propagation, rewriting, clausification and the search
//! driver are implemented on [`PbSolver`] in their own modules.

use std::{
    io,
    sync::{atomic::AtomicBool, Arc},
};

use anyhow::Context;
use rustsat::{
    solvers::SolverResult,
    types::{Lit, RsHashMap, TernaryVal, Var},
};
use rustsat_cadical::CaDiCaL;

use crate::{
    arena::{Arena, Linear},
    bridge::{Engine, SolverBridge},
    normalize::{normalize, normalize_goal, Normalized},
    occurs::Occurs,
    options::{Limits, Options},
    types::{GoalEncoding, Ineq, Weight, INF},
    Error, Stats, Termination, WriteSolverLog,
};

/// A pseudo-boolean solver on top of an incremental SAT oracle
///
/// # Generics
///
/// - `O`: the SAT oracle
pub struct PbSolver<O = CaDiCaL<'static, 'static>> {
    /// The SAT oracle bridge
    pub(crate) sat_solver: SolverBridge<O>,
    /// Term storage of all constraint records and the objective
    pub(crate) arena: Arena,
    /// The constraint store, removed entries are `None`
    pub(crate) constrs: Vec<Option<Linear>>,
    /// The objective record and its constant offset
    pub(crate) goal: Option<(Linear, Weight)>,
    /// Literals fixed by propagation in the order they were fixed
    pub(crate) trail: Vec<Lit>,
    /// The fixed values of variables
    pub(crate) assigns: RsHashMap<Var, bool>,
    /// The next trail entry to propagate
    pub(crate) prop_head: usize,
    /// The occurrence index, `None` if invalid
    pub(crate) occurs: Option<Occurs>,
    /// The incremental encoding of the objective
    pub(crate) goal_enc: Option<GoalEncoding>,
    /// The literal under which the current objective bound holds
    pub(crate) goal_guard: Option<Lit>,
    /// The number of store entries already clausified
    pub(crate) n_converted: usize,
    /// Whether preprocessing and clausification started
    pub(crate) converted: bool,
    /// Configuration options
    pub(crate) opts: Options,
    /// Running statistics
    pub(crate) stats: Stats,
    /// Limits for the current solving run
    pub(crate) lims: Limits,
    /// Logger to log with
    pub(crate) logger: Option<Box<dyn WriteSolverLog>>,
    /// Termination flag
    pub(crate) term_flag: Arc<AtomicBool>,
    declared_n_vars: Option<usize>,
    declared_n_constrs: Option<usize>,
    name2index: RsHashMap<String, Var>,
    index2name: Vec<String>,
    /// The best model over the problem variables
    pub(crate) best_model: Option<Vec<bool>>,
    /// The objective value of the best model, [`INF`] if none
    pub(crate) best_goalvalue: Weight,
    /// The models found in all-solutions mode
    pub(crate) all_models: Vec<Vec<bool>>,
}

impl<O: Engine + Default> PbSolver<O> {
    /// Initializes a solver with a default oracle
    pub fn new(opts: Options) -> anyhow::Result<Self> {
        Self::with_oracle(O::default(), opts)
    }
}

impl<O: Engine> PbSolver<O> {
    /// Initializes a solver with a given oracle that has not seen any clauses yet
    pub fn with_oracle(oracle: O, opts: Options) -> anyhow::Result<Self> {
        Ok(PbSolver {
            sat_solver: SolverBridge::new(oracle, opts.preprocessing)?,
            arena: Arena::default(),
            constrs: vec![],
            goal: None,
            trail: vec![],
            assigns: RsHashMap::default(),
            prop_head: 0,
            occurs: None,
            goal_enc: None,
            goal_guard: None,
            n_converted: 0,
            converted: false,
            opts,
            stats: Stats::default(),
            lims: Limits::none(),
            logger: None,
            term_flag: Arc::new(AtomicBool::new(false)),
            declared_n_vars: None,
            declared_n_constrs: None,
            name2index: RsHashMap::default(),
            index2name: vec![],
            best_model: None,
            best_goalvalue: INF,
            all_models: vec![],
        })
    }

    /// Gets the problem variable with a given name, creating it if it does not exist yet
    pub fn get_var(&mut self, name: &str) -> anyhow::Result<Var> {
        if let Some(&var) = self.name2index.get(name) {
            return Ok(var);
        }
        let var = self.new_pb_var()?;
        self.name2index.insert(name.to_owned(), var);
        self.index2name.push(name.to_owned());
        Ok(var)
    }

    /// Creates an anonymous problem variable, named `x<idx+1>`
    pub fn new_var(&mut self) -> anyhow::Result<Var> {
        let var = self.new_pb_var()?;
        let name = format!("x{}", var.idx() + 1);
        self.name2index.entry(name.clone()).or_insert(var);
        self.index2name.push(name);
        Ok(var)
    }

    fn new_pb_var(&mut self) -> anyhow::Result<Var> {
        if self.converted {
            return Err(Error::VarAfterClausify.into());
        }
        let var = self.sat_solver.new_var(Some(false))?;
        debug_assert_eq!(var.idx(), self.index2name.len());
        Ok(var)
    }

    /// Records the declared problem size and reserves capacity for it
    pub fn alloc_constrs(&mut self, n_vars: usize, n_constrs: usize) {
        self.declared_n_vars = Some(n_vars);
        self.declared_n_constrs = Some(n_constrs);
        self.constrs.reserve(n_constrs);
        self.index2name.reserve(n_vars);
    }

    /// Sets the objective to minimize. Returns `false` if the solver is unsatisfiable.
    pub fn add_goal<I>(&mut self, terms: I) -> anyhow::Result<bool>
    where
        I: IntoIterator<Item = (Lit, Weight)>,
    {
        self.add_goal_with_offset(terms, 0)
    }

    /// Sets the objective `offset + sum(terms)` to minimize
    pub fn add_goal_with_offset<I>(&mut self, terms: I, offset: Weight) -> anyhow::Result<bool>
    where
        I: IntoIterator<Item = (Lit, Weight)>,
    {
        if self.goal.is_some() {
            return Err(Error::GoalAlreadySet.into());
        }
        if !self.okay() {
            return Ok(false);
        }
        let (terms, fixed) = normalize_goal(terms, |l| self.value(l))?;
        let offset = crate::types::add_weights(offset, fixed)?;
        let goal = self.arena.alloc(&terms, INF, INF);
        self.goal = Some((goal, offset));
        Ok(true)
    }

    /// Adds the constraint `sum(terms) <ineq> rhs`. Returns `false` if the solver is
    /// unsatisfiable.
    pub fn add_constr<I>(&mut self, terms: I, rhs: Weight, ineq: Ineq) -> anyhow::Result<bool>
    where
        I: IntoIterator<Item = (Lit, Weight)>,
    {
        self.stats.n_orig_constrs += 1;
        if !self.okay() {
            return Ok(false);
        }
        let (lo, hi) = ineq.bounds(rhs)?;
        match normalize(terms, lo, hi, |l| self.value(l))? {
            Normalized::Tautology => Ok(true),
            Normalized::Contradiction => {
                self.set_unsat()?;
                Ok(false)
            }
            Normalized::Constr { terms, lo, hi } => {
                let constr = self.arena.alloc(&terms, lo, hi);
                self.constrs.push(Some(constr));
                self.occurs = None;
                Ok(true)
            }
        }
    }

    /// Whether the solver is not yet known to be unsatisfiable
    pub fn okay(&self) -> bool {
        self.sat_solver.okay()
    }

    /// Makes the solver permanently unsatisfiable
    pub(crate) fn set_unsat(&mut self) -> anyhow::Result<()> {
        self.sat_solver.add_empty_clause()
    }

    /// The value a literal is fixed to
    pub(crate) fn value(&self, lit: Lit) -> TernaryVal {
        match self.assigns.get(&lit.var()) {
            None => TernaryVal::DontCare,
            Some(&val) if val != lit.is_neg() => TernaryVal::True,
            Some(_) => TernaryVal::False,
        }
    }

    pub fn attach_logger<L: WriteSolverLog + 'static>(&mut self, logger: L) {
        self.logger = Some(Box::new(logger));
    }

    pub fn detach_logger(&mut self) -> Option<Box<dyn WriteSolverLog>> {
        self.logger.take()
    }

    /// The SAT oracle bridge
    pub fn bridge(&self) -> &SolverBridge<O> {
        &self.sat_solver
    }

    /// Writes all clauses passed to the oracle as a DIMACS CNF
    pub fn write_dimacs<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        self.sat_solver.write_dimacs(writer)
    }
}

impl<O> PbSolver<O> {
    /// The best model found, indexed by problem variable
    pub fn best_model(&self) -> Option<&[bool]> {
        self.best_model.as_deref()
    }

    /// The objective value of the best model, [`INF`] if there is none or no objective
    pub fn best_goalvalue(&self) -> Weight {
        self.best_goalvalue
    }

    /// The models found in all-solutions mode
    pub fn all_models(&self) -> &[Vec<bool>] {
        &self.all_models
    }

    /// Whether an objective is set
    pub fn has_goal(&self) -> bool {
        self.goal.is_some()
    }

    /// The number of constraints in the store
    pub fn n_constrs(&self) -> usize {
        self.constrs.iter().flatten().count()
    }

    /// The number of problem variables
    pub fn pb_n_vars(&self) -> usize {
        self.index2name.len()
    }

    /// The number of constraints added
    pub fn pb_n_constrs(&self) -> usize {
        self.stats.n_orig_constrs
    }

    pub fn declared_n_vars(&self) -> Option<usize> {
        self.declared_n_vars
    }

    pub fn declared_n_constrs(&self) -> Option<usize> {
        self.declared_n_constrs
    }

    /// The name of a problem variable
    pub fn var_name(&self, var: Var) -> Option<&str> {
        self.index2name.get(var.idx()).map(String::as_str)
    }

    /// The problem variables in index order
    pub fn pb_vars(&self) -> impl Iterator<Item = Var> {
        let n_vars = u32::try_from(self.index2name.len()).unwrap_or(u32::MAX);
        (0..n_vars).map(Var::new)
    }

    pub fn stats(&self) -> Stats {
        Stats {
            n_stored_constrs: self.n_constrs(),
            n_clauses: self.sat_solver.n_clauses(),
            ..self.stats
        }
    }

    /// The number of variables in the oracle, including auxiliary variables
    pub fn n_vars(&self) -> u32 {
        self.sat_solver.n_vars()
    }

    /// Checks the termination flag and terminates if appropriate
    pub(crate) fn check_termination(&self) -> anyhow::Result<()> {
        if self.term_flag.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(Termination::Interrupted.into());
        }
        Ok(())
    }

    /// Checks whether another oracle call is allowed
    pub(crate) fn check_oracle_calls(&self) -> anyhow::Result<()> {
        if self.lims.oracle_calls == Some(0) {
            return Err(Termination::OracleCallsLimit.into());
        }
        Ok(())
    }

    /// Logs an oracle call
    pub(crate) fn log_oracle_call(&mut self, result: SolverResult) -> anyhow::Result<()> {
        self.stats.n_oracle_calls += 1;
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_oracle_call(result).context("logger failed")?;
        }
        if let Some(oracle_calls) = &mut self.lims.oracle_calls {
            *oracle_calls = oracle_calls.saturating_sub(1);
        }
        Ok(())
    }

    /// Logs a solution. Can return a termination if the solution limit is reached.
    pub(crate) fn log_solution(&mut self, value: Option<Weight>) -> anyhow::Result<()> {
        self.stats.n_solutions += 1;
        // Dispatch to logger
        if let Some(logger) = &mut self.logger {
            logger.log_solution(value).context("logger failed")?;
        }
        // Update limit and check termination
        if let Some(solutions) = &mut self.lims.sols {
            *solutions = solutions.saturating_sub(1);
            if *solutions == 0 {
                return Err(Termination::SolsLimit.into());
            }
        }
        Ok(())
    }

    pub(crate) fn log_bound(&mut self, bound: Weight) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_bound(bound).context("logger failed")?;
        }
        Ok(())
    }

    pub(crate) fn log_preprocessing(
        &mut self,
        n_fixed: usize,
        n_split: usize,
        n_flagged: usize,
    ) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger
                .log_preprocessing(n_fixed, n_split, n_flagged)
                .context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine start
    pub(crate) fn log_routine_start(&mut self, desc: &'static str) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_start(desc).context("logger failed")?;
        }
        Ok(())
    }

    /// Logs a routine end
    pub(crate) fn log_routine_end(&mut self) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_routine_end().context("logger failed")?;
        }
        Ok(())
    }

    pub(crate) fn log_end_solve(&mut self) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_end_solve().context("logger failed")?;
        }
        Ok(())
    }

    pub(crate) fn log_message(&mut self, msg: &str) -> anyhow::Result<()> {
        if let Some(logger) = &mut self.logger {
            logger.log_message(msg).context("logger failed")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{lit, types::Var};

    use super::PbSolver;
    use crate::{
        types::{Ineq, INF, NEG_INF},
        Error, Options,
    };

    fn solver() -> PbSolver {
        PbSolver::new(Options::default()).unwrap()
    }

    #[test]
    fn named_vars() {
        let mut s = solver();
        let a = s.get_var("a").unwrap();
        let b = s.get_var("b").unwrap();
        assert_eq!(s.get_var("a").unwrap(), a);
        let c = s.new_var().unwrap();
        assert_eq!(s.var_name(a), Some("a"));
        assert_eq!(s.var_name(b), Some("b"));
        assert_eq!(s.var_name(c), Some("x3"));
        assert_eq!(s.get_var("x3").unwrap(), c);
        assert_eq!(s.pb_n_vars(), 3);
        assert_eq!(s.var_name(Var::new(3)), None);
    }

    #[test]
    fn stored_card() {
        let mut s = solver();
        let x: Vec<_> = (0..3).map(|_| s.new_var().unwrap()).collect();
        assert!(s
            .add_constr(x.iter().map(|v| (v.pos_lit(), 1)), 2, Ineq::Le)
            .unwrap());
        let c = s.constrs[0].unwrap();
        assert_eq!((c.lo, c.hi), (NEG_INF, 2));
        assert_eq!(s.arena.weights(&c), &[1, 1, 1]);
        assert_eq!(s.n_constrs(), 1);
    }

    #[test]
    fn cancelled_term() {
        let mut s = solver();
        let x = s.new_var().unwrap();
        assert!(s
            .add_constr([(x.pos_lit(), 2), (x.pos_lit(), -1)], 0, Ineq::Le)
            .unwrap());
        let c = s.constrs[0].unwrap();
        assert_eq!(s.arena.iter(&c).collect::<Vec<_>>(), vec![(lit![0], 1)]);
        assert_eq!(c.hi, 0);
    }

    #[test]
    fn contradiction_is_permanent() {
        let mut s = solver();
        let x = s.new_var().unwrap();
        let y = s.new_var().unwrap();
        assert!(!s
            .add_constr([(x.pos_lit(), 1), (y.pos_lit(), 1)], 3, Ineq::Ge)
            .unwrap());
        assert!(!s.okay());
        assert!(!s.add_constr([(x.pos_lit(), 1)], 1, Ineq::Ge).unwrap());
        assert!(!s.okay());
        assert_eq!(s.pb_n_constrs(), 2);
        assert_eq!(s.n_constrs(), 0);
    }

    #[test]
    fn second_goal_rejected() {
        let mut s = solver();
        let x = s.new_var().unwrap();
        assert!(s.add_goal([(x.pos_lit(), 1)]).unwrap());
        let err = s.add_goal([(x.pos_lit(), 2)]).unwrap_err();
        assert_eq!(err.downcast::<Error>().unwrap(), Error::GoalAlreadySet);
        assert!(s.has_goal());
        assert_eq!(s.best_goalvalue(), INF);
    }

    #[test]
    fn declared_counts() {
        let mut s = solver();
        assert_eq!(s.declared_n_vars(), None);
        s.alloc_constrs(4, 2);
        assert_eq!(s.declared_n_vars(), Some(4));
        assert_eq!(s.declared_n_constrs(), Some(2));
    }
}
