//! # SAT Oracle Bridge
//!
//! A thin layer between the pseudo-boolean solver and the incremental SAT oracle. The bridge
//! owns the variable manager shared by problem variables and encodings, keeps a log of every
//! clause passed to the oracle, can condition all added clauses on a retractable literal and
//! controls variable elimination in the oracle.

use std::{
    io,
    sync::{Arc, Mutex},
};

use rustsat::{
    instances::{Cnf, ManageVars},
    solvers::{FreezeVar, Interrupt, InterruptSolver, PhaseLit, SolveIncremental, SolverResult},
    types::{Assignment, Clause, Lit, RsHashSet, TernaryVal, Var},
};

use crate::types::VarManager;

/// Oracles that can turn variable elimination on or off
pub trait Preprocess {
    /// Enables or disables preprocessing. Must be called before any clause is added.
    fn set_preprocessing(&mut self, enabled: bool) -> anyhow::Result<()>;
}

impl Preprocess for rustsat_cadical::CaDiCaL<'_, '_> {
    fn set_preprocessing(&mut self, enabled: bool) -> anyhow::Result<()> {
        self.set_option("elim", i32::from(enabled))?;
        Ok(())
    }
}

/// The capabilities required from the SAT oracle
pub trait Engine: SolveIncremental + FreezeVar + PhaseLit + Interrupt + Preprocess {}

impl<O> Engine for O where O: SolveIncremental + FreezeVar + PhaseLit + Interrupt + Preprocess {}

pub(crate) type OracleInterrupter = Arc<Mutex<Box<dyn InterruptSolver + Send>>>;

/// Wrapper around an incremental SAT oracle
pub struct SolverBridge<O> {
    /// The SAT oracle
    oracle: O,
    /// The variable manager keeping track of variables
    pub(crate) var_manager: VarManager,
    /// The variable that every added clause is currently conditioned on
    conditional: Option<Var>,
    /// All added clauses in IPASIR format, each terminated by `0`
    clause_log: Vec<i32>,
    /// The number of clauses added
    n_clauses: usize,
    /// Whether the clause database is still consistent
    ok: bool,
    /// Whether variable elimination is enabled in the oracle
    preprocessing: bool,
    /// Variables protected from elimination
    frozen: RsHashSet<Var>,
    /// The interrupter of the oracle
    interrupter: OracleInterrupter,
}

impl<O: Engine> SolverBridge<O> {
    /// Wraps an oracle that has not seen any clauses yet
    pub fn new(mut oracle: O, preprocessing: bool) -> anyhow::Result<Self> {
        oracle.set_preprocessing(preprocessing)?;
        let interrupter = oracle.interrupter();
        Ok(SolverBridge {
            oracle,
            var_manager: VarManager::default(),
            conditional: None,
            clause_log: vec![],
            n_clauses: 0,
            ok: true,
            preprocessing,
            frozen: RsHashSet::default(),
            interrupter: Arc::new(Mutex::new(Box::new(interrupter))),
        })
    }

    /// Creates a new variable, optionally with a preferred polarity
    pub fn new_var(&mut self, polarity: Option<bool>) -> anyhow::Result<Var> {
        let var = self.var_manager.new_var();
        self.oracle.reserve(var)?;
        if let Some(polarity) = polarity {
            let lit = if polarity { var.pos_lit() } else { var.neg_lit() };
            self.oracle.phase_lit(lit)?;
        }
        Ok(var)
    }

    /// Adds a clause, extended by the negated conditional variable if one is set. Returns
    /// whether the clause database is still consistent.
    pub fn add_clause(&mut self, mut clause: Clause) -> anyhow::Result<bool> {
        if let Some(cond) = self.conditional {
            clause.add(cond.neg_lit());
        }
        for &lit in clause.iter() {
            self.clause_log.push(lit.to_ipasir());
        }
        self.clause_log.push(0);
        self.n_clauses += 1;
        if clause.is_empty() {
            self.ok = false;
        }
        self.oracle.add_clause(clause)?;
        Ok(self.ok)
    }

    pub fn add_unit(&mut self, lit: Lit) -> anyhow::Result<bool> {
        self.add_clause(Clause::from_iter([lit]))
    }

    /// Adds the empty clause. Ignores the conditional variable, so the oracle becomes
    /// unsatisfiable for good.
    pub fn add_empty_clause(&mut self) -> anyhow::Result<()> {
        let cond = self.conditional.take();
        let res = self.add_clause(Clause::new());
        self.conditional = cond;
        res.map(|_| ())
    }

    /// Adds all clauses of a CNF. Returns whether the clause database is still consistent.
    pub fn add_cnf(&mut self, cnf: Cnf) -> anyhow::Result<bool> {
        for clause in cnf {
            self.add_clause(clause)?;
        }
        Ok(self.ok)
    }

    /// Protects a variable from elimination
    pub fn freeze(&mut self, var: Var) -> anyhow::Result<()> {
        if self.frozen.insert(var) && self.preprocessing {
            self.oracle.freeze_var(var)?;
        }
        Ok(())
    }

    pub fn phase_lit(&mut self, lit: Lit) -> anyhow::Result<()> {
        self.oracle.phase_lit(lit)
    }

    /// Solves without assumptions. An unsatisfiable result is final and recorded as the empty
    /// clause.
    pub fn solve(&mut self) -> anyhow::Result<SolverResult> {
        let res = self.oracle.solve()?;
        if res == SolverResult::Unsat && self.ok {
            self.add_empty_clause()?;
        }
        Ok(res)
    }

    pub fn solve_assumps(&mut self, assumps: &[Lit]) -> anyhow::Result<SolverResult> {
        self.oracle.solve_assumps(assumps)
    }

    /// Gets the value of a literal in the last model
    pub fn model_value(&self, lit: Lit) -> anyhow::Result<TernaryVal> {
        self.oracle.lit_val(lit)
    }

    /// Gets the last model up to a maximum variable
    pub fn model(&self, max_var: Var) -> anyhow::Result<Assignment> {
        self.oracle.solution(max_var)
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub(crate) fn interrupter(&self) -> OracleInterrupter {
        self.interrupter.clone()
    }
}

impl<O> SolverBridge<O> {
    /// Whether the oracle may have eliminated the variable. The oracle does not report
    /// elimination, so every unfrozen variable counts as eliminated while preprocessing is on.
    pub fn is_eliminated(&self, var: Var) -> bool {
        self.preprocessing && !self.frozen.contains(&var)
    }

    pub fn conditional_var(&self) -> Option<Var> {
        self.conditional
    }

    pub fn clear_conditional_var(&mut self) {
        self.conditional = None;
    }

    pub fn set_conditional_var(&mut self, var: Var) {
        self.conditional = Some(var);
    }

    /// The number of variables in use
    pub fn n_vars(&self) -> u32 {
        self.var_manager.n_used()
    }

    /// The number of clauses added
    pub fn n_clauses(&self) -> usize {
        self.n_clauses
    }

    /// Whether the clause database is still consistent
    pub fn okay(&self) -> bool {
        self.ok
    }

    /// Whether variable elimination is enabled
    pub fn preprocessing(&self) -> bool {
        self.preprocessing
    }

    /// All added clauses as 1-based signed variable identifiers, each clause terminated by `0`
    pub fn clause_log(&self) -> &[i32] {
        &self.clause_log
    }

    /// Writes the clause log as a DIMACS CNF
    pub fn write_dimacs<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writeln!(writer, "p cnf {} {}", self.n_vars(), self.n_clauses)?;
        for &lit in &self.clause_log {
            if lit == 0 {
                writeln!(writer, "0")?;
            } else {
                write!(writer, "{lit} ")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rustsat::{
        clause,
        instances::ManageVars,
        solvers::SolverResult,
        types::{Lit, TernaryVal},
    };
    use rustsat_cadical::CaDiCaL;

    use super::SolverBridge;

    fn bridge(preprocessing: bool) -> SolverBridge<CaDiCaL<'static, 'static>> {
        SolverBridge::new(CaDiCaL::default(), preprocessing).unwrap()
    }

    #[test]
    fn clause_log_format() {
        let mut b = bridge(false);
        let x = b.new_var(None).unwrap();
        let y = b.new_var(Some(false)).unwrap();
        assert!(b.add_clause(clause![x.pos_lit(), y.neg_lit()]).unwrap());
        assert!(b.add_unit(y.pos_lit()).unwrap());
        assert_eq!(b.clause_log(), &[1, -2, 0, 2, 0]);
        assert_eq!(b.n_clauses(), 2);
        assert_eq!(b.n_vars(), 2);
    }

    #[test]
    fn conditional_injection() {
        let mut b = bridge(false);
        let x = b.new_var(None).unwrap();
        let c = b.new_var(None).unwrap();
        b.set_conditional_var(c);
        b.add_unit(x.neg_lit()).unwrap();
        b.clear_conditional_var();
        b.add_unit(x.pos_lit()).unwrap();
        assert_eq!(b.clause_log(), &[-1, -2, 0, 1, 0]);
        // assuming the conditional variable activates the conflicting unit
        assert_eq!(
            b.solve_assumps(&[c.pos_lit()]).unwrap(),
            SolverResult::Unsat
        );
        assert!(b.okay());
        assert_eq!(b.solve().unwrap(), SolverResult::Sat);
        assert_eq!(b.model_value(c.pos_lit()).unwrap(), TernaryVal::False);
    }

    #[test]
    fn empty_clause_is_final() {
        let mut b = bridge(false);
        let c = b.new_var(None).unwrap();
        b.set_conditional_var(c);
        b.add_empty_clause().unwrap();
        assert!(!b.okay());
        assert_eq!(b.conditional_var(), Some(c));
        assert_eq!(b.clause_log(), &[0]);
        assert_eq!(b.solve().unwrap(), SolverResult::Unsat);
    }

    #[test]
    fn unsat_solve_is_final() {
        let mut b = bridge(false);
        let x = b.new_var(None).unwrap();
        b.add_unit(x.pos_lit()).unwrap();
        b.add_unit(x.neg_lit()).unwrap();
        assert!(b.okay());
        assert_eq!(b.solve().unwrap(), SolverResult::Unsat);
        assert!(!b.okay());
        assert_eq!(b.clause_log(), &[1, 0, -1, 0, 0]);
        assert_eq!(b.n_clauses(), 3);
        // a second refutation is not logged again
        assert_eq!(b.solve().unwrap(), SolverResult::Unsat);
        assert_eq!(b.n_clauses(), 3);
    }

    #[test]
    fn eliminated_only_with_preprocessing() {
        let mut b = bridge(true);
        let x = b.new_var(None).unwrap();
        let y = b.new_var(None).unwrap();
        b.freeze(x).unwrap();
        assert!(!b.is_eliminated(x));
        assert!(b.is_eliminated(y));
        let mut b = bridge(false);
        let y = b.new_var(None).unwrap();
        assert!(!b.is_eliminated(y));
    }

    #[test]
    fn shared_var_manager() {
        let mut b = bridge(false);
        b.new_var(None).unwrap();
        let enc_var = b.var_manager.new_var();
        assert_eq!(enc_var, rustsat::var![1]);
        let lit: Lit = b.new_var(None).unwrap().pos_lit();
        assert_eq!(lit, rustsat::lit![2]);
    }

    #[test]
    fn dimacs_export() {
        let mut b = bridge(false);
        let x = b.new_var(None).unwrap();
        let y = b.new_var(None).unwrap();
        b.add_clause(clause![x.pos_lit(), y.pos_lit()]).unwrap();
        b.add_unit(y.neg_lit()).unwrap();
        let mut out = vec![];
        b.write_dimacs(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "p cnf 2 2\n1 2 0\n-2 0\n");
    }
}
