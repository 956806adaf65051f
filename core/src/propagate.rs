//! # Propagation
//!
//! Bound-based unit propagation over the constraint store. Runs once to a fixpoint before
//! clausification; it is not interleaved with the search of the oracle.

use rustsat::types::{Lit, TernaryVal};

use crate::{
    bridge::Engine,
    normalize::{normalize, normalize_goal, Normalized},
    occurs::Occurs,
    types::{INF, NEG_INF},
    PbSolver,
};

impl<O: Engine> PbSolver<O> {
    /// Fixes a literal to true and asserts it in the oracle
    pub fn add_unit(&mut self, lit: Lit) -> anyhow::Result<()> {
        match self.value(lit) {
            TernaryVal::True => (),
            TernaryVal::False => self.set_unsat()?,
            TernaryVal::DontCare => {
                self.assigns.insert(lit.var(), lit.is_pos());
                self.trail.push(lit);
                self.stats.n_fixed_lits += 1;
            }
        }
        self.sat_solver.add_unit(lit)?;
        Ok(())
    }

    /// Propagates a single constraint, fixing every literal it forces
    fn propagate_constr(&mut self, idx: usize) -> anyhow::Result<()> {
        let Some(constr) = self.constrs[idx] else {
            return Ok(());
        };
        // weight sums of normalized constraints are known not to overflow
        let mut min = 0;
        let mut free = 0;
        for (l, w) in self.arena.iter(&constr) {
            match self.value(l) {
                TernaryVal::True => min += w,
                TernaryVal::False => (),
                TernaryVal::DontCare => free += w,
            }
        }
        let max = min + free;
        if (constr.hi != INF && min > constr.hi) || (constr.lo != NEG_INF && max < constr.lo) {
            return self.set_unsat();
        }
        let forced: Vec<Lit> = self
            .arena
            .iter(&constr)
            .filter(|&(l, _)| self.value(l) == TernaryVal::DontCare)
            .filter_map(|(l, w)| {
                if constr.hi != INF && min + w > constr.hi {
                    Some(!l)
                } else if constr.lo != NEG_INF && max - w < constr.lo {
                    Some(l)
                } else {
                    None
                }
            })
            .collect();
        for lit in forced {
            self.add_unit(lit)?;
        }
        Ok(())
    }

    /// Propagates fixed literals through the store until a fixpoint is reached
    pub fn propagate(&mut self) -> anyhow::Result<()> {
        if !self.okay() {
            return Ok(());
        }
        if self.occurs.is_none() {
            self.setup_occurs();
        }
        // constraints can force literals without any trail entry
        for idx in 0..self.constrs.len() {
            self.propagate_constr(idx)?;
            if !self.okay() {
                return Ok(());
            }
        }
        while self.prop_head < self.trail.len() {
            let lit = self.trail[self.prop_head];
            self.prop_head += 1;
            let watched: Vec<usize> = match &self.occurs {
                Some(occurs) => occurs.get_var(lit).collect(),
                None => vec![],
            };
            for idx in watched {
                self.propagate_constr(idx)?;
                if !self.okay() {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Re-normalizes every stored constraint containing a fixed literal. Removes satisfied
    /// constraints and folds fixed objective literals into the offset.
    pub fn simplify(&mut self) -> anyhow::Result<()> {
        if !self.okay() {
            return Ok(());
        }
        for idx in 0..self.constrs.len() {
            let Some(constr) = self.constrs[idx] else {
                continue;
            };
            if self
                .arena
                .lits(&constr)
                .iter()
                .all(|&l| self.value(l) == TernaryVal::DontCare)
            {
                continue;
            }
            let terms: Vec<_> = self.arena.iter(&constr).collect();
            match normalize(terms, constr.lo, constr.hi, |l| self.value(l))? {
                Normalized::Tautology => self.constrs[idx] = None,
                Normalized::Contradiction => return self.set_unsat(),
                Normalized::Constr { terms, lo, hi } => {
                    self.constrs[idx] = Some(self.arena.alloc(&terms, lo, hi));
                }
            }
        }
        if let Some((goal, offset)) = self.goal {
            if self
                .arena
                .lits(&goal)
                .iter()
                .any(|&l| self.value(l) != TernaryVal::DontCare)
            {
                let terms: Vec<_> = self.arena.iter(&goal).collect();
                let (terms, fixed) = normalize_goal(terms, |l| self.value(l))?;
                let offset = crate::types::add_weights(offset, fixed)?;
                self.goal = Some((self.arena.alloc(&terms, INF, INF), offset));
            }
        }
        self.occurs = None;
        Ok(())
    }

    /// Builds the occurrence index over the store
    pub fn setup_occurs(&mut self) {
        self.occurs = Some(Occurs::build(&self.arena, &self.constrs));
    }

    /// The occurrence index, if valid
    pub fn occurs(&self) -> Option<&Occurs> {
        self.occurs.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use rustsat::types::{TernaryVal, Var};

    use crate::{types::Ineq, Options, PbSolver};

    fn solver_with_vars(n: usize) -> (PbSolver, Vec<Var>) {
        let mut s = PbSolver::new(Options::default()).unwrap();
        let vars = (0..n).map(|_| s.new_var().unwrap()).collect();
        (s, vars)
    }

    #[test]
    fn card_forces_rest_false() {
        // x1 + x2 + x3 <= 1 with x1 fixed true
        let (mut s, x) = solver_with_vars(3);
        s.add_constr(x.iter().map(|v| (v.pos_lit(), 1)), 1, Ineq::Le)
            .unwrap();
        s.add_unit(x[0].pos_lit()).unwrap();
        s.propagate().unwrap();
        assert!(s.okay());
        assert_eq!(s.value(x[1].pos_lit()), TernaryVal::False);
        assert_eq!(s.value(x[2].pos_lit()), TernaryVal::False);
    }

    #[test]
    fn card_forces_rest_true() {
        // x1 + x2 + x3 >= 2 with x1 fixed false
        let (mut s, x) = solver_with_vars(3);
        s.add_constr(x.iter().map(|v| (v.pos_lit(), 1)), 2, Ineq::Ge)
            .unwrap();
        s.add_unit(x[0].neg_lit()).unwrap();
        s.propagate().unwrap();
        assert!(s.okay());
        assert_eq!(s.value(x[1].pos_lit()), TernaryVal::True);
        assert_eq!(s.value(x[2].pos_lit()), TernaryVal::True);
    }

    #[test]
    fn card_equality_forces_both_ways() {
        for n in 3..=5 {
            for k in 1..n {
                // n - k literals false leave exactly k candidates for sum = k
                let (mut s, x) = solver_with_vars(n);
                s.add_constr(x.iter().map(|v| (v.pos_lit(), 1)), k as isize, Ineq::Eq)
                    .unwrap();
                for v in &x[..n - k] {
                    s.add_unit(v.neg_lit()).unwrap();
                }
                s.propagate().unwrap();
                assert!(s.okay());
                for v in &x[n - k..] {
                    assert_eq!(s.value(v.pos_lit()), TernaryVal::True, "n = {n}, k = {k}");
                }

                // k literals true saturate the bound
                let (mut s, x) = solver_with_vars(n);
                s.add_constr(x.iter().map(|v| (v.pos_lit(), 1)), k as isize, Ineq::Eq)
                    .unwrap();
                for v in &x[..k] {
                    s.add_unit(v.pos_lit()).unwrap();
                }
                s.propagate().unwrap();
                assert!(s.okay());
                for v in &x[k..] {
                    assert_eq!(s.value(v.pos_lit()), TernaryVal::False, "n = {n}, k = {k}");
                }
            }
        }
    }

    #[test]
    fn forcing_without_trail() {
        // 3x1 + x2 + x3 >= 3 forces x1 before anything is fixed
        let (mut s, x) = solver_with_vars(3);
        s.add_constr(
            [(x[0].pos_lit(), 3), (x[1].pos_lit(), 1), (x[2].pos_lit(), 1)],
            3,
            Ineq::Ge,
        )
        .unwrap();
        s.propagate().unwrap();
        assert_eq!(s.value(x[0].pos_lit()), TernaryVal::True);
        assert_eq!(s.trail, vec![x[0].pos_lit()]);
    }

    #[test]
    fn chained_propagation() {
        let (mut s, x) = solver_with_vars(3);
        // x1 => x2, x2 => x3
        s.add_constr([(x[0].neg_lit(), 1), (x[1].pos_lit(), 1)], 1, Ineq::Ge)
            .unwrap();
        s.add_constr([(x[1].neg_lit(), 1), (x[2].pos_lit(), 1)], 1, Ineq::Ge)
            .unwrap();
        s.add_unit(x[0].pos_lit()).unwrap();
        s.propagate().unwrap();
        assert_eq!(s.value(x[2].pos_lit()), TernaryVal::True);
        assert_eq!(s.stats().n_fixed_lits, 3);
    }

    #[test]
    fn conflict_is_permanent() {
        let (mut s, x) = solver_with_vars(2);
        s.add_constr([(x[0].pos_lit(), 1), (x[1].pos_lit(), 1)], 2, Ineq::Ge)
            .unwrap();
        s.add_constr([(x[0].pos_lit(), 1), (x[1].pos_lit(), 1)], 1, Ineq::Le)
            .unwrap();
        s.propagate().unwrap();
        assert!(!s.okay());
    }

    #[test]
    fn simplify_drops_fixed() {
        let (mut s, x) = solver_with_vars(3);
        s.add_constr(
            [(x[0].pos_lit(), 2), (x[1].pos_lit(), 1), (x[2].pos_lit(), 1)],
            2,
            Ineq::Ge,
        )
        .unwrap();
        s.add_constr([(x[0].pos_lit(), 1), (x[1].pos_lit(), 1)], 1, Ineq::Ge)
            .unwrap();
        s.add_goal([(x[0].pos_lit(), 5), (x[2].pos_lit(), 1)]).unwrap();
        s.add_unit(x[0].neg_lit()).unwrap();
        s.propagate().unwrap();
        s.simplify().unwrap();
        assert!(s.okay());
        assert!(s.occurs().is_none());
        // both x2 and x3 are forced, leaving nothing open
        assert_eq!(s.n_constrs(), 0);
        let (goal, offset) = s.goal.unwrap();
        assert_eq!(offset, 1);
        assert!(goal.is_empty());
    }

    #[test]
    fn occurs_rebuild_idempotent() {
        let (mut s, x) = solver_with_vars(3);
        s.add_constr([(x[0].pos_lit(), 1), (x[1].pos_lit(), 2)], 2, Ineq::Ge)
            .unwrap();
        s.add_constr([(x[2].neg_lit(), 1), (x[1].pos_lit(), 1)], 1, Ineq::Le)
            .unwrap();
        s.setup_occurs();
        let first = s.occurs().cloned();
        s.setup_occurs();
        assert_eq!(s.occurs().cloned(), first);
        assert_eq!(first.unwrap().get(x[1].pos_lit()), &[0, 1]);
    }
}
