//! # Structural Rewriting
//!
//! Passes over the constraint store that prepare constraints for cheaper encodings. All passes
//! preserve the satisfying assignments over the problem variables.

use std::cmp::Reverse;

use rustsat::types::Lit;

use crate::{
    bridge::Engine,
    types::{Shape, Weight, INF},
    PbSolver,
};

/// The minimal number of heavy literals for an almost-clause to be split
const MIN_CLAUSE_PART: usize = 3;

impl<O: Engine> PbSolver<O> {
    /// Sorts the terms of every stored constraint by descending weight and attaches a shape
    /// hint. Returns the number of constraints that allow a cheaper than weighted encoding.
    pub fn find_intervals(&mut self) -> usize {
        let mut n_flagged = 0;
        for entry in self.constrs.iter_mut() {
            let Some(constr) = entry else {
                continue;
            };
            let (lits, weights) = self.arena.terms_mut(constr);
            let mut terms: Vec<_> = lits.iter().copied().zip(weights.iter().copied()).collect();
            terms.sort_by_key(|&(l, w)| (Reverse(w), l));
            for (idx, (l, w)) in terms.into_iter().enumerate() {
                lits[idx] = l;
                weights[idx] = w;
            }
            let shape = Shape::detect(weights, constr.lo, constr.hi, self.opts.max_weight_levels);
            if shape.is_cheap() {
                n_flagged += 1;
            }
            constr.shape = Some(shape);
        }
        self.stats.n_flagged_intervals = n_flagged;
        n_flagged
    }

    /// Splits every lower-bound constraint `sum >= lo` that contains at least
    /// [`MIN_CLAUSE_PART`] literals of weight at least `lo` into the clause `!x | heavy` and the
    /// residual `rest + lo * x >= lo` over a fresh variable `x`. Returns the number of split
    /// constraints.
    pub fn rewrite_almost_clauses(&mut self) -> anyhow::Result<usize> {
        if !self.okay() {
            return Ok(0);
        }
        let mut n_split = 0;
        for idx in 0..self.constrs.len() {
            let Some(constr) = self.constrs[idx] else {
                continue;
            };
            if !constr.is_geq() {
                continue;
            }
            let lo = constr.lo;
            let (heavy, mut rest): (Vec<_>, Vec<_>) =
                self.arena.iter(&constr).partition(|&(_, w)| w >= lo);
            if heavy.len() < MIN_CLAUSE_PART || rest.is_empty() {
                continue;
            }
            let x = self.sat_solver.new_var(None)?;
            rest.push((x.pos_lit(), lo));
            let mut residual = self.arena.alloc(&rest, lo, INF);
            residual.shape = Some(Shape::detect(
                self.arena.weights(&residual),
                lo,
                INF,
                self.opts.max_weight_levels,
            ));
            let clause_terms: Vec<(Lit, Weight)> = std::iter::once((x.neg_lit(), 1))
                .chain(heavy.into_iter().map(|(l, _)| (l, 1)))
                .collect();
            let mut clause = self.arena.alloc(&clause_terms, 1, INF);
            clause.shape = Some(Shape::Clause);
            self.constrs[idx] = Some(residual);
            self.constrs.push(Some(clause));
            n_split += 1;
        }
        if n_split > 0 {
            self.occurs = None;
        }
        self.stats.n_almost_clause_splits += n_split;
        Ok(n_split)
    }
}
