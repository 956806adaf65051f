//! # Clausification
//!
//! Encodes the stored constraints as clauses for the oracle and tightens the objective bound
//! after each improving solution.

use rustsat::{
    encodings::{self, card, pb},
    instances::Cnf,
    types::{Clause, Lit},
};

use crate::{
    arena::Linear,
    bridge::Engine,
    options::PbEncoding,
    types::{add_weights, to_enc_weight, GoalEncoding, Shape, Weight, INF, NEG_INF},
    PbSolver,
};

/// The state of the objective bound after a conversion
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalBound {
    /// No bound is enforced
    Unbounded,
    /// The bound holds while the literal is assumed
    Guarded(Lit),
    /// No objective value better than the best one exists
    Infeasible,
}

/// How the weighted sum of a list of terms is bounded from above
enum UbEncoding {
    Card(card::Totalizer, usize),
    Gte(pb::GeneralizedTotalizer, usize),
    Dpw(pb::DynamicPolyWatchdog, usize),
}

impl<O: Engine> PbSolver<O> {
    /// Clausifies all constraints added since the last call. On the first call, also initializes
    /// the objective encoding. If a solution is known, the objective is bounded to improve on it.
    pub(crate) fn convert_pbs(&mut self, first_call: bool) -> anyhow::Result<GoalBound> {
        if !self.okay() {
            return Ok(GoalBound::Infeasible);
        }
        while self.n_converted < self.constrs.len() {
            let idx = self.n_converted;
            self.n_converted += 1;
            if let Some(constr) = self.constrs[idx] {
                self.clausify(constr)?;
            }
            if !self.okay() {
                return Ok(GoalBound::Infeasible);
            }
        }
        if first_call && self.goal_enc.is_none() {
            if let Some((goal, _)) = self.goal {
                let terms = self
                    .arena
                    .iter(&goal)
                    .map(|(l, w)| Ok((l, to_enc_weight(w)?)))
                    .collect::<Result<Vec<_>, crate::Error>>()?;
                let enc =
                    GoalEncoding::new(terms, self.opts.pb_encoding, self.opts.max_weight_levels);
                self.log_message(&format!("objective encoding: {enc}"))?;
                self.goal_enc = Some(enc);
            }
        }
        if self.best_goalvalue == INF || self.goal.is_none() {
            return Ok(self.goal_guard.map_or(GoalBound::Unbounded, GoalBound::Guarded));
        }
        self.bound_goal()
    }

    /// Encodes a single constraint. Without a hint from interval detection, only clauses are
    /// recognized and everything else gets the generic weighted encoding.
    fn clausify(&mut self, constr: Linear) -> anyhow::Result<()> {
        let shape = constr.shape.unwrap_or_else(|| {
            match Shape::detect(
                self.arena.weights(&constr),
                constr.lo,
                constr.hi,
                self.opts.max_weight_levels,
            ) {
                Shape::Clause => Shape::Clause,
                _ => Shape::Weighted,
            }
        });
        if shape == Shape::Clause {
            let clause: Clause = self.arena.lits(&constr).iter().copied().collect();
            self.sat_solver.add_clause(clause)?;
            return Ok(());
        }
        let terms: Vec<(Lit, Weight)> = self.arena.iter(&constr).collect();
        let sum = weight_sum(&terms)?;
        if constr.hi != INF {
            self.encode_ub(&terms, constr.hi, shape)?;
        }
        if constr.lo != NEG_INF && self.okay() {
            // sum >= lo  <=>  sum of negated literals <= S - lo
            let negated: Vec<_> = terms.iter().map(|&(l, w)| (!l, w)).collect();
            self.encode_ub(&negated, sum - constr.lo, shape)?;
        }
        Ok(())
    }

    /// Encodes `sum(terms) <= ub` for a non-negative `ub`
    fn encode_ub(
        &mut self,
        terms: &[(Lit, Weight)],
        ub: Weight,
        shape: Shape,
    ) -> anyhow::Result<()> {
        let mut cnf = Cnf::new();
        let mut rest = Vec::with_capacity(terms.len());
        for &(l, w) in terms {
            if w > ub {
                cnf.add_unit(!l);
            } else {
                rest.push((l, w));
            }
        }
        if let Some(enc) = self.ub_encoding(&rest, ub, shape, &mut cnf)? {
            let vm = &mut self.sat_solver.var_manager;
            let enforced = match enc {
                UbEncoding::Card(mut tot, k) => {
                    card::BoundUpper::encode_ub(&mut tot, k..=k, &mut cnf, vm)?;
                    card::BoundUpper::enforce_ub(&tot, k).map_err(Into::into)
                }
                UbEncoding::Gte(mut gte, ub) => {
                    pb::BoundUpper::encode_ub(&mut gte, ub..=ub, &mut cnf, vm)?;
                    pb::BoundUpper::enforce_ub(&gte, ub)
                }
                UbEncoding::Dpw(mut dpw, ub) => {
                    pb::BoundUpper::encode_ub(&mut dpw, ub..=ub, &mut cnf, vm)?;
                    pb::BoundUpper::enforce_ub(&dpw, ub)
                }
            };
            match enforced {
                Ok(units) => {
                    for l in units {
                        cnf.add_unit(l);
                    }
                }
                Err(encodings::EnforceError::Unsat) => {
                    self.sat_solver.add_cnf(cnf)?;
                    return self.set_unsat();
                }
                Err(err) => anyhow::bail!("constraint encoding failed: {err}"),
            }
        }
        self.sat_solver.add_cnf(cnf)?;
        Ok(())
    }

    /// Selects the encoding for `sum(terms) <= ub` where no weight exceeds `ub`, following the
    /// shape hint of the constraint. Bounds that need at most one clause are added to the
    /// collector directly.
    fn ub_encoding(
        &self,
        terms: &[(Lit, Weight)],
        ub: Weight,
        shape: Shape,
        cnf: &mut Cnf,
    ) -> anyhow::Result<Option<UbEncoding>> {
        if weight_sum(terms)? <= ub {
            return Ok(None);
        }
        if let Shape::Card { unit } = shape {
            let n = terms.len();
            let k = to_enc_weight(ub / unit)?;
            return Ok(if k == 0 {
                for &(l, _) in terms {
                    cnf.add_unit(!l);
                }
                None
            } else if k + 1 == n {
                cnf.add_clause(terms.iter().map(|&(l, _)| !l).collect());
                None
            } else {
                let tot = card::Totalizer::from_iter(terms.iter().map(|&(l, _)| l));
                Some(UbEncoding::Card(tot, k))
            });
        }
        let ub = to_enc_weight(ub)?;
        let wlits = terms
            .iter()
            .map(|&(l, w)| Ok((l, to_enc_weight(w)?)))
            .collect::<Result<Vec<_>, crate::Error>>()?;
        let use_gte = match self.opts.pb_encoding {
            PbEncoding::Gte => true,
            PbEncoding::Dpw => false,
            PbEncoding::Auto => matches!(shape, Shape::FewLevels(_)),
        };
        Ok(Some(if use_gte {
            UbEncoding::Gte(pb::GeneralizedTotalizer::from_iter(wlits), ub)
        } else {
            UbEncoding::Dpw(pb::DynamicPolyWatchdog::from_iter(wlits), ub)
        }))
    }

    /// Bounds the objective to improve on the best known value. The encoding is extended
    /// unconditionally, the bound itself is guarded by a fresh literal and the previous guard
    /// is retracted for good.
    fn bound_goal(&mut self) -> anyhow::Result<GoalBound> {
        let Some((_, offset)) = self.goal else {
            return Ok(GoalBound::Unbounded);
        };
        let Some(ub) = self
            .best_goalvalue
            .checked_sub(1)
            .and_then(|bound| bound.checked_sub(offset))
        else {
            return Ok(GoalBound::Infeasible);
        };
        if ub < 0 {
            return Ok(GoalBound::Infeasible);
        }
        let ub = to_enc_weight(ub)?;
        let Some(enc) = self.goal_enc.as_mut() else {
            return Ok(GoalBound::Unbounded);
        };
        let mut cnf = Cnf::new();
        enc.encode_ub_change(ub, &mut cnf, &mut self.sat_solver.var_manager)?;
        let enforced = enc.enforce_ub(ub);
        self.sat_solver.add_cnf(cnf)?;
        if let Some(old) = self.goal_guard.take() {
            self.sat_solver.add_unit(!old)?;
        }
        let assumps = match enforced {
            Ok(assumps) => assumps,
            Err(encodings::EnforceError::Unsat) => return Ok(GoalBound::Infeasible),
            Err(err) => anyhow::bail!("objective encoding failed: {err}"),
        };
        let guard = self.sat_solver.new_var(None)?;
        self.sat_solver.freeze(guard)?;
        self.sat_solver.set_conditional_var(guard);
        let res = assumps
            .into_iter()
            .try_for_each(|l| self.sat_solver.add_unit(l).map(|_| ()));
        self.sat_solver.clear_conditional_var();
        res?;
        self.log_bound(self.best_goalvalue - 1)?;
        self.goal_guard = Some(guard.pos_lit());
        Ok(GoalBound::Guarded(guard.pos_lit()))
    }
}

/// The checked sum of the weights of some terms
fn weight_sum(terms: &[(Lit, Weight)]) -> Result<Weight, crate::Error> {
    terms.iter().try_fold(0, |sum, &(_, w)| add_weights(sum, w))
}
