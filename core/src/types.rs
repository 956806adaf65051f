//! # Types
//!
//! Shared types of the pseudo-boolean solver: weights and their unbounded sentinels, relational
//! operators, constraint shape hints, the variable manager and the objective encoding.

use std::fmt;

use itertools::Itertools;
use rustsat::{
    encodings::{card, pb, CollectClauses},
    instances::ManageVars,
    types::{Lit, Var},
};

use crate::{options::PbEncoding, Error};

/// The coefficient type of pseudo-boolean constraints. Weights, bounds and sums beyond the
/// range of `isize` are rejected with [`Error::WeightOverflow`].
pub type Weight = isize;

/// Upper bound sentinel meaning "unbounded", also used as "no solution found yet"
pub const INF: Weight = Weight::MAX;

/// Lower bound sentinel meaning "unbounded"
pub const NEG_INF: Weight = Weight::MIN;

/// Subtracts a constant from a bound, keeping the unbounded sentinels fixed
pub(crate) fn shift_bound(bound: Weight, constant: Weight) -> Result<Weight, Error> {
    if bound == INF || bound == NEG_INF {
        return Ok(bound);
    }
    bound.checked_sub(constant).ok_or(Error::WeightOverflow)
}

/// Checked weight addition
pub(crate) fn add_weights(a: Weight, b: Weight) -> Result<Weight, Error> {
    a.checked_add(b).ok_or(Error::WeightOverflow)
}

/// Converts a non-negative weight to the unsigned weight type of the encodings
pub(crate) fn to_enc_weight(w: Weight) -> Result<usize, Error> {
    usize::try_from(w).map_err(|_| Error::WeightOverflow)
}

/// Relational operator of an input constraint
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ineq {
    /// `sum < rhs`
    Lt,
    /// `sum <= rhs`
    Le,
    /// `sum = rhs`
    Eq,
    /// `sum >= rhs`
    Ge,
    /// `sum > rhs`
    Gt,
}

impl Ineq {
    /// Gets the inclusive interval `[lo, hi]` that the weighted sum must lie in
    pub fn bounds(self, rhs: Weight) -> Result<(Weight, Weight), Error> {
        Ok(match self {
            Ineq::Lt => (
                NEG_INF,
                rhs.checked_sub(1).ok_or(Error::WeightOverflow)?,
            ),
            Ineq::Le => (NEG_INF, rhs),
            Ineq::Eq => (rhs, rhs),
            Ineq::Ge => (rhs, INF),
            Ineq::Gt => (rhs.checked_add(1).ok_or(Error::WeightOverflow)?, INF),
        })
    }
}

impl fmt::Display for Ineq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineq::Lt => write!(f, "<"),
            Ineq::Le => write!(f, "<="),
            Ineq::Eq => write!(f, "="),
            Ineq::Ge => write!(f, ">="),
            Ineq::Gt => write!(f, ">"),
        }
    }
}

/// Structural hint attached to a constraint, selecting the encoding used for it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
    /// At least one of the literals must be true
    Clause,
    /// All terms share the same weight
    Card { unit: Weight },
    /// The terms fall into a small number of weight classes
    FewLevels(usize),
    /// Generic weighted sum
    Weighted,
}

impl Shape {
    /// Determines the shape of a normalized constraint
    pub fn detect(weights: &[Weight], lo: Weight, hi: Weight, max_levels: usize) -> Self {
        let Some(&first) = weights.first() else {
            return Shape::Clause;
        };
        if hi == INF && lo != NEG_INF && weights.iter().all(|&w| w >= lo) {
            return Shape::Clause;
        }
        match weights.iter().unique().count() {
            1 => Shape::Card { unit: first },
            levels if levels <= max_levels => Shape::FewLevels(levels),
            _ => Shape::Weighted,
        }
    }

    /// Whether the shape allows an encoding cheaper than a generic weighted one
    pub fn is_cheap(self) -> bool {
        !matches!(self, Shape::Weighted)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Clause => write!(f, "clause"),
            Shape::Card { unit } => write!(f, "card({unit})"),
            Shape::FewLevels(levels) => write!(f, "few-levels({levels})"),
            Shape::Weighted => write!(f, "weighted"),
        }
    }
}

/// Variable manager shared between the problem variables and all encodings
#[derive(Debug, Clone, Copy)]
pub struct VarManager {
    next_var: Var,
    n_orig_vars: u32,
}

impl Default for VarManager {
    fn default() -> Self {
        Self {
            next_var: Var::new(0),
            n_orig_vars: 0,
        }
    }
}

impl VarManager {
    /// Marks all variables allocated so far as problem variables
    pub(crate) fn mark_orig_vars(&mut self) {
        self.n_orig_vars = self.next_var.idx32();
    }

    /// The number of problem variables
    pub fn n_orig_vars(&self) -> u32 {
        self.n_orig_vars
    }

    /// The highest problem variable, if any
    pub fn max_orig_var(&self) -> Option<Var> {
        if self.n_orig_vars == 0 {
            None
        } else {
            Some(Var::new(self.n_orig_vars - 1))
        }
    }
}

impl ManageVars for VarManager {
    fn new_var(&mut self) -> Var {
        let v = self.next_var;
        self.next_var += 1;
        v
    }

    fn max_var(&self) -> Option<Var> {
        if self.next_var == Var::new(0) {
            None
        } else {
            Some(self.next_var - 1)
        }
    }

    fn increase_next_free(&mut self, v: Var) -> bool {
        if v > self.next_var {
            self.next_var = v;
            return true;
        };
        false
    }

    fn combine(&mut self, other: Self) {
        if other.next_var > self.next_var {
            self.next_var = other.next_var;
        };
    }

    fn n_used(&self) -> u32 {
        self.next_var.idx32()
    }

    fn forget_from(&mut self, min_var: Var) {
        self.next_var = std::cmp::min(self.next_var, min_var);
        self.n_orig_vars = std::cmp::min(self.n_orig_vars, self.next_var.idx32());
    }
}

/// Incremental upper bounding encoding of the objective. Bounds passed in are on the weighted
/// sum of the objective literals, without the objective offset.
pub(crate) enum GoalEncoding {
    Gte(pb::GeneralizedTotalizer),
    Dpw(pb::DynamicPolyWatchdog),
    Unweighted(card::Totalizer, usize),
    Constant,
}

impl GoalEncoding {
    /// Initializes an encoding suited for the given objective terms
    pub fn new(terms: Vec<(Lit, usize)>, encoding: PbEncoding, max_levels: usize) -> Self {
        let Some(&(_, unit)) = terms.first() else {
            return GoalEncoding::Constant;
        };
        let levels = terms.iter().map(|&(_, w)| w).unique().count();
        if levels == 1 {
            return GoalEncoding::Unweighted(
                card::Totalizer::from_iter(terms.into_iter().map(|(l, _)| l)),
                unit,
            );
        }
        match encoding {
            PbEncoding::Gte => GoalEncoding::Gte(pb::GeneralizedTotalizer::from_iter(terms)),
            PbEncoding::Dpw => GoalEncoding::Dpw(pb::DynamicPolyWatchdog::from_iter(terms)),
            PbEncoding::Auto if levels <= max_levels => {
                GoalEncoding::Gte(pb::GeneralizedTotalizer::from_iter(terms))
            }
            PbEncoding::Auto => GoalEncoding::Dpw(pb::DynamicPolyWatchdog::from_iter(terms)),
        }
    }

    /// Extends the encoding so that the given upper bound can be enforced
    pub fn encode_ub_change<Col>(
        &mut self,
        ub: usize,
        collector: &mut Col,
        var_manager: &mut dyn ManageVars,
    ) -> Result<(), rustsat::OutOfMemory>
    where
        Col: CollectClauses,
    {
        match self {
            GoalEncoding::Gte(enc) => pb::BoundUpperIncremental::encode_ub_change(
                enc,
                ub..ub + 1,
                collector,
                var_manager,
            ),
            GoalEncoding::Dpw(enc) => pb::BoundUpperIncremental::encode_ub_change(
                enc,
                ub..ub + 1,
                collector,
                var_manager,
            ),
            GoalEncoding::Unweighted(enc, unit) => {
                let k = ub / *unit;
                card::BoundUpperIncremental::encode_ub_change(
                    enc,
                    k..k + 1,
                    collector,
                    var_manager,
                )
            }
            GoalEncoding::Constant => Ok(()),
        }
    }

    /// Gets the assumptions enforcing the given upper bound
    pub fn enforce_ub(&self, ub: usize) -> Result<Vec<Lit>, rustsat::encodings::EnforceError> {
        match self {
            GoalEncoding::Gte(enc) => pb::BoundUpper::enforce_ub(enc, ub),
            GoalEncoding::Dpw(enc) => pb::BoundUpper::enforce_ub(enc, ub),
            GoalEncoding::Unweighted(enc, unit) => {
                card::BoundUpper::enforce_ub(enc, ub / *unit).map_err(Into::into)
            }
            GoalEncoding::Constant => Ok(vec![]),
        }
    }
}

impl fmt::Display for GoalEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalEncoding::Gte(_) => write!(f, "gte"),
            GoalEncoding::Dpw(_) => write!(f, "dpw"),
            GoalEncoding::Unweighted(_, unit) => write!(f, "totalizer(unit {unit})"),
            GoalEncoding::Constant => write!(f, "constant"),
        }
    }
}
