//! # Normalization
//!
//! Brings raw pseudo-boolean constraints into the canonical form stored by the solver: every
//! variable appears at most once, all weights are strictly positive and fixed literals are
//! folded into the bounds.

use rustsat::types::{Lit, RsHashMap, TernaryVal, Var};

use crate::{
    types::{add_weights, shift_bound, Weight, INF, NEG_INF},
    Error,
};

/// The result of normalizing a constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// A canonical constraint
    Constr {
        terms: Vec<(Lit, Weight)>,
        lo: Weight,
        hi: Weight,
    },
    /// Every assignment satisfies the constraint
    Tautology,
    /// No assignment satisfies the constraint
    Contradiction,
}

/// Merges the terms per variable into a net weight on the positive literal, in order of first
/// appearance. Returns the merged terms and the constant collected from negative literals.
fn merge_terms<I>(terms: I) -> Result<(Vec<(Var, Weight)>, Weight), Error>
where
    I: IntoIterator<Item = (Lit, Weight)>,
{
    let mut index: RsHashMap<Var, usize> = RsHashMap::default();
    let mut merged: Vec<(Var, Weight)> = vec![];
    let mut constant: Weight = 0;
    for (l, w) in terms {
        // w * !x = w - w * x
        let coeff = if l.is_neg() {
            constant = add_weights(constant, w)?;
            w.checked_neg().ok_or(Error::WeightOverflow)?
        } else {
            w
        };
        match index.get(&l.var()) {
            Some(&idx) => merged[idx].1 = add_weights(merged[idx].1, coeff)?,
            None => {
                index.insert(l.var(), merged.len());
                merged.push((l.var(), coeff));
            }
        }
    }
    Ok((merged, constant))
}

/// Turns net weights into strictly positive terms, dropping zero weights and folding fixed
/// variables into the constant
fn positive_terms<F>(
    merged: Vec<(Var, Weight)>,
    mut constant: Weight,
    value: F,
) -> Result<(Vec<(Lit, Weight)>, Weight), Error>
where
    F: Fn(Lit) -> TernaryVal,
{
    let mut terms = Vec::with_capacity(merged.len());
    for (var, coeff) in merged {
        if coeff == 0 {
            continue;
        }
        match value(var.pos_lit()) {
            TernaryVal::True => constant = add_weights(constant, coeff)?,
            TernaryVal::False => (),
            TernaryVal::DontCare => {
                if coeff > 0 {
                    terms.push((var.pos_lit(), coeff));
                } else {
                    // a * x = a + (-a) * !x
                    constant = add_weights(constant, coeff)?;
                    terms.push((var.neg_lit(), coeff.checked_neg().ok_or(Error::WeightOverflow)?));
                }
            }
        }
    }
    Ok((terms, constant))
}

/// Normalizes the constraint `lo <= sum(terms) <= hi`. The `value` closure reports literals
/// that are already fixed.
pub fn normalize<I, F>(terms: I, lo: Weight, hi: Weight, value: F) -> Result<Normalized, Error>
where
    I: IntoIterator<Item = (Lit, Weight)>,
    F: Fn(Lit) -> TernaryVal,
{
    let (merged, constant) = merge_terms(terms)?;
    let (mut terms, constant) = positive_terms(merged, constant, value)?;
    let mut lo = shift_bound(lo, constant)?;
    let mut hi = shift_bound(hi, constant)?;
    let sum = terms
        .iter()
        .try_fold(0, |sum, &(_, w)| add_weights(sum, w))?;

    if lo > hi || (lo != NEG_INF && lo > sum) || (hi != INF && hi < 0) {
        return Ok(Normalized::Contradiction);
    }
    if lo <= 0 {
        lo = NEG_INF;
    }
    if hi >= sum {
        hi = INF;
    }
    if lo == NEG_INF && hi == INF {
        return Ok(Normalized::Tautology);
    }
    if hi == INF {
        // no term can contribute more than what is needed
        for (_, w) in &mut terms {
            *w = std::cmp::min(*w, lo);
        }
    }
    Ok(Normalized::Constr { terms, lo, hi })
}

/// Normalizes the terms of an objective. Returns the terms and the constant offset of the
/// objective.
pub fn normalize_goal<I, F>(terms: I, value: F) -> Result<(Vec<(Lit, Weight)>, Weight), Error>
where
    I: IntoIterator<Item = (Lit, Weight)>,
    F: Fn(Lit) -> TernaryVal,
{
    let (merged, constant) = merge_terms(terms)?;
    positive_terms(merged, constant, value)
}

#[cfg(test)]
mod tests {
    use rustsat::{
        lit,
        types::{Lit, TernaryVal},
    };

    use super::{normalize, normalize_goal, Normalized};
    use crate::types::{Weight, INF, NEG_INF};

    fn unfixed(_: Lit) -> TernaryVal {
        TernaryVal::DontCare
    }

    fn eval(terms: &[(Lit, Weight)], assign: u32) -> Weight {
        terms
            .iter()
            .filter(|(l, _)| {
                let val = assign & (1 << l.var().idx()) != 0;
                val != l.is_neg()
            })
            .map(|&(_, w)| w)
            .sum()
    }

    fn sat(terms: &[(Lit, Weight)], lo: Weight, hi: Weight, assign: u32) -> bool {
        let val = eval(terms, assign);
        (lo == NEG_INF || val >= lo) && (hi == INF || val <= hi)
    }

    #[test]
    fn leq_card() {
        let res = normalize(
            [(lit![0], 1), (lit![1], 1), (lit![2], 1)],
            NEG_INF,
            2,
            unfixed,
        )
        .unwrap();
        assert_eq!(
            res,
            Normalized::Constr {
                terms: vec![(lit![0], 1), (lit![1], 1), (lit![2], 1)],
                lo: NEG_INF,
                hi: 2
            }
        );
    }

    #[test]
    fn merge_duplicates() {
        let res = normalize([(lit![0], 2), (lit![0], -1)], NEG_INF, 0, unfixed).unwrap();
        assert_eq!(
            res,
            Normalized::Constr {
                terms: vec![(lit![0], 1)],
                lo: NEG_INF,
                hi: 0
            }
        );
    }

    #[test]
    fn zero_weight_dropped() {
        let res = normalize(
            [(lit![0], 3), (lit![1], 2), (!lit![0], 3)],
            2,
            INF,
            unfixed,
        )
        .unwrap();
        // 3x0 + 3(1 - x0) + 2x1 >= 2  <=>  2x1 >= -1
        assert_eq!(res, Normalized::Tautology);
        let res = normalize(
            [(lit![0], 3), (lit![1], 2), (!lit![0], 3)],
            5,
            INF,
            unfixed,
        )
        .unwrap();
        assert_eq!(
            res,
            Normalized::Constr {
                terms: vec![(lit![1], 2)],
                lo: 2,
                hi: INF
            }
        );
    }

    #[test]
    fn negative_weight_flipped() {
        // -2x0 + x1 >= -1  <=>  2!x0 + x1 >= 1
        let res = normalize([(lit![0], -2), (lit![1], 1)], -1, INF, unfixed).unwrap();
        assert_eq!(
            res,
            Normalized::Constr {
                terms: vec![(!lit![0], 1), (lit![1], 1)],
                lo: 1,
                hi: INF
            }
        );
    }

    #[test]
    fn fixed_lits_folded() {
        let value = |l: Lit| match (l.var() == lit![0].var(), l.is_pos()) {
            (true, true) => TernaryVal::True,
            (true, false) => TernaryVal::False,
            (false, _) => TernaryVal::DontCare,
        };
        let res = normalize([(lit![0], 3), (lit![1], 2), (lit![2], 2)], 4, 5, value).unwrap();
        assert_eq!(
            res,
            Normalized::Constr {
                terms: vec![(lit![1], 2), (lit![2], 2)],
                lo: 1,
                hi: 2
            }
        );
        // lo = 3 and hi = 2 after folding
        let res = normalize([(lit![0], 3), (lit![1], 2), (lit![2], 2)], 6, 5, value).unwrap();
        assert_eq!(res, Normalized::Contradiction);
    }

    #[test]
    fn contradictions() {
        assert_eq!(
            normalize([(lit![0], 1), (lit![1], 1)], 3, INF, unfixed).unwrap(),
            Normalized::Contradiction
        );
        assert_eq!(
            normalize([(lit![0], 1), (lit![1], 1)], NEG_INF, -1, unfixed).unwrap(),
            Normalized::Contradiction
        );
        assert_eq!(
            normalize([], 1, INF, unfixed).unwrap(),
            Normalized::Contradiction
        );
        assert_eq!(normalize([], 0, 0, unfixed).unwrap(), Normalized::Tautology);
    }

    #[test]
    fn equivalence_brute_force() {
        let cases: Vec<(Vec<(Lit, Weight)>, Weight, Weight)> = vec![
            (
                vec![(lit![0], 3), (!lit![0], 1), (lit![1], -2), (lit![2], 4)],
                1,
                4,
            ),
            (
                vec![(!lit![1], -3), (lit![1], 2), (lit![2], 5), (lit![0], -1)],
                NEG_INF,
                2,
            ),
            (
                vec![(lit![2], 7), (!lit![2], 7), (lit![0], 1), (!lit![1], 6)],
                9,
                INF,
            ),
            (
                vec![(lit![0], -4), (lit![1], -4), (lit![2], 2), (!lit![0], 2)],
                -3,
                -1,
            ),
            (vec![(lit![0], 5), (lit![1], 3), (lit![2], 3)], 6, 6),
        ];
        for (terms, lo, hi) in cases {
            let norm = normalize(terms.clone(), lo, hi, unfixed).unwrap();
            for assign in 0..8 {
                let expected = sat(&terms, lo, hi, assign);
                let actual = match &norm {
                    Normalized::Constr { terms, lo, hi } => {
                        let mut vars: Vec<_> = terms.iter().map(|(l, _)| l.var()).collect();
                        let n = vars.len();
                        vars.sort();
                        vars.dedup();
                        assert_eq!(vars.len(), n);
                        assert!(terms.iter().all(|&(_, w)| w > 0));
                        sat(terms, *lo, *hi, assign)
                    }
                    Normalized::Tautology => true,
                    Normalized::Contradiction => false,
                };
                assert_eq!(expected, actual, "{terms:?} [{lo}, {hi}] under {assign:03b}");
            }
        }
    }

    #[test]
    fn goal_offset() {
        let (terms, offset) =
            normalize_goal([(lit![0], 1), (lit![1], -2), (!lit![2], 3)], unfixed).unwrap();
        assert_eq!(terms, vec![(lit![0], 1), (!lit![1], 2), (!lit![2], 3)]);
        assert_eq!(offset, -2);
    }
}
