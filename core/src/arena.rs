//! # Constraint Records
//!
//! The terms of all constraint records live in one arena of two parallel sequences. A record
//! ([`Linear`]) is a lightweight handle into the arena together with the bounds of the
//! constraint. Records are never freed individually, replacing a record leaves its slots behind
//! until the arena is dropped with the solver.

use rustsat::types::Lit;

use crate::types::{Shape, Weight, INF, NEG_INF};

/// Storage for the terms of constraint records
#[derive(Debug, Default, Clone)]
pub struct Arena {
    lits: Vec<Lit>,
    weights: Vec<Weight>,
}

/// A pseudo-boolean constraint `lo <= sum(w * l) <= hi` stored in an [`Arena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linear {
    start: usize,
    size: usize,
    /// The inclusive lower bound, [`NEG_INF`] if unbounded
    pub lo: Weight,
    /// The inclusive upper bound, [`INF`] if unbounded
    pub hi: Weight,
    /// The structural hint for the clausifier
    pub shape: Option<Shape>,
}

impl Linear {
    /// The number of terms in the record
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Whether the constraint only has a lower bound
    pub fn is_geq(&self) -> bool {
        self.hi == INF && self.lo != NEG_INF
    }
}

impl Arena {
    /// Allocates a record with exactly as many slots as there are terms
    pub fn alloc(&mut self, terms: &[(Lit, Weight)], lo: Weight, hi: Weight) -> Linear {
        let start = self.lits.len();
        self.lits.reserve(terms.len());
        self.weights.reserve(terms.len());
        for &(l, w) in terms {
            self.lits.push(l);
            self.weights.push(w);
        }
        Linear {
            start,
            size: terms.len(),
            lo,
            hi,
            shape: None,
        }
    }

    /// Gets the `idx`-th literal of a record
    pub fn lit(&self, c: &Linear, idx: usize) -> Lit {
        debug_assert!(idx < c.size);
        self.lits[c.start + idx]
    }

    /// Gets the `idx`-th weight of a record
    pub fn weight(&self, c: &Linear, idx: usize) -> Weight {
        debug_assert!(idx < c.size);
        self.weights[c.start + idx]
    }

    pub fn set_lit(&mut self, c: &Linear, idx: usize, lit: Lit) {
        debug_assert!(idx < c.size);
        self.lits[c.start + idx] = lit;
    }

    pub fn set_weight(&mut self, c: &Linear, idx: usize, weight: Weight) {
        debug_assert!(idx < c.size);
        self.weights[c.start + idx] = weight;
    }

    pub fn lits(&self, c: &Linear) -> &[Lit] {
        &self.lits[c.start..c.start + c.size]
    }

    pub fn weights(&self, c: &Linear) -> &[Weight] {
        &self.weights[c.start..c.start + c.size]
    }

    /// Mutable views of the literals and weights of a record
    pub fn terms_mut(&mut self, c: &Linear) -> (&mut [Lit], &mut [Weight]) {
        let range = c.start..c.start + c.size;
        (&mut self.lits[range.clone()], &mut self.weights[range])
    }

    /// Iterates over the terms of a record
    pub fn iter<'a>(&'a self, c: &Linear) -> impl Iterator<Item = (Lit, Weight)> + 'a {
        self.lits(c)
            .iter()
            .copied()
            .zip(self.weights(c).iter().copied())
    }

    /// The number of slots allocated over the lifetime of the arena, including the slots of
    /// replaced records
    pub fn n_slots(&self) -> usize {
        self.lits.len()
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::Arena;
    use crate::types::{INF, NEG_INF};

    #[test]
    fn alloc_and_access() {
        let mut arena = Arena::default();
        let a = arena.alloc(&[(lit![0], 1), (lit![1], 2)], NEG_INF, 2);
        let b = arena.alloc(&[(!lit![2], 3)], 1, INF);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(arena.lit(&a, 1), lit![1]);
        assert_eq!(arena.weight(&b, 0), 3);
        assert_eq!(arena.lit(&b, 0), !lit![2]);
        assert!(b.is_geq());
        assert!(!a.is_geq());
        assert_eq!(arena.n_slots(), 3);
    }

    #[test]
    fn write_access() {
        let mut arena = Arena::default();
        let a = arena.alloc(&[(lit![0], 1), (lit![1], 2)], 1, INF);
        arena.set_weight(&a, 0, 5);
        arena.set_lit(&a, 1, !lit![4]);
        {
            let (lits, weights) = arena.terms_mut(&a);
            lits.swap(0, 1);
            weights.swap(0, 1);
        }
        assert_eq!(
            arena.iter(&a).collect::<Vec<_>>(),
            vec![(!lit![4], 2), (lit![0], 5)]
        );
    }
}
