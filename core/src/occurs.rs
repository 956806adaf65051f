//! # Occurrence Index
//!
//! Maps literals to the indices of the stored constraints containing them.

use itertools::Itertools;
use rustsat::types::{Lit, RsHashMap};

use crate::arena::{Arena, Linear};

/// Literal to constraint index mapping. Index lists are sorted in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occurs {
    lists: RsHashMap<Lit, Vec<usize>>,
}

impl Occurs {
    /// Builds the index over a constraint store, skipping removed entries
    pub fn build(arena: &Arena, constrs: &[Option<Linear>]) -> Self {
        let mut lists: RsHashMap<Lit, Vec<usize>> = RsHashMap::default();
        for (idx, constr) in constrs.iter().enumerate() {
            let Some(constr) = constr else {
                continue;
            };
            for &l in arena.lits(constr) {
                lists.entry(l).or_default().push(idx);
            }
        }
        Occurs { lists }
    }

    /// Gets the constraints containing a literal
    pub fn get(&self, lit: Lit) -> &[usize] {
        self.lists.get(&lit).map_or(&[], Vec::as_slice)
    }

    /// Gets the constraints containing either polarity of a literal's variable
    pub fn get_var(&self, lit: Lit) -> impl Iterator<Item = usize> + '_ {
        itertools::merge(self.get(lit).iter(), self.get(!lit).iter())
            .copied()
            .dedup()
    }
}

#[cfg(test)]
mod tests {
    use rustsat::lit;

    use super::Occurs;
    use crate::{
        arena::Arena,
        types::{INF, NEG_INF},
    };

    #[test]
    fn build_index() {
        let mut arena = Arena::default();
        let a = arena.alloc(&[(lit![0], 1), (lit![1], 1)], 1, INF);
        let b = arena.alloc(&[(!lit![0], 2), (lit![2], 1)], NEG_INF, 2);
        let c = arena.alloc(&[(lit![0], 3)], 1, INF);
        let occurs = Occurs::build(&arena, &[Some(a), None, Some(b), Some(c)]);
        assert_eq!(occurs.get(lit![0]), &[0, 3]);
        assert_eq!(occurs.get(!lit![0]), &[2]);
        assert_eq!(occurs.get(lit![1]), &[0]);
        assert!(occurs.get(!lit![1]).is_empty());
        assert_eq!(occurs.get_var(!lit![0]).collect::<Vec<_>>(), vec![0, 2, 3]);
    }

    #[test]
    fn rebuild_is_identical() {
        let mut arena = Arena::default();
        let a = arena.alloc(&[(lit![3], 1), (!lit![1], 1)], 1, INF);
        let b = arena.alloc(&[(lit![1], 2), (lit![3], 1)], NEG_INF, 2);
        let constrs = [Some(a), Some(b)];
        assert_eq!(
            Occurs::build(&arena, &constrs),
            Occurs::build(&arena, &constrs)
        );
    }
}
