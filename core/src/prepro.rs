//! # Instance Processing Happening _Before_ It's Being Passed To The Actual Solver
//!
//! Reads OPB files and loads them into a [`PbSolver`].

use std::{ffi::OsString, fmt, path::Path};

use rustsat::{
    instances::{fio, OptInstance},
    types::{constraints::PbConstraint, Lit, Var},
};

use crate::{
    bridge::Engine,
    types::{Ineq, Weight},
    PbSolver,
};

#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum FileFormat {
    /// Infer the file format from the file extension. Only `.opb` is accepted, optionally
    /// followed by `.gz`, `.bz2` or `.xz` if compression is used.
    #[default]
    Infer,
    /// An OPB file, regardless of the extension
    Opb,
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileFormat::Infer => write!(f, "infer"),
            FileFormat::Opb => write!(f, "opb"),
        }
    }
}

macro_rules! is_one_of {
    ($a:expr, $($b:expr),*) => {
        $( $a == $b || )* false
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Cannot infer file format from extension {0:?}")]
    UnknownFileExtension(OsString),
    #[error("To infer the file format, the file needs to have a file extension")]
    NoFileExtension,
}

/// Checks that a path names an OPB file, possibly compressed
fn check_extension(inst_path: &Path) -> Result<(), Error> {
    let Some(ext) = inst_path.extension() else {
        return Err(Error::NoFileExtension);
    };
    let path_without_compr = inst_path.with_extension("");
    let ext = if is_one_of!(ext, "gz", "bz2", "xz") {
        // Strip compression extension
        path_without_compr
            .extension()
            .ok_or(Error::NoFileExtension)?
    } else {
        ext
    };
    if is_one_of!(ext, "opb", "pbo") {
        Ok(())
    } else {
        Err(Error::UnknownFileExtension(OsString::from(ext)))
    }
}

/// Parses an OPB instance from a file
pub fn parse<P: AsRef<Path>>(
    inst_path: P,
    file_format: FileFormat,
    opb_opts: fio::opb::Options,
) -> anyhow::Result<Parsed> {
    let inst_path = inst_path.as_ref();
    let first_var_idx = opb_opts.first_var_idx;
    if file_format == FileFormat::Infer {
        check_extension(inst_path)?;
    }
    let inst: OptInstance = OptInstance::from_opb_path(inst_path, opb_opts)?;
    let (constr, obj) = inst.decompose();
    let (constrs, _) = constr.into_pbs();
    let (softs, offset) = obj.into_soft_cls();
    let mut goal = vec![];
    for (cl, w) in softs {
        // soft clauses of an objective built from literals are units
        anyhow::ensure!(cl.len() == 1, "objective term is not a literal");
        goal.push((!cl[0], w));
    }
    let max_var = constrs
        .iter()
        .flat_map(|c| c.into_iter().map(|&(l, _)| l))
        .chain(goal.iter().map(|&(l, _)| l))
        .map(|l| l.var())
        .max();
    Ok(Parsed {
        constrs,
        goal,
        offset,
        max_var,
        first_var_idx,
    })
}

/// A parsed OPB instance
pub struct Parsed {
    constrs: Vec<PbConstraint>,
    goal: Vec<(Lit, usize)>,
    offset: isize,
    max_var: Option<Var>,
    first_var_idx: u32,
}

impl Parsed {
    /// The number of variables in the instance
    pub fn n_vars(&self) -> usize {
        self.max_var.map_or(0, |v| v.idx() + 1)
    }

    /// The number of constraints in the instance
    pub fn n_constrs(&self) -> usize {
        self.constrs.len()
    }

    /// Whether the instance has an objective
    pub fn has_goal(&self) -> bool {
        !self.goal.is_empty() || self.offset != 0
    }

    /// Loads the instance into a solver that does not have any problem variables yet. Returns
    /// `false` if the solver became unsatisfiable.
    pub fn load<O: Engine>(self, solver: &mut PbSolver<O>) -> anyhow::Result<bool> {
        anyhow::ensure!(
            solver.pb_n_vars() == 0,
            "instances can only be loaded into fresh solvers"
        );
        let n_vars = self.n_vars();
        solver.alloc_constrs(n_vars, self.constrs.len());
        let first_var_idx = usize::try_from(self.first_var_idx)?;
        for idx in 0..n_vars {
            let var = solver.get_var(&format!("x{}", idx + first_var_idx))?;
            debug_assert_eq!(var.idx(), idx);
        }
        if self.has_goal() {
            let terms = to_weighted(self.goal)?;
            solver.add_goal_with_offset(terms, self.offset)?;
        }
        for constr in self.constrs {
            let (lits, rhs, ineq) = match constr {
                PbConstraint::Ub(c) => {
                    let (lits, rhs) = c.decompose();
                    (lits, rhs, Ineq::Le)
                }
                PbConstraint::Lb(c) => {
                    let (lits, rhs) = c.decompose();
                    (lits, rhs, Ineq::Ge)
                }
                PbConstraint::Eq(c) => {
                    let (lits, rhs) = c.decompose();
                    (lits, rhs, Ineq::Eq)
                }
            };
            if !solver.add_constr(to_weighted(lits)?, rhs, ineq)? {
                return Ok(false);
            }
        }
        Ok(solver.okay())
    }
}

fn to_weighted(terms: Vec<(Lit, usize)>) -> anyhow::Result<Vec<(Lit, Weight)>> {
    terms
        .into_iter()
        .map(|(l, w)| {
            let w = Weight::try_from(w).map_err(|_| crate::Error::WeightOverflow)?;
            Ok((l, w))
        })
        .collect()
}
