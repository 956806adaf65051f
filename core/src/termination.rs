//! # Functionality Related to Early Solver Termination
//!
//! Early termination is passed up the call stack as an [`anyhow::Error`] wrapping a
//! [`Termination`] and turned back into an outcome at the top of [`crate::PbSolver::solve`].

use std::fmt;

/// Early termination reasons for [`crate::PbSolver::solve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Terminated because of maximum number of solutions reached
    SolsLimit,
    /// Terminated because of maximum number of oracle calls reached
    OracleCallsLimit,
    /// Termination because of external interrupt
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::SolsLimit => {
                write!(f, "Solver terminated early because of solution limit")
            }
            Termination::OracleCallsLimit => {
                write!(f, "Solver terminated early because of oracle call limit")
            }
            Termination::Interrupted => {
                write!(f, "Solver terminated early because of interrupt signal")
            }
        }
    }
}

impl std::error::Error for Termination {}

/// Splits a termination off a result, leaving other errors untouched
pub(crate) fn split<T>(res: anyhow::Result<T>) -> anyhow::Result<Result<T, Termination>> {
    match res {
        Ok(val) => Ok(Ok(val)),
        Err(err) => match err.downcast::<Termination>() {
            Ok(term) => Ok(Err(term)),
            Err(err) => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{split, Termination};

    #[test]
    fn split_termination() {
        let res: anyhow::Result<()> = Err(Termination::SolsLimit.into());
        assert_eq!(split(res).unwrap(), Err(Termination::SolsLimit));
        let res: anyhow::Result<u32> = Ok(3);
        assert_eq!(split(res).unwrap(), Ok(3));
        let res: anyhow::Result<()> = Err(anyhow::anyhow!("oracle failed"));
        assert!(split(res).is_err());
    }
}
