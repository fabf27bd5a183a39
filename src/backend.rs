use std::time::Duration;

use crate::expr::SymExpr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SatResult {
    Sat,
    Unsat,
    /// The backend gave up, either on timeout or on an unsupported theory.
    Unknown,
}

/// Seam to the external satisfiability engine.
///
/// `check` decides the conjunction of `constraints` within `timeout`. A
/// backend must never block past its timeout; when it cannot decide it
/// answers [`SatResult::Unknown`].
pub trait Solver {
    fn check(&mut self, constraints: &[SymExpr], timeout: Duration) -> SatResult;
}

impl<S: Solver + ?Sized> Solver for &mut S {
    fn check(&mut self, constraints: &[SymExpr], timeout: Duration) -> SatResult {
        (**self).check(constraints, timeout)
    }
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn check(&mut self, constraints: &[SymExpr], timeout: Duration) -> SatResult {
        (**self).check(constraints, timeout)
    }
}
