use std::time::Duration;

use tracing::{debug, trace};

use crate::backend::{SatResult, Solver};
use crate::expr::SymExpr;

pub mod propagate;
pub mod z3;

pub use self::propagate::PropagatingSolver;
pub use self::z3::Z3Solver;

pub const SOLVER_TIMEOUT: Duration = Duration::from_secs(5);

/// Bounded-time satisfiability oracle over a [`Solver`] backend.
///
/// Every query runs under the same timeout. Anything other than a definite
/// `Sat` counts as unsatisfiable, so a timeout can only hide a finding and
/// never invent one.
#[derive(Debug, Clone)]
pub struct Oracle<S> {
    solver: S,
    timeout: Duration,
}

impl<S: Solver> Oracle<S> {
    pub fn new(solver: S) -> Self {
        Self::new_with(solver, SOLVER_TIMEOUT)
    }

    pub fn new_with(solver: S, timeout: Duration) -> Self {
        Self { solver, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut S {
        &mut self.solver
    }

    pub fn into_inner(self) -> S {
        self.solver
    }

    pub fn is_satisfiable(&mut self, constraints: &[SymExpr]) -> bool {
        constraints.is_empty() || {
            let result = self.solver.check(constraints, self.timeout);
            trace!(?result, constraints = constraints.len(), "solver query");

            if result == SatResult::Unknown {
                debug!(timeout = ?self.timeout, "solver undecided; assuming unsatisfiable");
            }

            result == SatResult::Sat
        }
    }
}
