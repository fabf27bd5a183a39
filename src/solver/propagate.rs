use std::time::Duration;

use fnv::{FnvHashMap as HashMap, FnvHashSet as HashSet};

use crate::backend::{SatResult, Solver};
use crate::classify::Var;
use crate::expr::{mask, BinRel, Expr, SymExpr};

/// Dependency-free backend deciding what constant propagation can decide.
///
/// `var == constant` constraints are substituted through the conjunction
/// until nothing changes. The query is `Unsat` if any constraint folds to
/// `false`, `Sat` if every constraint folds to `true` or is a disequality
/// between a variable and a constant that leaves the variable some value.
/// Anything else is `Unknown`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropagatingSolver;

impl PropagatingSolver {
    pub fn new() -> Self {
        Self
    }
}

fn binding(constraint: &SymExpr) -> Option<(&Var, &SymExpr)> {
    if let Expr::BinRel(BinRel::EQ, l, r) = &**constraint {
        match (l.as_var(), r.as_var()) {
            (Some(var), None) if r.is_concrete() => Some((var, r)),
            (None, Some(var)) if l.is_concrete() => Some((var, l)),
            _ => None,
        }
    } else {
        None
    }
}

fn exclusion(constraint: &SymExpr) -> Option<(&Var, u128)> {
    if let Expr::BinRel(BinRel::NEQ, l, r) = &**constraint {
        match (l.as_var(), r.as_var()) {
            (Some(var), None) => r.as_u128().map(|v| (var, v)),
            (None, Some(var)) => l.as_u128().map(|v| (var, v)),
            _ => None,
        }
    } else {
        None
    }
}

impl Solver for PropagatingSolver {
    fn check(&mut self, constraints: &[SymExpr], _timeout: Duration) -> SatResult {
        let mut bindings = HashMap::<Var, SymExpr>::default();
        let mut pending = constraints
            .iter()
            .map(|c| c.clone().truthy().simplify())
            .collect::<Vec<_>>();

        loop {
            let mut changed = false;
            for constraint in pending.iter() {
                if let Some((var, value)) = binding(constraint) {
                    if !bindings.contains_key(var) {
                        bindings.insert(var.clone(), value.clone());
                        changed = true;
                    }
                }
            }

            pending = pending.iter().map(|c| c.substitute(&bindings)).collect();

            if pending.iter().any(SymExpr::is_false) {
                return SatResult::Unsat;
            }

            pending.retain(|c| !c.is_true());

            if pending.is_empty() {
                return SatResult::Sat;
            }

            if !changed {
                break;
            }
        }

        let mut excluded = HashMap::<&Var, HashSet<u128>>::default();
        for constraint in pending.iter() {
            match exclusion(constraint) {
                Some((var, value)) => {
                    excluded.entry(var).or_default().insert(value);
                }
                None => return SatResult::Unknown,
            }
        }

        let has_room = excluded.iter().all(|(var, values)| {
            var.bits() > 128 || (values.len() as u128) <= mask(var.bits())
        });

        if has_room {
            SatResult::Sat
        } else {
            SatResult::Unsat
        }
    }
}
