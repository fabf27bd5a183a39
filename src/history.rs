use crate::analysis::Error;
use crate::expr::SymExpr;
use crate::trace::{AnalyzedBlock, Trace, VisitArena};

/// Visitation holding the path state from just before `constraint` was
/// introduced.
///
/// Walks `trace` backwards to the latest visitation whose last local
/// constraint is `constraint`, then keeps going to the first visitation
/// whose last local constraint differs. `None` means the history of
/// `constraint` is not part of this trace.
pub fn find_owning_block<'a>(
    constraint: &SymExpr,
    trace: &Trace,
    arena: &'a VisitArena,
) -> Result<Option<&'a AnalyzedBlock>, Error> {
    let mut found = false;

    for &id in trace.visits().iter().rev() {
        let visit = arena.fetch(id)?;
        let owns = visit.last_constraint() == Some(constraint);

        if found && !owns {
            return Ok(Some(visit));
        }

        found |= owns;
    }

    Ok(None)
}
