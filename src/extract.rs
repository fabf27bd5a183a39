//! Guard constraint extraction for a single conditional branch.
//!
//! Two strategies produce the constraints handed to the oracle. The prior
//! guard strategy looks at constraints the path accumulates after the
//! branch's block and asks whether a storage-derived variable in them is
//! pinned to the real storage content. The local guard strategy builds a
//! query from the block's own constraints and the branch condition.
//!
//! The outcome of either strategy is a constraint list: `[false]` means the
//! branch is protected (or the path infeasible), `[true]` means it is not,
//! and an empty list means no decision could be formed.
use std::iter;

use fxhash::FxHashSet as HashSet;

use tracing::{debug, warn};

use crate::analysis::Error;
use crate::backend::Solver;
use crate::expr::SymExpr;
use crate::history::find_owning_block;
use crate::resolve::resolve_storage_variable;
use crate::solver::Oracle;
use crate::trace::{AnalyzedBlock, Instruction, Trace, VisitArena};

/// Index of the condition among a branch's operands.
const CONDITION_OPERAND: usize = 1;

/// True for the singleton `[false]` list, which settles a branch without a
/// solver query.
pub fn is_refuted(constraints: &[SymExpr]) -> bool {
    matches!(constraints, [constraint] if constraint.is_false())
}

/// Constraints of `trace` that are not part of `visit`'s own constraints,
/// in path order.
pub fn remaining_constraints<'t>(trace: &'t Trace, visit: &AnalyzedBlock) -> Vec<&'t SymExpr> {
    let local = visit.constraints().iter().collect::<HashSet<_>>();
    trace
        .constraints()
        .iter()
        .filter(|constraint| !local.contains(constraint))
        .collect()
}

/// Prior guard resolution.
pub fn prior_guard_constraints<S: Solver>(
    trace: &Trace,
    visit: &AnalyzedBlock,
    arena: &VisitArena,
    oracle: &mut Oracle<S>,
) -> Result<Vec<SymExpr>, Error> {
    for constraint in remaining_constraints(trace, visit).into_iter().rev() {
        let owner = match find_owning_block(constraint, trace, arena)? {
            Some(owner) => owner,
            None => {
                debug!(%constraint, "constraint history not in trace");
                continue;
            }
        };

        for var in constraint.free_vars() {
            let storage = match resolve_storage_variable(&var, owner.state(), iter::empty()) {
                Some(storage) => storage,
                None => continue,
            };

            let simplified = constraint.clone().simplify();
            let diverges = SymExpr::var(var.clone()).ne(storage.clone());

            if !oracle.is_satisfiable(&[diverges]) {
                // the variable is the real storage content
                return Ok(if simplified.is_false() {
                    debug!(%constraint, "infeasible path");
                    vec![SymExpr::bool(false)]
                } else {
                    Vec::new()
                });
            }

            return Ok(if simplified.is_true() {
                debug!(%constraint, "branch protected by prior guard");
                vec![SymExpr::bool(false)]
            } else if simplified.is_false() {
                debug!(%constraint, "branch unprotected by prior guard");
                vec![SymExpr::bool(true)]
            } else {
                warn!(%constraint, %var, %storage, "unresolved symbolic guard; possible false positive");
                vec![SymExpr::bool(true)]
            });
        }
    }

    Ok(Vec::new())
}

/// Taint-source instructions after `branch` in the same block.
pub fn taint_window<'a>(
    visit: &'a AnalyzedBlock,
    branch: &Instruction,
    taint_source: &'a str,
) -> Vec<&'a Instruction> {
    visit
        .block()
        .find_instructions(taint_source)
        .filter(|insn| insn.offset() > branch.offset())
        .collect()
}

/// Condition operand of `branch`, resolved in `visit`'s state.
///
/// A branch without a condition operand is malformed input; an operand
/// whose register is not bound resolves to `None`.
pub fn branch_condition(visit: &AnalyzedBlock, branch: &Instruction) -> Result<Option<SymExpr>, Error> {
    let operand = branch
        .argument(CONDITION_OPERAND)
        .ok_or(Error::MissingCondition {
            offset: branch.offset(),
        })?;
    Ok(visit.state().operand(operand))
}

/// Local pre-branch guard construction.
pub fn local_guard_constraints(
    visit: &AnalyzedBlock,
    window: &[&Instruction],
    condition: Option<&SymExpr>,
) -> Vec<SymExpr> {
    let state = visit.state();
    let mut constraints = Vec::new();

    for constraint in visit.constraints() {
        let constraint = constraint.clone().simplify();
        for var in constraint.free_vars() {
            if let Some(storage) = resolve_storage_variable(&var, state, window.iter().copied()) {
                constraints.push(constraint.clone());
                constraints.push(SymExpr::var(var).eq(storage));
            }
        }
    }

    if let Some(condition) = condition.filter(|condition| condition.is_symbolic()) {
        if !condition.is_leaf() {
            debug!(%condition, "derived branch condition; assuming unguarded");
            constraints.push(SymExpr::bool(true));
            return constraints;
        }

        let storage = condition
            .as_var()
            .and_then(|var| resolve_storage_variable(var, state, window.iter().copied()));

        if let Some(storage) = storage {
            let zero = SymExpr::val(0, storage.bits());
            constraints.push(storage.ne(zero));
        }
    }

    constraints
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use crate::backend::SatResult;
    use crate::classify::Var;
    use crate::expr::BinRel;
    use crate::solver::Z3Solver;
    use crate::state::{MachineState, RegisterId, Registers, StorageModel, SLOT_BITS};
    use crate::trace::{BasicBlock, Operand};

    fn word(v: u128) -> SymExpr {
        SymExpr::val(v, SLOT_BITS)
    }

    fn storage_var(slot: u128) -> SymExpr {
        SymExpr::var(Var::new(format!("storage,{},con", slot), SLOT_BITS))
    }

    fn branch() -> Instruction {
        Instruction::new("JUMPI", 0x10, 4, [Operand::Const(0x40, SLOT_BITS), Operand::Register(RegisterId(0))])
    }

    fn visit(constraints: Vec<SymExpr>, condition: SymExpr, storage: StorageModel) -> AnalyzedBlock {
        let block = Arc::new(BasicBlock::new([branch()]));
        let registers = [(RegisterId(0), condition)].into_iter().collect::<Registers>();
        AnalyzedBlock::new(block, constraints, Arc::new(MachineState::new(registers, storage)))
    }

    #[test]
    fn leaf_condition_on_unwritten_slot_forms_no_decision() {
        let v = visit(vec![], storage_var(3), StorageModel::new());
        let condition = branch_condition(&v, &branch()).unwrap();
        assert!(local_guard_constraints(&v, &[], condition.as_ref()).is_empty());
    }

    #[test]
    fn leaf_condition_on_zero_slot_is_refuted() {
        let storage = StorageModel::new().with_write(StorageModel::slot(3), word(0));
        let v = visit(vec![], storage_var(3), storage);
        let condition = branch_condition(&v, &branch()).unwrap();

        let constraints = local_guard_constraints(&v, &[], condition.as_ref());
        assert_eq!(constraints, vec![SymExpr::bool(false)]);
        assert!(is_refuted(&constraints));
    }

    #[test]
    fn derived_condition_is_assumed_unguarded() {
        let derived = SymExpr::add(storage_var(3), word(1));
        let v = visit(vec![], derived, StorageModel::new());
        let condition = branch_condition(&v, &branch()).unwrap();
        assert_eq!(
            local_guard_constraints(&v, &[], condition.as_ref()),
            vec![SymExpr::bool(true)]
        );
    }

    #[test]
    fn local_constraints_are_tied_to_storage_content() {
        let origin = SymExpr::var(Var::new("origin", SLOT_BITS));
        let guard = origin.eq(storage_var(1));
        let storage = StorageModel::new().with_write(StorageModel::slot(1), word(0xabc));
        let v = visit(vec![guard.clone()], word(1), storage);

        let constraints = local_guard_constraints(&v, &[], Some(&word(1)));
        assert_eq!(constraints, vec![guard, storage_var(1).eq(word(0xabc))]);
    }

    #[test]
    fn taint_window_only_covers_later_sources() {
        let block = Arc::new(BasicBlock::new([
            Instruction::new("ORIGIN", 0x08, 2, None),
            branch(),
            Instruction::new("ORIGIN", 0x12, 5, [Operand::Const(3, SLOT_BITS)]),
        ]));
        let v = AnalyzedBlock::new(block, None, Arc::new(MachineState::default()));
        let window = taint_window(&v, &branch(), "ORIGIN");
        assert_eq!(window.iter().map(|i| i.offset()).collect::<Vec<_>>(), vec![0x12]);
    }

    #[test]
    fn window_steps_back_storage_versions() {
        let storage = StorageModel::new()
            .with_write(StorageModel::slot(3), word(0))
            .with_write(StorageModel::slot(3), word(1));
        let v = visit(vec![], storage_var(3), storage);
        let later = Instruction::new("ORIGIN", 0x12, 5, [Operand::Const(3, SLOT_BITS)]);

        assert_eq!(
            local_guard_constraints(&v, &[], Some(&storage_var(3))),
            vec![SymExpr::bool(true)]
        );
        assert_eq!(
            local_guard_constraints(&v, &[&later], Some(&storage_var(3))),
            vec![SymExpr::bool(false)]
        );
    }

    #[test]
    fn branch_without_condition_is_malformed() {
        let v = visit(vec![], word(0), StorageModel::new());
        let bare = Instruction::new("JUMPI", 0x20, 9, [Operand::Const(0x40, SLOT_BITS)]);
        assert!(matches!(
            branch_condition(&v, &bare),
            Err(Error::MissingCondition { offset: 0x20 })
        ));
    }

    struct Undecided;

    impl Solver for Undecided {
        fn check(&mut self, _constraints: &[SymExpr], _timeout: Duration) -> SatResult {
            SatResult::Unknown
        }
    }

    // v0 is the branch's own visit, v1 introduces the guard; `extra` path
    // constraints follow the guard but belong to no visit
    fn prior_with<S: Solver>(
        guard: SymExpr,
        extra: &[SymExpr],
        owner_storage: StorageModel,
        solver: S,
    ) -> Vec<SymExpr> {
        let block = Arc::new(BasicBlock::new([branch()]));
        let mut arena = VisitArena::new();
        let v0 = arena.push(AnalyzedBlock::new(
            block.clone(),
            None,
            Arc::new(MachineState::new(Registers::new(), owner_storage)),
        ));
        let v1 = arena.push(AnalyzedBlock::new(block, [guard.clone()], Arc::new(MachineState::default())));
        let trace = Trace::new([v0, v1], iter::once(guard).chain(extra.iter().cloned()));

        let mut oracle = Oracle::new(solver);
        let current = arena.get(v0).unwrap();
        prior_guard_constraints(&trace, current, &arena, &mut oracle).unwrap()
    }

    fn prior(guard: SymExpr, owner_storage: StorageModel) -> Vec<SymExpr> {
        prior_with(guard, &[], owner_storage, Z3Solver::new())
    }

    #[test]
    fn prior_guard_pinned_to_storage_is_inconclusive() {
        let s = storage_var(0);
        let guard = SymExpr::var(Var::new("origin", SLOT_BITS)).eq(s.clone());
        let storage = StorageModel::new().with_write(StorageModel::slot(0), s);
        assert!(prior(guard, storage).is_empty());
    }

    #[test]
    fn prior_guard_on_infeasible_path_is_refuted() {
        let s = storage_var(0);
        let guard = SymExpr::lift_binrel(BinRel::NEQ, s.clone(), s.clone());
        let storage = StorageModel::new().with_write(StorageModel::slot(0), s);
        assert_eq!(prior(guard, storage), vec![SymExpr::bool(false)]);
    }

    #[test]
    fn prior_guard_outcomes_when_storage_diverges() {
        let s = storage_var(0);
        let storage = || StorageModel::new().with_write(StorageModel::slot(0), word(5));

        let always = SymExpr::lift_binrel(BinRel::EQ, s.clone(), s.clone());
        assert_eq!(prior(always, storage()), vec![SymExpr::bool(false)]);

        let never = SymExpr::lift_binrel(BinRel::NEQ, s.clone(), s.clone());
        assert_eq!(prior(never, storage()), vec![SymExpr::bool(true)]);

        let symbolic = SymExpr::var(Var::new("origin", SLOT_BITS)).eq(s);
        assert_eq!(prior(symbolic, storage()), vec![SymExpr::bool(true)]);
    }

    #[test]
    fn prior_guard_against_symbolic_storage_content() {
        let s = storage_var(0);
        let owner = SymExpr::var(Var::new("owner", SLOT_BITS));
        let storage = StorageModel::new().with_write(StorageModel::slot(0), owner);

        let guard = SymExpr::var(Var::new("origin", SLOT_BITS)).eq(s);
        assert_eq!(prior(guard, storage), vec![SymExpr::bool(true)]);
    }

    #[test]
    fn prior_guard_without_storage_variables_forms_no_decision() {
        let guard = SymExpr::var(Var::new("origin", SLOT_BITS)).eq(word(1));
        assert!(prior(guard, StorageModel::new()).is_empty());
    }

    #[test]
    fn constraints_without_history_are_skipped() {
        let s = storage_var(0);
        let owner = SymExpr::var(Var::new("owner", SLOT_BITS));
        let storage = StorageModel::new()
            .with_write(StorageModel::slot(0), word(5))
            .with_write(StorageModel::slot(1), owner);

        // walked first, but no visit ends with it
        let orphan = SymExpr::var(Var::new("origin", SLOT_BITS)).eq(storage_var(1));
        let always = SymExpr::lift_binrel(BinRel::EQ, s.clone(), s);

        assert_eq!(
            prior_with(always, &[orphan], storage, Z3Solver::new()),
            vec![SymExpr::bool(false)]
        );
    }

    #[test]
    fn undecided_divergence_counts_as_pinned() {
        let s = storage_var(0);
        let storage = || StorageModel::new().with_write(StorageModel::slot(0), word(5));

        let symbolic = SymExpr::var(Var::new("origin", SLOT_BITS)).eq(s.clone());
        assert!(prior_with(symbolic, &[], storage(), Undecided).is_empty());

        let never = SymExpr::lift_binrel(BinRel::NEQ, s.clone(), s);
        assert_eq!(
            prior_with(never, &[], storage(), Undecided),
            vec![SymExpr::bool(false)]
        );
    }
}
