//! Storage version resolution.
//!
//! Storage is read and written through load/store instructions with no SSA
//! name per write. The value a storage-derived variable refers to is
//! recovered by counting the same-slot stores that happen after the point
//! of interest and stepping back that many versions in the snapshot.
use tracing::trace;

use crate::classify::{SlotSpec, StorageOrigin, Var};
use crate::expr::SymExpr;
use crate::state::{MachineState, StorageModel};
use crate::trace::Instruction;

/// Slot index a storage origin refers to in `state`.
pub fn storage_slot(origin: StorageOrigin, state: &MachineState) -> Option<SymExpr> {
    match origin.slot() {
        SlotSpec::Concrete(index) => Some(StorageModel::slot(index)),
        SlotSpec::Register(register) => {
            let slot = state.registers().get(&register).cloned();
            if slot.is_none() {
                trace!(%register, "symbolic slot index not in register file");
            }
            slot
        }
    }
}

/// Storage value `var` was loaded from, as visible before
/// `subsequent_stores` executed.
///
/// Returns `None` when `var` is not storage-derived, its slot cannot be
/// resolved, or the slot has no write at the computed version.
pub fn resolve_storage_variable<'i, I>(
    var: &Var,
    state: &MachineState,
    subsequent_stores: I,
) -> Option<SymExpr>
where I: IntoIterator<Item = &'i Instruction> {
    let slot = storage_slot(var.storage_origin()?, state)?;

    let mut version = -1isize;
    for store in subsequent_stores {
        let target = store.argument(0).and_then(|operand| state.operand(operand));
        if target.as_ref() == Some(&slot) {
            version -= 1;
        }
    }

    let value = state.storage().get(&slot, version);
    if value.is_none() {
        trace!(%var, %slot, version, "no storage write at version");
    }
    value
}
