/// Machine state snapshots
///
/// A snapshot is produced by the symbolic engine at each block visitation
/// and is read-only afterwards. The storage model records every write to a
/// slot in path order, so the value visible at an earlier point can be
/// recovered by walking back through a slot's versions.
use std::fmt;

use fnv::FnvHashMap;
use fxhash::FxHashMap as HashMap;

use crate::expr::SymExpr;
use crate::trace::Operand;

/// Width of storage slot indices and words.
pub const SLOT_BITS: u32 = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegisterId(pub u64);

impl fmt::Display for RegisterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Registers(HashMap<RegisterId, SymExpr>);

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, register: &RegisterId) -> Option<&SymExpr> {
        self.0.get(register)
    }

    pub fn insert(&mut self, register: RegisterId, value: SymExpr) -> Option<SymExpr> {
        self.0.insert(register, value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(RegisterId, SymExpr)> for Registers {
    fn from_iter<I: IntoIterator<Item = (RegisterId, SymExpr)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StorageModel {
    slots: FnvHashMap<SymExpr, Vec<SymExpr>>,
}

impl StorageModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a concrete slot index.
    pub fn slot(index: u128) -> SymExpr {
        SymExpr::val(index, SLOT_BITS)
    }

    pub fn write(&mut self, slot: SymExpr, value: SymExpr) {
        self.slots.entry(slot).or_default().push(value);
    }

    pub fn with_write(mut self, slot: SymExpr, value: SymExpr) -> Self {
        self.write(slot, value);
        self
    }

    /// Value of `slot` at `version`.
    ///
    /// `0` and `-1` both name the current value; each further negative step
    /// goes one write back. Positive versions are never written yet and
    /// resolve to `None`, as does a slot that was never written or a
    /// version older than its history.
    pub fn get(&self, slot: &SymExpr, version: isize) -> Option<SymExpr> {
        if version > 0 {
            return None;
        }

        let writes = self.slots.get(slot)?;
        let back = version.unsigned_abs().max(1);
        let index = writes.len().checked_sub(back)?;
        writes.get(index).cloned()
    }

    pub fn versions(&self, slot: &SymExpr) -> usize {
        self.slots.get(slot).map_or(0, Vec::len)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MachineState {
    registers: Registers,
    storage: StorageModel,
}

impl MachineState {
    pub fn new(registers: Registers, storage: StorageModel) -> Self {
        Self { registers, storage }
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn storage(&self) -> &StorageModel {
        &self.storage
    }

    /// Resolve an instruction operand through the register file.
    pub fn operand(&self, operand: &Operand) -> Option<SymExpr> {
        match operand {
            Operand::Const(value, bits) => Some(SymExpr::val(*value, *bits)),
            Operand::Register(register) => self.registers.get(register).cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_walk_back_from_most_recent() {
        let slot = StorageModel::slot(3);
        let storage = StorageModel::new()
            .with_write(slot.clone(), SymExpr::val(10, SLOT_BITS))
            .with_write(slot.clone(), SymExpr::val(20, SLOT_BITS))
            .with_write(slot.clone(), SymExpr::val(30, SLOT_BITS));

        assert_eq!(storage.versions(&slot), 3);
        assert_eq!(storage.get(&slot, -1), Some(SymExpr::val(30, SLOT_BITS)));
        assert_eq!(storage.get(&slot, -2), Some(SymExpr::val(20, SLOT_BITS)));
        assert_eq!(storage.get(&slot, -3), Some(SymExpr::val(10, SLOT_BITS)));
        assert_eq!(storage.get(&slot, -4), None);
    }

    #[test]
    fn version_zero_is_the_current_value() {
        let slot = StorageModel::slot(3);
        let storage = StorageModel::new()
            .with_write(slot.clone(), SymExpr::val(10, SLOT_BITS))
            .with_write(slot.clone(), SymExpr::val(20, SLOT_BITS));

        assert_eq!(storage.get(&slot, 0), Some(SymExpr::val(20, SLOT_BITS)));
        assert_eq!(storage.get(&slot, 0), storage.get(&slot, -1));
        assert_eq!(storage.get(&slot, 1), None);
        assert_eq!(StorageModel::new().get(&slot, 0), None);
    }

    #[test]
    fn unwritten_slots_resolve_to_nothing() {
        let storage = StorageModel::new();
        assert_eq!(storage.get(&StorageModel::slot(1), -1), None);
    }

    #[test]
    fn operands_resolve_through_registers() {
        let registers = [(RegisterId(4), SymExpr::val(9, SLOT_BITS))]
            .into_iter()
            .collect::<Registers>();
        let state = MachineState::new(registers, StorageModel::new());

        assert_eq!(
            state.operand(&Operand::Register(RegisterId(4))),
            Some(SymExpr::val(9, SLOT_BITS))
        );
        assert_eq!(state.operand(&Operand::Register(RegisterId(5))), None);
        assert_eq!(
            state.operand(&Operand::Const(1, 8)),
            Some(SymExpr::val(1, 8))
        );
    }
}
