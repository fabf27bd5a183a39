//! Storage-origin metadata for symbolic variables.
//!
//! The symbolic engine names a value loaded from persistent storage
//! `storage,<slot>,<con|sym>`. The name is decoded once, when the variable is
//! created, into a [`VarOrigin`]; the rest of the crate only sees typed data.
use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::expr::SymExpr;
use crate::state::RegisterId;

const STORAGE_TAG: &str = "storage";
const CONCRETE_TAG: &str = "con";
const SYMBOLIC_TAG: &str = "sym";

/// Where the index of a storage slot comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SlotSpec {
    Concrete(u128),
    /// The slot index is itself symbolic and lives in this register.
    Register(RegisterId),
}

impl SlotSpec {
    pub fn is_symbolic(&self) -> bool {
        matches!(self, SlotSpec::Register(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorageOrigin {
    slot: SlotSpec,
}

impl StorageOrigin {
    pub fn new(slot: SlotSpec) -> Self {
        Self { slot }
    }

    pub fn slot(&self) -> SlotSpec {
        self.slot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarOrigin {
    Storage(StorageOrigin),
    Free,
}

impl VarOrigin {
    /// Decode the lifter's naming contract. Anything that is not a well-formed
    /// storage name is an unrelated symbol.
    pub fn decode(name: &str) -> VarOrigin {
        let mut fields = name.split(',');
        if fields.next() != Some(STORAGE_TAG) {
            return VarOrigin::Free;
        }

        let (slot, tag) = match (fields.next(), fields.next()) {
            (Some(slot), Some(tag)) => (slot, tag),
            _ => {
                trace!(name, "storage variable without slot metadata");
                return VarOrigin::Free;
            }
        };

        let index = match slot.parse::<u128>() {
            Ok(index) => index,
            Err(_) => {
                trace!(name, "storage variable with malformed slot");
                return VarOrigin::Free;
            }
        };

        let slot = match tag {
            CONCRETE_TAG => SlotSpec::Concrete(index),
            SYMBOLIC_TAG => match u64::try_from(index) {
                Ok(register) => SlotSpec::Register(RegisterId(register)),
                Err(_) => return VarOrigin::Free,
            },
            _ => {
                trace!(name, tag, "storage variable with unknown slot kind");
                return VarOrigin::Free;
            }
        };

        VarOrigin::Storage(StorageOrigin::new(slot))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    name: Arc<str>,
    bits: u32,
    origin: VarOrigin,
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Var {
    pub fn new<S: AsRef<str>>(name: S, bits: u32) -> Self {
        let name = name.as_ref();
        Self {
            origin: VarOrigin::decode(name),
            name: Arc::from(name),
            bits,
        }
    }

    /// A variable loaded from `slot`, named the way the symbolic engine names it.
    pub fn storage(slot: SlotSpec, bits: u32) -> Self {
        let name = match slot {
            SlotSpec::Concrete(index) => format!("{},{},{}", STORAGE_TAG, index, CONCRETE_TAG),
            SlotSpec::Register(RegisterId(register)) => {
                format!("{},{},{}", STORAGE_TAG, register, SYMBOLIC_TAG)
            }
        };

        Self {
            name: Arc::from(name),
            bits,
            origin: VarOrigin::Storage(StorageOrigin::new(slot)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn origin(&self) -> VarOrigin {
        self.origin
    }

    pub fn storage_origin(&self) -> Option<StorageOrigin> {
        match self.origin {
            VarOrigin::Storage(origin) => Some(origin),
            VarOrigin::Free => None,
        }
    }
}

/// Storage origin of a value, if it is a variable loaded from storage.
pub fn storage_origin(value: &SymExpr) -> Option<StorageOrigin> {
    value.as_var().and_then(Var::storage_origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_concrete_storage_names() {
        let var = Var::new("storage,3,con", 256);
        assert_eq!(
            var.storage_origin(),
            Some(StorageOrigin::new(SlotSpec::Concrete(3)))
        );
        assert!(!var.storage_origin().unwrap().slot().is_symbolic());
    }

    #[test]
    fn decodes_symbolic_storage_names() {
        let var = Var::new("storage,7,sym", 256);
        assert_eq!(
            var.storage_origin().map(|o| o.slot()),
            Some(SlotSpec::Register(RegisterId(7)))
        );
    }

    #[test]
    fn unrelated_and_malformed_names_are_free() {
        for name in ["origin", "storagex,1,con", "storage", "storage,abc,con", "storage,1,maybe"] {
            assert_eq!(Var::new(name, 256).origin(), VarOrigin::Free, "{}", name);
        }
    }

    #[test]
    fn storage_constructor_matches_naming_contract() {
        let var = Var::storage(SlotSpec::Register(RegisterId(2)), 256);
        assert_eq!(var.name(), "storage,2,sym");
        assert_eq!(var, Var::new("storage,2,sym", 256));
    }

    #[test]
    fn only_leaf_variables_carry_origin() {
        let var = SymExpr::var(Var::new("storage,1,con", 256));
        assert!(storage_origin(&var).is_some());

        let derived = SymExpr::add(var, SymExpr::val(1, 256));
        assert!(storage_origin(&derived).is_none());
    }
}
