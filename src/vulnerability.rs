use std::fmt;

use crate::trace::{Instruction, VisitId};

/// Kind tag of findings reported by the guard analysis.
pub const TX_ORIGIN_VULN: &str = "tx.origin";

/// A branch reachable without an effective storage-derived guard.
///
/// Equality covers exactly the kind, visitation, and both offsets, so the
/// same branch reported by overlapping traces collapses into one finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vulnerability {
    kind: &'static str,
    visit: VisitId,
    offset: u64,
    instruction_offset: u64,
}

impl fmt::Display for Vulnerability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {:#x} (instruction {}, {})",
            self.kind, self.offset, self.instruction_offset, self.visit
        )
    }
}

impl Vulnerability {
    pub fn new(kind: &'static str, visit: VisitId, offset: u64, instruction_offset: u64) -> Self {
        Self {
            kind,
            visit,
            offset,
            instruction_offset,
        }
    }

    pub(crate) fn at(visit: VisitId, branch: &Instruction) -> Self {
        Self::new(TX_ORIGIN_VULN, visit, branch.offset(), branch.instruction_offset())
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn visit(&self) -> VisitId {
        self.visit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn instruction_offset(&self) -> u64 {
        self.instruction_offset
    }
}
