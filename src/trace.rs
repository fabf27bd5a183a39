use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::analysis::Error;
use crate::expr::SymExpr;
use crate::state::{MachineState, RegisterId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Const(u128, u32), // value, bits
    Register(RegisterId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: Arc<str>,
    offset: u64,
    instruction_offset: u64,
    arguments: SmallVec<[Operand; 4]>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}: {}", self.offset, self.opcode)
    }
}

impl Instruction {
    pub fn new<S, I>(opcode: S, offset: u64, instruction_offset: u64, arguments: I) -> Self
    where S: AsRef<str>,
          I: IntoIterator<Item = Operand> {
        Self {
            opcode: Arc::from(opcode.as_ref()),
            offset,
            instruction_offset,
            arguments: arguments.into_iter().collect(),
        }
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    /// Byte offset of the instruction in the code.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Index of the instruction in the raw instruction stream.
    pub fn instruction_offset(&self) -> u64 {
        self.instruction_offset
    }

    pub fn arguments(&self) -> &[Operand] {
        &self.arguments
    }

    pub fn argument(&self, index: usize) -> Option<&Operand> {
        self.arguments.get(index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicBlock {
    instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn new<I: IntoIterator<Item = Instruction>>(instructions: I) -> Self {
        Self {
            instructions: instructions.into_iter().collect(),
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn find_instructions<'a>(&'a self, opcode: &'a str) -> impl Iterator<Item = &'a Instruction> + 'a {
        self.instructions.iter().filter(move |insn| insn.opcode() == opcode)
    }
}

/// Identity of one block visitation: its index in the owning [`VisitArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VisitId(usize);

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "visit#{}", self.0)
    }
}

impl VisitId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

/// One visitation of a basic block along a path.
#[derive(Debug, Clone)]
pub struct AnalyzedBlock {
    block: Arc<BasicBlock>,
    constraints: Vec<SymExpr>,
    state: Arc<MachineState>,
}

impl AnalyzedBlock {
    pub fn new<I>(block: Arc<BasicBlock>, constraints: I, state: Arc<MachineState>) -> Self
    where I: IntoIterator<Item = SymExpr> {
        Self {
            block,
            constraints: constraints.into_iter().collect(),
            state,
        }
    }

    pub fn block(&self) -> &BasicBlock {
        &self.block
    }

    /// Constraints accumulated on the path up to and including this visit.
    pub fn constraints(&self) -> &[SymExpr] {
        &self.constraints
    }

    pub fn last_constraint(&self) -> Option<&SymExpr> {
        self.constraints.last()
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }
}

#[derive(Debug, Clone, Default)]
pub struct VisitArena {
    visits: Vec<AnalyzedBlock>,
}

impl VisitArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, visit: AnalyzedBlock) -> VisitId {
        let id = VisitId(self.visits.len());
        self.visits.push(visit);
        id
    }

    pub fn get(&self, id: VisitId) -> Option<&AnalyzedBlock> {
        self.visits.get(id.0)
    }

    pub(crate) fn fetch(&self, id: VisitId) -> Result<&AnalyzedBlock, Error> {
        self.get(id).ok_or(Error::UnknownVisit(id))
    }

    pub fn len(&self) -> usize {
        self.visits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.visits.is_empty()
    }
}

/// A complete path through the program.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    reverted: bool,
    visits: Vec<VisitId>,
    constraints: Vec<SymExpr>,
}

impl Trace {
    pub fn new<V, C>(visits: V, constraints: C) -> Self
    where V: IntoIterator<Item = VisitId>,
          C: IntoIterator<Item = SymExpr> {
        Self {
            reverted: false,
            visits: visits.into_iter().collect(),
            constraints: constraints.into_iter().collect(),
        }
    }

    pub fn with_reverted(mut self, reverted: bool) -> Self {
        self.reverted = reverted;
        self
    }

    pub fn is_reverted(&self) -> bool {
        self.reverted
    }

    /// Visitations in path order.
    pub fn visits(&self) -> &[VisitId] {
        &self.visits
    }

    /// Every path constraint, in traversal order.
    pub fn constraints(&self) -> &[SymExpr] {
        &self.constraints
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_ids_are_stable_identities() {
        let block = Arc::new(BasicBlock::default());
        let state = Arc::new(MachineState::default());

        let mut arena = VisitArena::new();
        let a = arena.push(AnalyzedBlock::new(block.clone(), None, state.clone()));
        let b = arena.push(AnalyzedBlock::new(block, None, state));

        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert!(arena.get(a).is_some());
        assert!(matches!(
            arena.fetch(VisitId(9)),
            Err(Error::UnknownVisit(VisitId(9)))
        ));
    }

    #[test]
    fn finds_instructions_by_opcode() {
        let block = BasicBlock::new([
            Instruction::new("ORIGIN", 0, 0, None),
            Instruction::new("JUMPI", 1, 1, [Operand::Const(0x10, 256), Operand::Register(RegisterId(0))]),
            Instruction::new("ORIGIN", 2, 2, None),
        ]);

        let offsets = block.find_instructions("ORIGIN").map(Instruction::offset).collect::<Vec<_>>();
        assert_eq!(offsets, vec![0, 2]);
        assert_eq!(block.instructions()[1].argument(1), Some(&Operand::Register(RegisterId(0))));
    }
}
