use std::sync::Arc;
use std::time::Duration;

use crate::solver::SOLVER_TIMEOUT;

pub const BRANCH_OPCODE: &str = "JUMPI";
pub const TAINT_SOURCE_OPCODE: &str = "ORIGIN";

/// Opcode names the analysis keys on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opcodes {
    branch: Arc<str>,
    taint_source: Arc<str>,
}

impl Default for Opcodes {
    fn default() -> Self {
        Self::new(BRANCH_OPCODE, TAINT_SOURCE_OPCODE)
    }
}

impl Opcodes {
    pub fn new<B, T>(branch: B, taint_source: T) -> Self
    where B: AsRef<str>,
          T: AsRef<str> {
        Self {
            branch: Arc::from(branch.as_ref()),
            taint_source: Arc::from(taint_source.as_ref()),
        }
    }

    /// Conditional branch whose condition is the second operand.
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Instruction producing the caller-origin identity.
    pub fn taint_source(&self) -> &str {
        &self.taint_source
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    find_all: bool,
    solver_timeout: Duration,
    opcodes: Opcodes,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            find_all: false,
            solver_timeout: SOLVER_TIMEOUT,
            opcodes: Opcodes::default(),
        }
    }
}

impl GuardConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep going after the first finding.
    pub fn with_find_all(mut self, find_all: bool) -> Self {
        self.find_all = find_all;
        self
    }

    pub fn with_solver_timeout(mut self, timeout: Duration) -> Self {
        self.solver_timeout = timeout;
        self
    }

    pub fn with_opcodes(mut self, opcodes: Opcodes) -> Self {
        self.opcodes = opcodes;
        self
    }

    pub fn find_all(&self) -> bool {
        self.find_all
    }

    pub fn solver_timeout(&self) -> Duration {
        self.solver_timeout
    }

    pub fn opcodes(&self) -> &Opcodes {
        &self.opcodes
    }
}
