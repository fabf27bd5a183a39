pub mod analysis;
pub mod backend;
pub mod classify;
pub mod config;
pub mod expr;
pub mod extract;
pub mod history;
pub mod resolve;
pub mod solver;
pub mod state;
pub mod trace;
pub mod vulnerability;

pub use analysis::{analyze, Error, GuardAnalysis};
pub use backend::{SatResult, Solver};
pub use classify::{StorageOrigin, Var, VarOrigin};
pub use config::{GuardConfig, Opcodes};
pub use expr::SymExpr;
pub use solver::{Oracle, PropagatingSolver, Z3Solver};
pub use state::{MachineState, RegisterId, Registers, StorageModel};
pub use trace::{AnalyzedBlock, BasicBlock, Instruction, Operand, Trace, VisitArena, VisitId};
pub use vulnerability::{Vulnerability, TX_ORIGIN_VULN};
