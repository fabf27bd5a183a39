use std::ops::ControlFlow;

use fxhash::FxHashSet as HashSet;

use thiserror::Error;

use tracing::{debug, debug_span, info};

use crate::backend::Solver;
use crate::config::{GuardConfig, Opcodes};
use crate::expr::SymExpr;
use crate::extract;
use crate::solver::{Oracle, Z3Solver};
use crate::trace::{AnalyzedBlock, Instruction, Trace, VisitArena, VisitId};
use crate::vulnerability::Vulnerability;

#[derive(Debug, Error)]
pub enum Error {
    #[error("trace references unknown block visitation {0}")]
    UnknownVisit(VisitId),
    #[error("branch at {offset:#x} has no condition operand")]
    MissingCondition { offset: u64 },
}

/// What one trace has shown so far; decides the per-trace fallback finding.
#[derive(Debug, Clone, Copy, Default)]
struct TraceAccumulator {
    examined_any_branch: bool,
    found_any_constraint: bool,
    last_branch: Option<Vulnerability>,
}

impl TraceAccumulator {
    fn examined(&mut self, site: Vulnerability) {
        self.examined_any_branch = true;
        self.last_branch = Some(site);
    }

    /// A path whose branches never touched a storage-derived guard is
    /// reported once, at its last branch.
    fn fallback(&self) -> Option<Vulnerability> {
        if self.examined_any_branch && !self.found_any_constraint {
            self.last_branch
        } else {
            None
        }
    }
}

/// Tainted-branch guard analysis over a set of traces.
///
/// Each call to [`GuardAnalysis::analyze`] owns its visited set and
/// findings; only the oracle is reused between runs.
#[derive(Debug, Clone)]
pub struct GuardAnalysis<S> {
    config: GuardConfig,
    oracle: Oracle<S>,
}

impl GuardAnalysis<Z3Solver> {
    pub fn new(config: GuardConfig) -> Self {
        Self::with_solver(config, Z3Solver::new())
    }
}

impl<S: Solver> GuardAnalysis<S> {
    pub fn with_solver(config: GuardConfig, solver: S) -> Self {
        let oracle = Oracle::new_with(solver, config.solver_timeout());
        Self { config, oracle }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn oracle(&self) -> &Oracle<S> {
        &self.oracle
    }

    pub fn into_oracle(self) -> Oracle<S> {
        self.oracle
    }

    pub fn analyze(&mut self, arena: &VisitArena, traces: &[Trace]) -> Result<HashSet<Vulnerability>, Error> {
        let opcodes = self.config.opcodes().clone();
        let find_all = self.config.find_all();

        let mut visited = HashSet::default();
        let mut findings = HashSet::default();

        for (index, trace) in traces.iter().enumerate() {
            if trace.is_reverted() {
                debug!(index, "skipping reverted trace");
                continue;
            }

            let _span = debug_span!("trace", index).entered();

            let accumulator = match self.analyze_trace(arena, trace, &opcodes, &mut visited, &mut findings)? {
                ControlFlow::Break(()) => return Ok(findings),
                ControlFlow::Continue(accumulator) => accumulator,
            };

            if let Some(site) = accumulator.fallback() {
                info!(%site, "no storage-derived guard anywhere on path");
                findings.insert(site);
                if !find_all {
                    return Ok(findings);
                }
            }
        }

        Ok(findings)
    }

    fn analyze_trace(
        &mut self,
        arena: &VisitArena,
        trace: &Trace,
        opcodes: &Opcodes,
        visited: &mut HashSet<VisitId>,
        findings: &mut HashSet<Vulnerability>,
    ) -> Result<ControlFlow<(), TraceAccumulator>, Error> {
        let mut accumulator = TraceAccumulator::default();

        for &id in trace.visits() {
            if visited.contains(&id) {
                continue;
            }

            let visit = arena.fetch(id)?;

            for branch in visit.block().find_instructions(opcodes.branch()) {
                let site = Vulnerability::at(id, branch);
                accumulator.examined(site);

                let constraints = self.guard_constraints(arena, trace, visit, branch, opcodes)?;
                if constraints.is_empty() {
                    continue;
                }

                accumulator.found_any_constraint = true;

                if extract::is_refuted(&constraints) {
                    debug!(%site, "branch guarded");
                    continue;
                }

                if self.oracle.is_satisfiable(&constraints) {
                    info!(%site, "tainted branch reachable without guard");
                    findings.insert(site);
                    if !self.config.find_all() {
                        return Ok(ControlFlow::Break(()));
                    }
                }
            }

            visited.insert(id);
        }

        Ok(ControlFlow::Continue(accumulator))
    }

    fn guard_constraints(
        &mut self,
        arena: &VisitArena,
        trace: &Trace,
        visit: &AnalyzedBlock,
        branch: &Instruction,
        opcodes: &Opcodes,
    ) -> Result<Vec<SymExpr>, Error> {
        let constraints = extract::prior_guard_constraints(trace, visit, arena, &mut self.oracle)?;
        if !constraints.is_empty() {
            return Ok(constraints);
        }

        let condition = extract::branch_condition(visit, branch)?;
        let window = extract::taint_window(visit, branch, opcodes.taint_source());

        Ok(extract::local_guard_constraints(visit, &window, condition.as_ref()))
    }
}

/// Run the analysis with the default configuration and solver backend.
pub fn analyze(arena: &VisitArena, traces: &[Trace], find_all: bool) -> Result<HashSet<Vulnerability>, Error> {
    GuardAnalysis::new(GuardConfig::default().with_find_all(find_all)).analyze(arena, traces)
}
