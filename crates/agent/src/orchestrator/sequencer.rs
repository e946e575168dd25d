//! The state machine that polices specialist order.

use serde::Serialize;

use crate::policy;
use crate::specialists::SpecialistKind;

/// Where a run stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    /// The named specialist is the last one that completed.
    After(SpecialistKind),
    PendingStop,
    Done,
}

/// Which branch a finished run took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    FullPipeline,
    PendingStop,
}

impl Branch {
    pub fn as_str(self) -> &'static str {
        match self {
            Branch::FullPipeline => "full_pipeline",
            Branch::PendingStop => "pending_stop",
        }
    }
}

/// A request the sequencer refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub requested: SpecialistKind,
    pub reason: String,
}

/// Accepts specialist steps only in pipeline order.
#[derive(Debug, Clone, Default)]
pub struct Sequencer {
    completed: Vec<SpecialistKind>,
    halted: bool,
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// The step that must run next, if any.
    pub fn next_expected(&self) -> Option<SpecialistKind> {
        if self.halted {
            return None;
        }
        policy::PIPELINE.get(self.completed.len()).copied()
    }

    /// Check that `kind` may run now.
    pub fn admit(&self, kind: SpecialistKind) -> Result<(), Violation> {
        let refuse = |reason: String| {
            Err(Violation {
                requested: kind,
                reason,
            })
        };
        if self.halted {
            return refuse(format!(
                "{} requested after triage set the incident to pending",
                kind.adapter_tool()
            ));
        }
        if self.completed.contains(&kind) {
            return refuse(format!("{} already ran for this incident", kind.adapter_tool()));
        }
        match self.next_expected() {
            Some(expected) if expected == kind => Ok(()),
            Some(expected) => refuse(format!(
                "{} requested but the next step is {}",
                kind.adapter_tool(),
                expected.adapter_tool()
            )),
            None => refuse(format!("{} requested after the pipeline finished", kind.adapter_tool())),
        }
    }

    /// Record a finished step. `halts` ends the pipeline here.
    pub fn complete(&mut self, kind: SpecialistKind, halts: bool) {
        self.completed.push(kind);
        if halts {
            self.halted = true;
        }
    }

    pub fn completed(&self) -> &[SpecialistKind] {
        &self.completed
    }

    pub fn stage(&self) -> Stage {
        if self.halted {
            return Stage::PendingStop;
        }
        match self.completed.last() {
            None => Stage::Start,
            Some(_) if self.next_expected().is_none() => Stage::Done,
            Some(last) => Stage::After(*last),
        }
    }

    /// The branch, once no further step is expected.
    pub fn branch(&self) -> Option<Branch> {
        match self.stage() {
            Stage::PendingStop => Some(Branch::PendingStop),
            Stage::Done => Some(Branch::FullPipeline),
            _ => None,
        }
    }
}
