//! Shared per-incident state: the sequencer, threaded results and runs.

use std::sync::Mutex;

use incident_core::error::Error;
use incident_core::incident::Incident;
use tracing::{debug, warn};

use super::sequencer::{Sequencer, Violation};
use crate::loop_runner::AgentRun;
use crate::specialists::{self, SpecialistEnv, SpecialistKind, SpecialistOutput, ThreadedContext};

/// Why a step did not run to completion.
#[derive(Debug)]
pub enum StepError {
    /// Refused before any step wrote to the incident. Fatal to the run.
    Refused(Violation),
    /// Refused after earlier steps already wrote. The requester is told and
    /// the sequencer keeps ownership of the remaining steps.
    Declined(Violation),
    Failed(Error),
}

struct State {
    sequencer: Sequencer,
    context: ThreadedContext,
    runs: Vec<AgentRun>,
}

/// One incident's pipeline. The lock is never held across an await.
pub struct Pipeline {
    env: SpecialistEnv,
    state: Mutex<State>,
}

/// What a pipeline leaves behind.
pub struct PipelineRecord {
    pub sequencer: Sequencer,
    pub context: ThreadedContext,
    pub runs: Vec<AgentRun>,
}

impl Pipeline {
    pub fn new(env: SpecialistEnv, incident: Incident) -> Self {
        Self {
            env,
            state: Mutex::new(State {
                sequencer: Sequencer::new(),
                context: ThreadedContext::new(incident),
                runs: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means a panic elsewhere; the state is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn next_expected(&self) -> Option<SpecialistKind> {
        self.lock().sequencer.next_expected()
    }

    /// Run `kind` if the sequencer admits it, and record its result.
    pub async fn run_step(&self, kind: SpecialistKind) -> Result<SpecialistOutput, StepError> {
        let context = {
            let state = self.lock();
            if let Err(violation) = state.sequencer.admit(kind) {
                return Err(if state.sequencer.completed().is_empty() {
                    StepError::Refused(violation)
                } else {
                    warn!(
                        incident = %self.env.incident_number,
                        requested = kind.adapter_tool(),
                        reason = %violation.reason,
                        "Step request declined"
                    );
                    StepError::Declined(violation)
                });
            }
            state.context.clone()
        };

        debug!(incident = %self.env.incident_number, step = kind.name(), "Running specialist");
        let (run, output) = specialists::run_specialist(kind, &self.env, &context)
            .await
            .map_err(|e| {
                warn!(incident = %self.env.incident_number, step = kind.name(), error = %e, "Specialist failed");
                StepError::Failed(e)
            })?;

        let mut state = self.lock();
        state.sequencer.complete(kind, output.halts_pipeline());
        state.context.record(output.clone());
        state.runs.push(run);
        Ok(output)
    }

    /// Run every step the sequencer still expects.
    pub async fn drive_remaining(&self) -> Result<(), StepError> {
        while let Some(kind) = self.next_expected() {
            self.run_step(kind).await?;
        }
        Ok(())
    }

    pub fn record(&self) -> PipelineRecord {
        let state = self.lock();
        PipelineRecord {
            sequencer: state.sequencer.clone(),
            context: state.context.clone(),
            runs: state.runs.clone(),
        }
    }
}
