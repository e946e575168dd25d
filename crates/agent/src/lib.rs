//! The dispatch engine.
//!
//! Every agent follows the same **Request → Tools → Observe** cycle:
//!
//! 1. **Send** instructions, tool schemas and the conversation to the decision unit
//! 2. **If tool calls**: execute them in order, append each result, loop back
//! 3. **If text**: the loop is complete
//!
//! Five specialists (triage, CI validation, priority, order cancellation,
//! resolution) are each one such loop over a closed tool set. The super
//! orchestrator is a loop whose tools are the specialists, policed by a
//! sequencer that only admits the mandated order.

pub mod loop_runner;
pub mod orchestrator;
pub mod policy;
pub mod settings;
pub mod specialists;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::{AgentLoop, AgentRun, AgentTurn, LoopOutcome};
pub use orchestrator::{
    Branch, OrchestrationError, OrchestrationResult, RunOutcome, RunSummary, SuperOrchestrator,
};
pub use settings::AgentSettings;
pub use specialists::{SpecialistKind, SpecialistOutput, ThreadedContext};
