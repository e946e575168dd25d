//! The super orchestrator: takes one incident through the specialists.
//!
//! In agentic mode a coordinator decision unit requests each step through
//! the adapter tools, and the [`Sequencer`] refuses anything out of order.
//! A refusal is fatal only while the incident is untouched; later refusals
//! are reported back to the coordinator. Steps the coordinator leaves out
//! are then run by the sequencer itself.
//! In deterministic mode the sequencer drives every step.

pub mod adapters;
pub mod pipeline;
pub mod sequencer;

use std::sync::Arc;
use std::time::Duration;

use incident_config::OrchestratorMode;
use incident_core::error::{Error, StoreError};
use incident_core::event::{DomainEvent, EventBus};
use incident_core::incident::{Incident, TriageAction};
use incident_core::order::OrderApi;
use incident_core::provider::Provider;
use incident_core::store::IncidentStore;
use incident_tools::ToolContext;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::loop_runner::{AgentLoop, AgentRun};
use crate::settings::AgentSettings;
use crate::specialists::{SpecialistEnv, ThreadedContext, json};
use pipeline::{Pipeline, StepError};
pub use sequencer::{Branch, Sequencer, Stage, Violation};

pub const COORDINATOR_NAME: &str = "SuperOrchestratorAgent";

pub const INSTRUCTIONS: &str = "\
You are the Super Orchestrator for an e-commerce incident queue.

Run the specialists for this incident by calling their tools in this exact order:
1. run_triage
2. run_ci_validation
3. run_priority_assessment
4. run_order_cancellation
5. run_resolution

Rules:
- Call one tool at a time and wait for its result.
- If run_triage returns action \"pending\", STOP. Call no further tools.
- A missing Reported CI does not stop the pipeline.
- Never repeat a step and never skip ahead.

When finished, reply with only this JSON object:
{\"incident_number\": string, \"outcome\": \"resolved\" | \"pending\",
 \"triage_action\": string, \"ci_valid\": bool | null,
 \"escalated_to_cat_a\": bool, \"order_cancelled\": bool,
 \"order_id\": string | null, \"summary\": string}";

/// Final state of an incident after one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Resolved,
    Pending,
    /// Every step ran but the incident was not resolved.
    Unresolved,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Resolved => "resolved",
            RunOutcome::Pending => "pending",
            RunOutcome::Unresolved => "unresolved",
        }
    }
}

/// The per-incident summary, built from the recorded results.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub incident_number: String,
    pub outcome: RunOutcome,
    pub triage_action: TriageAction,
    pub missing_fields: Vec<String>,
    pub ci_valid: Option<bool>,
    pub escalated_to_cat_a: bool,
    pub order_cancelled: bool,
    pub order_id: Option<String>,
    pub summary: String,
}

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationResult {
    pub incident_number: String,
    pub branch: Branch,
    pub summary: RunSummary,
    /// Specialist runs in execution order.
    pub runs: Vec<AgentRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<AgentRun>,
}

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Sequencing violation on {incident_number}: {tool_name}: {reason}")]
    SequencingViolation {
        incident_number: String,
        tool_name: String,
        reason: String,
    },

    #[error("Orchestration of {incident_number} failed: {source}")]
    Failed {
        incident_number: String,
        #[source]
        source: Error,
    },
}

impl OrchestrationError {
    pub fn incident_number(&self) -> &str {
        match self {
            OrchestrationError::SequencingViolation { incident_number, .. } => incident_number,
            OrchestrationError::Failed { incident_number, .. } => incident_number,
        }
    }

    pub fn is_violation(&self) -> bool {
        matches!(self, OrchestrationError::SequencingViolation { .. })
    }

    fn from_error(incident_number: &str, error: Error) -> Self {
        match error {
            Error::Aborted { tool_name, reason } => OrchestrationError::SequencingViolation {
                incident_number: incident_number.to_string(),
                tool_name,
                reason,
            },
            source => OrchestrationError::Failed {
                incident_number: incident_number.to_string(),
                source,
            },
        }
    }

    fn from_step(incident_number: &str, error: StepError) -> Self {
        match error {
            StepError::Refused(violation) | StepError::Declined(violation) => {
                OrchestrationError::SequencingViolation {
                    incident_number: incident_number.to_string(),
                    tool_name: violation.requested.adapter_tool().to_string(),
                    reason: violation.reason,
                }
            }
            StepError::Failed(e) => Self::from_error(incident_number, e),
        }
    }
}

/// Processes incidents one at a time. Cheap to share across tasks.
pub struct SuperOrchestrator {
    provider: Arc<dyn Provider>,
    store: Arc<dyn IncidentStore>,
    order_api: Arc<dyn OrderApi>,
    settings: Arc<AgentSettings>,
    event_bus: EventBus,
}

impl SuperOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        store: Arc<dyn IncidentStore>,
        order_api: Arc<dyn OrderApi>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            store,
            order_api,
            settings: Arc::new(settings),
            event_bus: EventBus::default(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn store(&self) -> &Arc<dyn IncidentStore> {
        &self.store
    }

    /// Fetch an incident by sys_id and process it.
    pub async fn process_by_id(&self, sys_id: &str) -> Result<OrchestrationResult, OrchestrationError> {
        let incident = self
            .store
            .get(sys_id)
            .await
            .map_err(Error::from)
            .and_then(|found| found.ok_or_else(|| Error::from(StoreError::NotFound(sys_id.to_string()))))
            .map_err(|e| self.abort(OrchestrationError::from_error(sys_id, e)))?;
        self.process(incident).await
    }

    /// Take one incident through the pipeline.
    pub async fn process(&self, incident: Incident) -> Result<OrchestrationResult, OrchestrationError> {
        let number = incident.number.clone();
        let mode = self.settings.orchestrator.mode;
        info!(incident = %number, sys_id = %incident.sys_id, ?mode, "Processing incident");

        let pipeline = Arc::new(Pipeline::new(self.specialist_env(&incident), incident.clone()));

        let coordinator = match mode {
            OrchestratorMode::Agentic => Some(self.coordinate(&pipeline, &incident).await?),
            OrchestratorMode::Deterministic => None,
        };

        if let (Some(run), Some(next)) = (&coordinator, pipeline.next_expected()) {
            warn!(
                incident = %number,
                outcome = run.outcome.label(),
                next = next.adapter_tool(),
                "Coordinator stopped early, finishing mandated steps"
            );
        }
        pipeline
            .drive_remaining()
            .await
            .map_err(|e| self.abort(OrchestrationError::from_step(&number, e)))?;

        let record = pipeline.record();
        let branch = record.sequencer.branch().ok_or_else(|| {
            self.abort(OrchestrationError::Failed {
                incident_number: number.clone(),
                source: Error::Internal("pipeline ended without a branch".into()),
            })
        })?;
        let summary = summarize(&number, branch, &record.context, coordinator.as_ref());

        info!(
            incident = %number,
            branch = branch.as_str(),
            outcome = summary.outcome.as_str(),
            steps = record.runs.len(),
            "Incident processed"
        );
        self.event_bus.publish(DomainEvent::IncidentProcessed {
            incident_number: number.clone(),
            branch: branch.as_str().to_string(),
            outcome: summary.outcome.as_str().to_string(),
            timestamp: chrono::Utc::now(),
        });

        Ok(OrchestrationResult {
            incident_number: number,
            branch,
            summary,
            runs: record.runs,
            coordinator,
        })
    }

    fn specialist_env(&self, incident: &Incident) -> SpecialistEnv {
        let policy = &self.settings.policy;
        let tools = ToolContext::new(incident.sys_id.clone(), self.store.clone(), self.order_api.clone())
            .with_engineer(policy.engineer_name.clone())
            .with_pcc_field(self.settings.pcc_field.clone())
            .with_category_a(policy.category_a.clone());
        SpecialistEnv::new(
            self.provider.clone(),
            self.settings.clone(),
            tools,
            self.event_bus.clone(),
            incident.number.clone(),
        )
    }

    async fn coordinate(
        &self,
        pipeline: &Arc<Pipeline>,
        incident: &Incident,
    ) -> Result<AgentRun, OrchestrationError> {
        let registry = adapters::registry(pipeline)
            .map_err(|e| self.abort(OrchestrationError::from_error(&incident.number, e.into())))?;
        let orchestrator = &self.settings.orchestrator;

        let agent = AgentLoop::new(
            COORDINATOR_NAME,
            self.provider.clone(),
            self.settings.models.orchestrator.clone(),
            INSTRUCTIONS,
            Arc::new(registry),
        )
        .with_temperature(self.settings.temperature)
        .with_max_tokens(orchestrator.coordinator_max_tokens)
        .with_transient_retries(orchestrator.transient_retries)
        .with_retry_backoff(Duration::from_millis(orchestrator.retry_backoff_ms))
        .with_event_bus(self.event_bus.clone());

        let task = format!(
            "Process this incident through the pipeline.\n\n{}",
            incident.render()
        );
        agent
            .run(&task)
            .await
            .map_err(|e| self.abort(OrchestrationError::from_error(&incident.number, e)))
    }

    /// Log and announce an aborted run.
    fn abort(&self, error: OrchestrationError) -> OrchestrationError {
        warn!(incident = %error.incident_number(), error = %error, "Run aborted");
        self.event_bus.publish(DomainEvent::RunAborted {
            incident_number: error.incident_number().to_string(),
            reason: error.to_string(),
            timestamp: chrono::Utc::now(),
        });
        error
    }
}

/// Build the summary from recorded results. The coordinator contributes
/// only the prose.
pub fn summarize(
    incident_number: &str,
    branch: Branch,
    ctx: &ThreadedContext,
    coordinator: Option<&AgentRun>,
) -> RunSummary {
    let resolved = ctx.resolution.as_ref().is_some_and(|r| r.resolved);
    let outcome = match branch {
        Branch::PendingStop => RunOutcome::Pending,
        Branch::FullPipeline if resolved => RunOutcome::Resolved,
        Branch::FullPipeline => RunOutcome::Unresolved,
    };
    let assessment = ctx.assessment.as_ref();

    let mut summary = RunSummary {
        incident_number: incident_number.to_string(),
        outcome,
        triage_action: assessment.map(|a| a.action()).unwrap_or(TriageAction::Pending),
        missing_fields: assessment.map(|a| a.missing_fields().to_vec()).unwrap_or_default(),
        ci_valid: ctx.ci_validation.as_ref().map(|c| c.ci_valid),
        escalated_to_cat_a: ctx.priority.as_ref().is_some_and(|p| p.escalated),
        order_cancelled: ctx.cancellation.as_ref().is_some_and(|c| c.result.success),
        order_id: assessment.and_then(|a| a.order_id()).map(String::from),
        summary: String::new(),
    };
    summary.summary = coordinator
        .and_then(|run| run.final_text())
        .and_then(json::parse_object)
        .and_then(|v| v.get("summary").and_then(|s| s.as_str()).map(String::from))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| narrative(&summary));
    summary
}

fn narrative(s: &RunSummary) -> String {
    if s.outcome == RunOutcome::Pending {
        return format!(
            "{} set to Pending; missing: {}.",
            s.incident_number,
            s.missing_fields.join(", ")
        );
    }
    let ci = match s.ci_valid {
        Some(true) => "CI present",
        _ => "CI missing (warning noted)",
    };
    let priority = if s.escalated_to_cat_a { "escalated to Category A" } else { "not escalated" };
    let order = match (&s.order_id, s.order_cancelled) {
        (Some(id), true) => format!("order {id} cancelled"),
        (Some(id), false) => format!("order {id} not cancelled"),
        (None, _) => "no order id found".to_string(),
    };
    let end = if s.outcome == RunOutcome::Resolved { "resolved" } else { "not resolved" };
    format!("{} assigned; {ci}; {priority}; {order}; {end}.", s.incident_number)
}
