//! Specialists: single-purpose agents, each bound to a closed tool set.
//!
//! A specialist is an [`AgentLoop`] with fixed instructions, a task built
//! from the incident and earlier results, and a post-processing step that
//! turns the run into a typed result. When the decision unit states a
//! mandated decision without making the matching call, the specialist makes
//! the call itself afterwards (recorded in [`AgentRun::reconciled`]).

pub mod ci_validation;
pub mod json;
pub mod order_cancellation;
pub mod priority;
pub mod resolution;
pub mod triage;

use std::sync::Arc;
use std::time::Duration;

use incident_config::ModelsConfig;
use incident_core::error::Error;
use incident_core::event::{DomainEvent, EventBus};
use incident_core::incident::{Incident, LLMAssessment};
use incident_core::provider::Provider;
use incident_core::tool::{ToolCall, ToolRegistry, ToolResult};
use incident_tools::{ToolContext, names};
use serde::Serialize;
use tracing::{info, warn};

use crate::loop_runner::{AgentLoop, AgentRun, reconcile_call_id};
use crate::policy;
use crate::settings::AgentSettings;

pub use ci_validation::CiValidation;
pub use order_cancellation::OrderCancellation;
pub use priority::PriorityAssessment;
pub use resolution::Resolution;

/// The five specialists, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    Triage,
    CiValidation,
    Priority,
    OrderCancellation,
    Resolution,
}

impl SpecialistKind {
    /// Agent name used in logs, events and work notes.
    pub fn name(self) -> &'static str {
        match self {
            SpecialistKind::Triage => "TriageAgent",
            SpecialistKind::CiValidation => "CIValidationAgent",
            SpecialistKind::Priority => "PriorityAgent",
            SpecialistKind::OrderCancellation => "OrderCancellationAgent",
            SpecialistKind::Resolution => "ResolutionAgent",
        }
    }

    /// Name of the tool the super orchestrator requests to run this step.
    pub fn adapter_tool(self) -> &'static str {
        match self {
            SpecialistKind::Triage => "run_triage",
            SpecialistKind::CiValidation => "run_ci_validation",
            SpecialistKind::Priority => "run_priority_assessment",
            SpecialistKind::OrderCancellation => "run_order_cancellation",
            SpecialistKind::Resolution => "run_resolution",
        }
    }

    pub fn from_adapter_tool(name: &str) -> Option<Self> {
        policy::PIPELINE
            .into_iter()
            .find(|kind| kind.adapter_tool() == name)
    }

    /// The exact tool set this specialist is bound to.
    pub fn tools(self) -> &'static [&'static str] {
        match self {
            SpecialistKind::Triage => &[names::ASSIGN_INCIDENT, names::SET_PENDING],
            SpecialistKind::CiValidation => &[names::ADD_WORK_NOTE],
            SpecialistKind::Priority => &[names::SET_PRIORITY_CODE, names::ADD_WORK_NOTE],
            SpecialistKind::OrderCancellation => &[names::CANCEL_ORDER, names::ADD_WORK_NOTE],
            SpecialistKind::Resolution => &[names::RESOLVE_INCIDENT],
        }
    }

    pub fn model(self, models: &ModelsConfig) -> &str {
        match self {
            SpecialistKind::Triage => &models.triage,
            SpecialistKind::CiValidation => &models.ci_validation,
            SpecialistKind::Priority => &models.priority,
            SpecialistKind::OrderCancellation => &models.order_cancellation,
            SpecialistKind::Resolution => &models.resolution,
        }
    }
}

impl std::fmt::Display for SpecialistKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a specialist needs to run against one incident.
#[derive(Clone)]
pub struct SpecialistEnv {
    pub provider: Arc<dyn Provider>,
    pub settings: Arc<AgentSettings>,
    pub tools: ToolContext,
    pub event_bus: EventBus,
    pub incident_number: String,
}

impl SpecialistEnv {
    pub fn new(
        provider: Arc<dyn Provider>,
        settings: Arc<AgentSettings>,
        tools: ToolContext,
        event_bus: EventBus,
        incident_number: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            settings,
            tools,
            event_bus,
            incident_number: incident_number.into(),
        }
    }

    /// Run the loop for `kind` with `registry`, which must bind exactly the
    /// specialist's tool set.
    pub(crate) async fn execute(
        &self,
        kind: SpecialistKind,
        instructions: &str,
        registry: ToolRegistry,
        task: &str,
    ) -> Result<(AgentRun, Arc<ToolRegistry>), Error> {
        registry
            .ensure_exact(kind.tools())
            .map_err(|message| Error::Config {
                message: format!("{kind}: {message}"),
            })?;
        let registry = Arc::new(registry);
        let orchestrator = &self.settings.orchestrator;

        let agent = AgentLoop::new(
            kind.name(),
            self.provider.clone(),
            kind.model(&self.settings.models),
            instructions,
            registry.clone(),
        )
        .with_temperature(self.settings.temperature)
        .with_max_tokens(orchestrator.specialist_max_tokens)
        .with_transient_retries(orchestrator.transient_retries)
        .with_retry_backoff(Duration::from_millis(orchestrator.retry_backoff_ms))
        .with_event_bus(self.event_bus.clone());

        let run = agent.run(task).await?;
        Ok((run, registry))
    }

    /// Make a mandated call the decision unit left out.
    pub(crate) async fn reconcile(
        &self,
        registry: &ToolRegistry,
        run: &mut AgentRun,
        tool: &str,
        arguments: serde_json::Value,
    ) {
        let call = ToolCall {
            id: reconcile_call_id(tool),
            name: tool.to_string(),
            arguments,
        };
        let result = match registry.execute(&call).await {
            Ok(result) => {
                info!(
                    incident = %self.incident_number,
                    agent = %run.agent,
                    tool,
                    "Applied mandated call after loop"
                );
                result
            }
            Err(e) => {
                warn!(
                    incident = %self.incident_number,
                    agent = %run.agent,
                    tool,
                    error = %e,
                    "Mandated call failed"
                );
                ToolResult::failure(&call.id, &e)
            }
        };
        run.reconciled.push(result);
    }

    /// Attach the structured result to `run` and announce completion.
    pub(crate) fn complete<T: Serialize>(&self, kind: SpecialistKind, run: &mut AgentRun, output: &T) {
        run.structured = serde_json::to_value(output).ok();
        info!(
            incident = %self.incident_number,
            agent = kind.name(),
            outcome = run.outcome.label(),
            iterations = run.iterations,
            "Specialist finished"
        );
        self.event_bus.publish(DomainEvent::SpecialistCompleted {
            incident_number: self.incident_number.clone(),
            agent: kind.name().to_string(),
            outcome: run.outcome.label().to_string(),
            iterations: run.iterations,
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Results threaded from earlier specialists into later ones.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadedContext {
    pub incident: Incident,
    pub assessment: Option<LLMAssessment>,
    pub ci_validation: Option<CiValidation>,
    pub priority: Option<PriorityAssessment>,
    pub cancellation: Option<OrderCancellation>,
    pub resolution: Option<Resolution>,
}

impl ThreadedContext {
    pub fn new(incident: Incident) -> Self {
        Self {
            incident,
            assessment: None,
            ci_validation: None,
            priority: None,
            cancellation: None,
            resolution: None,
        }
    }

    pub fn record(&mut self, output: SpecialistOutput) {
        match output {
            SpecialistOutput::Triage(a) => self.assessment = Some(a),
            SpecialistOutput::CiValidation(c) => self.ci_validation = Some(c),
            SpecialistOutput::Priority(p) => self.priority = Some(p),
            SpecialistOutput::OrderCancellation(c) => self.cancellation = Some(c),
            SpecialistOutput::Resolution(r) => self.resolution = Some(r),
        }
    }
}

/// The typed result of one specialist.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SpecialistOutput {
    Triage(LLMAssessment),
    CiValidation(CiValidation),
    Priority(PriorityAssessment),
    OrderCancellation(OrderCancellation),
    Resolution(Resolution),
}

impl SpecialistOutput {
    pub fn kind(&self) -> SpecialistKind {
        match self {
            SpecialistOutput::Triage(_) => SpecialistKind::Triage,
            SpecialistOutput::CiValidation(_) => SpecialistKind::CiValidation,
            SpecialistOutput::Priority(_) => SpecialistKind::Priority,
            SpecialistOutput::OrderCancellation(_) => SpecialistKind::OrderCancellation,
            SpecialistOutput::Resolution(_) => SpecialistKind::Resolution,
        }
    }

    /// Whether this result ends the pipeline early.
    pub fn halts_pipeline(&self) -> bool {
        match self {
            SpecialistOutput::Triage(a) => a.is_pending() && policy::PENDING_STOPS_PIPELINE,
            SpecialistOutput::CiValidation(c) => {
                !c.ci_valid && policy::CI_VALIDATION_BLOCKS_PIPELINE
            }
            _ => false,
        }
    }

    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Run one specialist against the threaded context.
pub async fn run_specialist(
    kind: SpecialistKind,
    env: &SpecialistEnv,
    ctx: &ThreadedContext,
) -> Result<(AgentRun, SpecialistOutput), Error> {
    Ok(match kind {
        SpecialistKind::Triage => {
            let (run, out) = triage::run(env, &ctx.incident).await?;
            (run, SpecialistOutput::Triage(out))
        }
        SpecialistKind::CiValidation => {
            let (run, out) = ci_validation::run(env, &ctx.incident).await?;
            (run, SpecialistOutput::CiValidation(out))
        }
        SpecialistKind::Priority => {
            let (run, out) = priority::run(env, &ctx.incident, ctx.assessment.as_ref()).await?;
            (run, SpecialistOutput::Priority(out))
        }
        SpecialistKind::OrderCancellation => {
            let order_id = ctx.assessment.as_ref().and_then(|a| a.order_id());
            let (run, out) = order_cancellation::run(env, &ctx.incident, order_id).await?;
            (run, SpecialistOutput::OrderCancellation(out))
        }
        SpecialistKind::Resolution => {
            let (run, out) = resolution::run(env, ctx).await?;
            (run, SpecialistOutput::Resolution(out))
        }
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use incident_clients::{InMemoryIncidentStore, StubOrderApi};

    pub fn incident() -> Incident {
        Incident::new(
            "sys-1",
            "INC0010001",
            "Cancel order ORD-12345",
            "Customer wants order ORD-12345 ($7,500) cancelled. This is unacceptable!",
        )
        .with_reported_ci("Order Service")
    }

    pub fn env(
        provider: &ScriptedProvider,
        store: &InMemoryIncidentStore,
        orders: &StubOrderApi,
    ) -> SpecialistEnv {
        let settings = AgentSettings::default();
        let tools = ToolContext::new("sys-1", Arc::new(store.clone()), Arc::new(orders.clone()))
            .with_engineer(settings.policy.engineer_name.clone())
            .with_pcc_field(settings.pcc_field.clone())
            .with_category_a(settings.policy.category_a.clone());
        let mut settings = settings;
        settings.orchestrator.retry_backoff_ms = 1;
        SpecialistEnv::new(
            Arc::new(provider.clone()),
            Arc::new(settings),
            tools,
            EventBus::default(),
            "INC0010001",
        )
    }

    pub fn model(kind: SpecialistKind) -> String {
        kind.model(&AgentSettings::default().models).to_string()
    }
}
