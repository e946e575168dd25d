//! Triage: decide between assigning the incident and parking it as pending.

use incident_core::error::Error;
use incident_core::incident::{Incident, LLMAssessment, TriageAction};
use incident_core::tool::ToolRegistry;
use incident_tools::{AssignIncidentTool, SetPendingTool, names};

use super::{SpecialistEnv, SpecialistKind, json};
use crate::loop_runner::AgentRun;

/// Recorded when the run produced neither a decision nor a parsable answer.
pub const UNAVAILABLE: &str = "triage assessment unavailable";

pub const INSTRUCTIONS: &str = "\
You are the Triage Agent for an e-commerce incident queue.

Decide whether the incident holds enough information to start work.
An incident is sufficient when it states what went wrong and identifies the
affected order or system. If it is sufficient, call assign_incident. If not,
call set_pending with the list of missing details. Call exactly one of the
two tools.

While reading the description also extract:
- order_id: the order identifier (e.g. ORD-12345), or null if none is given
- order_value: the monetary value of the order as a number, or null
- has_frustration: true if the caller expresses frustration or urgency
  (words like unacceptable, frustrated, disappointed, terrible, urgent, angry)

After the tool call, reply with only this JSON object:
{\"action\": \"assign\" | \"pending\", \"order_id\": string | null,
 \"order_value\": number | null, \"has_frustration\": bool,
 \"missing_fields\": [string], \"reasoning\": string}";

pub fn task(incident: &Incident) -> String {
    format!(
        "Triage the following incident.\n\n{}\n\nDecide, call the right tool, then return the JSON assessment.",
        incident.render()
    )
}

/// Run triage and reconcile the store with its decision.
pub async fn run(env: &SpecialistEnv, incident: &Incident) -> Result<(AgentRun, LLMAssessment), Error> {
    let kind = SpecialistKind::Triage;
    let registry = ToolRegistry::new()
        .with(Box::new(AssignIncidentTool::new(env.tools.clone())))?
        .with(Box::new(SetPendingTool::new(env.tools.clone())))?;

    let (mut run, registry) = env.execute(kind, INSTRUCTIONS, registry, &task(incident)).await?;
    let assessment = interpret(&run);

    let decided = match assessment.action() {
        TriageAction::Assign => names::ASSIGN_INCIDENT,
        TriageAction::Pending => names::SET_PENDING,
    };
    if !run.succeeded(decided) {
        let arguments = match assessment.action() {
            TriageAction::Assign => serde_json::json!({}),
            TriageAction::Pending => serde_json::json!({ "missing_fields": assessment.missing_fields() }),
        };
        env.reconcile(&registry, &mut run, decided, arguments).await;
    }

    env.complete(kind, &mut run, &assessment);
    Ok((run, assessment))
}

/// Build the assessment from the run.
///
/// The last successful state-changing call decides the action. The final
/// JSON contributes the extracted order details, and decides the action
/// only when no call succeeded.
pub fn interpret(run: &AgentRun) -> LLMAssessment {
    let answer: Option<LLMAssessment> = run.final_text().and_then(json::parse_answer);

    let evidence = run
        .executions()
        .filter(|(call, result)| {
            result.success && (call.name == names::ASSIGN_INCIDENT || call.name == names::SET_PENDING)
        })
        .last()
        .map(|(call, result)| {
            if call.name == names::ASSIGN_INCIDENT {
                LLMAssessment::assign()
            } else {
                let missing = result
                    .data
                    .as_ref()
                    .and_then(|d| d.get("missing_fields"))
                    .and_then(|v| serde_json::from_value::<Vec<String>>(v.clone()).ok())
                    .unwrap_or_default();
                LLMAssessment::pending(missing)
            }
        });

    let base = match (evidence, &answer) {
        (Some(decided), _) => decided,
        (None, Some(answer)) => LLMAssessment::new(answer.action(), answer.missing_fields().to_vec()),
        (None, None) => LLMAssessment::pending(vec![UNAVAILABLE.to_string()]),
    };

    match answer {
        Some(answer) => base
            .with_order(answer.order_id().map(String::from), answer.order_value())
            .with_frustration(answer.has_frustration())
            .with_reasoning(answer.reasoning()),
        None => base,
    }
}
