//! Priority assessment: escalate high-value orders from frustrated callers.

use incident_core::error::Error;
use incident_core::incident::{Incident, LLMAssessment};
use incident_core::tool::ToolRegistry;
use incident_tools::{AddWorkNoteTool, SetPriorityCodeTool, names};
use serde::{Deserialize, Serialize};

use super::{SpecialistEnv, SpecialistKind};
use crate::loop_runner::AgentRun;
use crate::policy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityAssessment {
    pub criteria_met: bool,
    pub escalated: bool,
    pub order_value: Option<f64>,
    pub has_frustration: bool,
    pub category: Option<String>,
}

pub fn instructions(threshold: f64, category: &str) -> String {
    format!(
        "You are the Priority Agent.\n\n\
Escalate the incident to {category} only when BOTH hold:\n\
1. the order value is strictly greater than ${threshold:.2}\n\
2. the caller expressed frustration or dissatisfaction\n\n\
If both hold, call set_priority_code with category \"{category}\" and add a\n\
work note explaining the escalation. Otherwise call no tool.\n\n\
Reply with only this JSON object:\n\
{{\"escalated\": bool, \"pcc\": string | null, \"reason\": string}}"
    )
}

pub fn task(incident: &Incident, assessment: Option<&LLMAssessment>) -> String {
    let value = assessment
        .and_then(|a| a.order_value())
        .map(|v| format!("${v:.2}"))
        .unwrap_or_else(|| "unknown".to_string());
    let frustration = assessment.map(|a| a.has_frustration()).unwrap_or(false);
    format!(
        "Assess priority for incident {}.\nOrder value: {value}\nCustomer frustration: {frustration}\n\nDescription:\n{}",
        incident.number, incident.description
    )
}

pub fn escalation_note(order_value: f64, threshold: f64, category: &str) -> String {
    format!(
        "[PriorityAgent] Escalated to {category}: order value ${order_value:.2} exceeds ${threshold:.2} \
threshold and customer expressed frustration/dissatisfaction."
    )
}

/// Run the priority assessment. The criteria are evaluated here; the
/// correlation-code tool refuses Category A when they are not met.
pub async fn run(
    env: &SpecialistEnv,
    incident: &Incident,
    assessment: Option<&LLMAssessment>,
) -> Result<(AgentRun, PriorityAssessment), Error> {
    let kind = SpecialistKind::Priority;
    let policy_config = &env.settings.policy;
    let threshold = policy_config.escalation_threshold;
    let criteria_met = policy::escalation_criteria_met(assessment, threshold);

    let registry = ToolRegistry::new()
        .with(Box::new(SetPriorityCodeTool::new(env.tools.clone(), criteria_met)))?
        .with(Box::new(AddWorkNoteTool::new(env.tools.clone())))?;

    let (mut run, registry) = env
        .execute(
            kind,
            &instructions(threshold, &policy_config.category_a),
            registry,
            &task(incident, assessment),
        )
        .await?;

    let order_value = assessment.and_then(|a| a.order_value());
    if criteria_met && escalated_category(&run).is_none() {
        env.reconcile(
            &registry,
            &mut run,
            names::SET_PRIORITY_CODE,
            serde_json::json!({ "category": policy_config.category_a }),
        )
        .await;
        if let Some(value) = order_value {
            env.reconcile(
                &registry,
                &mut run,
                names::ADD_WORK_NOTE,
                serde_json::json!({ "note": escalation_note(value, threshold, &policy_config.category_a) }),
            )
            .await;
        }
    }

    let category = escalated_category(&run);
    let result = PriorityAssessment {
        criteria_met,
        escalated: category.is_some(),
        order_value,
        has_frustration: assessment.map(|a| a.has_frustration()).unwrap_or(false),
        category,
    };
    env.complete(kind, &mut run, &result);
    Ok((run, result))
}

/// The category written by the last successful escalating call.
fn escalated_category(run: &AgentRun) -> Option<String> {
    let in_loop = run.successes(names::SET_PRIORITY_CODE).map(|(_, r)| r);
    let after = run.reconciled.iter().filter(|r| r.success);
    in_loop
        .chain(after)
        .filter_map(|r| r.data.as_ref())
        .filter(|d| d.get("escalated").and_then(|v| v.as_bool()) == Some(true))
        .filter_map(|d| d.get("category").and_then(|v| v.as_str()).map(String::from))
        .last()
}
