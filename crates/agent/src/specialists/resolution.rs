//! Resolution: write close notes from the pipeline so far and resolve.

use incident_core::error::Error;
use incident_core::tool::ToolRegistry;
use incident_tools::{ResolveIncidentTool, names};
use serde::{Deserialize, Serialize};

use super::{SpecialistEnv, SpecialistKind, ThreadedContext};
use crate::loop_runner::AgentRun;

pub const INSTRUCTIONS: &str = "\
You are the Resolution Agent.

Write close notes for the incident using exactly this template:

Issue: <one-line summary of the customer's problem>
Error: <what went wrong, including the order ID if any>
Recovery steps:
1. <step taken>
2. <step taken>

Base the notes on the incident and the orchestration summary you are given.
Then call resolve_incident with the close notes and reply with only:
{\"resolved\": true, \"close_notes\": \"<the notes>\"}";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolved: bool,
    pub close_notes: Option<String>,
}

pub fn task(ctx: &ThreadedContext) -> String {
    let mut text = format!("{}\n\n=== Orchestration Summary ===\n", ctx.incident.render());

    match &ctx.assessment {
        Some(a) => {
            text.push_str(&format!("Triage: {}", a.action()));
            if let Some(id) = a.order_id() {
                text.push_str(&format!(", order {id}"));
            }
            if let Some(value) = a.order_value() {
                text.push_str(&format!(", value ${value:.2}"));
            }
            if a.has_frustration() {
                text.push_str(", customer frustrated");
            }
            text.push('\n');
        }
        None => text.push_str("Triage: not run\n"),
    }
    if let Some(ci) = &ctx.ci_validation {
        match &ci.reported_ci {
            Some(value) => text.push_str(&format!("CI validation: valid ({value})\n")),
            None => text.push_str("CI validation: Reported CI missing, warning note added\n"),
        }
    }
    if let Some(p) = &ctx.priority {
        if p.escalated {
            text.push_str(&format!(
                "Priority: escalated to {}\n",
                p.category.as_deref().unwrap_or("Category A")
            ));
        } else {
            text.push_str("Priority: not escalated\n");
        }
    }
    if let Some(c) = &ctx.cancellation {
        text.push_str(&format!(
            "Order cancellation: {} ({})\n",
            if c.result.success { "succeeded" } else { "failed" },
            c.result.message
        ));
    }
    text.push_str("\nWrite the close notes and resolve the incident.");
    text
}

pub async fn run(env: &SpecialistEnv, ctx: &ThreadedContext) -> Result<(AgentRun, Resolution), Error> {
    let kind = SpecialistKind::Resolution;
    let registry = ToolRegistry::new().with(Box::new(ResolveIncidentTool::new(env.tools.clone())))?;

    let (mut run, _) = env.execute(kind, INSTRUCTIONS, registry, &task(ctx)).await?;

    let result = interpret(&run);
    env.complete(kind, &mut run, &result);
    Ok((run, result))
}

/// Resolved only if resolve_incident succeeded; notes come from that call.
pub fn interpret(run: &AgentRun) -> Resolution {
    let close_notes = run
        .successes(names::RESOLVE_INCIDENT)
        .last()
        .map(|(call, _)| {
            serde_json::from_str::<serde_json::Value>(&call.arguments)
                .ok()
                .and_then(|args| args.get("close_notes").and_then(|v| v.as_str()).map(String::from))
                .unwrap_or_default()
        });
    Resolution {
        resolved: close_notes.is_some(),
        close_notes,
    }
}
