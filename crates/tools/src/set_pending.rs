//! Move the incident to Pending with a note naming the missing information.

use async_trait::async_trait;
use incident_core::error::ToolError;
use incident_core::incident::{IncidentState, IncidentUpdate};
use incident_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use tracing::info;

use crate::context::{ToolContext, store_failure};
use crate::names;

pub struct SetPendingTool {
    ctx: ToolContext,
}

#[derive(Deserialize)]
struct SetPendingArgs {
    missing_fields: Vec<String>,
}

impl SetPendingTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

/// The work note written when an incident is parked.
pub fn pending_note(missing_fields: &[String]) -> String {
    let listed: Vec<String> = missing_fields.iter().map(|f| format!("  - {f}")).collect();
    format!(
        "[Orchestrator] Incident moved to Pending: additional information required.\n\
         The incident does not contain enough information to begin investigation.\n\
         Please provide the following details:\n{}",
        listed.join("\n")
    )
}

#[async_trait]
impl Tool for SetPendingTool {
    fn name(&self) -> &str {
        names::SET_PENDING
    }

    fn description(&self) -> &str {
        "Move the incident to Pending when there is not enough information to process it. \
         Adds a work note listing exactly what is missing."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "missing_fields": {
                    "type": "array",
                    "items": { "type": "string" },
                    "minItems": 1,
                    "description": "Fields or details missing from the incident."
                }
            },
            "required": ["missing_fields"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: SetPendingArgs = parse_arguments(self.name(), arguments)?;
        let missing: Vec<String> = args
            .missing_fields
            .into_iter()
            .map(|f| f.trim().to_string())
            .filter(|f| !f.is_empty())
            .collect();
        if missing.is_empty() {
            return Err(ToolError::InvalidArguments(
                "set_pending: 'missing_fields' must name at least one field".into(),
            ));
        }

        let update = IncidentUpdate::note(pending_note(&missing)).with_state(IncidentState::Pending);
        self.ctx
            .store
            .update(&self.ctx.sys_id, update)
            .await
            .map_err(|e| store_failure(self.name(), e))?;

        info!(sys_id = %self.ctx.sys_id, missing = ?missing, "Incident moved to Pending");
        Ok(ToolResult::ok(serde_json::json!({
            "status": "success",
            "missing_fields": missing,
            "message": "Incident set to Pending.",
        })))
    }
}
