//! Resolve the incident with structured close notes.

use async_trait::async_trait;
use incident_core::error::ToolError;
use incident_core::incident::{IncidentState, IncidentUpdate};
use incident_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use tracing::info;

use crate::context::{ToolContext, store_failure};
use crate::names;

pub const CLOSE_CODE: &str = "Solved (Permanently)";

/// Sections every set of close notes must carry, in this order.
pub const CLOSE_NOTE_SECTIONS: [&str; 3] = ["Issue:", "Error:", "Recovery steps:"];

pub struct ResolveIncidentTool {
    ctx: ToolContext,
}

#[derive(Deserialize)]
struct ResolveIncidentArgs {
    close_notes: String,
}

impl ResolveIncidentTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

/// Section headers absent from `notes` (case-insensitive).
pub fn missing_sections(notes: &str) -> Vec<&'static str> {
    let lower = notes.to_lowercase();
    CLOSE_NOTE_SECTIONS
        .iter()
        .copied()
        .filter(|section| !lower.contains(&section.to_lowercase()))
        .collect()
}

#[async_trait]
impl Tool for ResolveIncidentTool {
    fn name(&self) -> &str {
        names::RESOLVE_INCIDENT
    }

    fn description(&self) -> &str {
        "Resolve the incident: state Resolved, engineer assigned, close notes written. \
         This is always the final action."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "close_notes": {
                    "type": "string",
                    "description": "Resolution notes using the template:\n\
                                    Issue: <what the user reported>\n\
                                    Error: <specific error or problem identified>\n\
                                    Recovery steps: <what was done to resolve it>"
                }
            },
            "required": ["close_notes"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: ResolveIncidentArgs = parse_arguments(self.name(), arguments)?;
        let missing = missing_sections(&args.close_notes);
        if !missing.is_empty() {
            return Err(ToolError::InvalidArguments(format!(
                "resolve_incident: close notes must contain {}",
                missing.join(", ")
            )));
        }

        let update = IncidentUpdate {
            state: Some(IncidentState::Resolved),
            assigned_to: Some(self.ctx.engineer_name.clone()),
            close_notes: Some(args.close_notes.trim().to_string()),
            close_code: Some(CLOSE_CODE.into()),
            ..IncidentUpdate::default()
        };
        self.ctx
            .store
            .update(&self.ctx.sys_id, update)
            .await
            .map_err(|e| store_failure(self.name(), e))?;

        info!(sys_id = %self.ctx.sys_id, engineer = %self.ctx.engineer_name, "Incident resolved");
        Ok(ToolResult::ok(serde_json::json!({
            "status": "success",
            "resolved": true,
            "message": "Incident resolved.",
        })))
    }
}
