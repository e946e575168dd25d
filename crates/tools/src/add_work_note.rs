//! Append an internal work note.

use async_trait::async_trait;
use incident_core::error::ToolError;
use incident_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use tracing::debug;

use crate::context::{ToolContext, non_blank, store_failure};
use crate::names;

pub struct AddWorkNoteTool {
    ctx: ToolContext,
}

#[derive(Deserialize)]
struct AddWorkNoteArgs {
    note: String,
}

impl AddWorkNoteTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for AddWorkNoteTool {
    fn name(&self) -> &str {
        names::ADD_WORK_NOTE
    }

    fn description(&self) -> &str {
        "Append an internal work note (visible only to agents) to the incident."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "note": { "type": "string", "description": "The work note text to append." }
            },
            "required": ["note"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: AddWorkNoteArgs = parse_arguments(self.name(), arguments)?;
        non_blank(self.name(), "note", &args.note)?;

        self.ctx
            .store
            .add_work_note(&self.ctx.sys_id, &args.note)
            .await
            .map_err(|e| store_failure(self.name(), e))?;

        debug!(sys_id = %self.ctx.sys_id, "Work note added");
        Ok(ToolResult::ok(serde_json::json!({
            "status": "success",
            "message": "Work note added.",
        })))
    }
}
