//! Assign the incident to the orchestrator engineer and start work on it.

use async_trait::async_trait;
use incident_core::error::ToolError;
use incident_core::incident::{IncidentState, IncidentUpdate};
use incident_core::tool::{Tool, ToolResult};
use tracing::info;

use crate::context::{ToolContext, store_failure};
use crate::names;

pub struct AssignIncidentTool {
    ctx: ToolContext,
}

impl AssignIncidentTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for AssignIncidentTool {
    fn name(&self) -> &str {
        names::ASSIGN_INCIDENT
    }

    fn description(&self) -> &str {
        "Assign the incident to the orchestrator engineer and set its state to In Progress. \
         Call this when the incident contains enough information to proceed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let update = IncidentUpdate::default()
            .with_state(IncidentState::InProgress)
            .with_assignee(&self.ctx.engineer_name);
        self.ctx
            .store
            .update(&self.ctx.sys_id, update)
            .await
            .map_err(|e| store_failure(self.name(), e))?;

        info!(sys_id = %self.ctx.sys_id, engineer = %self.ctx.engineer_name, "Incident assigned");
        Ok(ToolResult::ok(serde_json::json!({
            "status": "success",
            "assigned_to": self.ctx.engineer_name,
            "message": format!("Incident assigned to {}, state set to In Progress.", self.ctx.engineer_name),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, store_with_incident};

    #[tokio::test]
    async fn assigns_and_moves_to_in_progress() {
        let store = store_with_incident();
        let tool = AssignIncidentTool::new(context(&store).with_engineer("Ops Bot"));
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.success);

        let incident = store.snapshot("sys-1").await.unwrap();
        assert_eq!(incident.state, IncidentState::InProgress);
        assert_eq!(incident.assigned_to, "Ops Bot");
    }

    #[tokio::test]
    async fn store_failure_is_transient() {
        let store = store_with_incident().failing_updates();
        let tool = AssignIncidentTool::new(context(&store));
        let err = tool.execute(serde_json::json!({})).await.unwrap_err();
        assert!(err.is_transient());
    }
}
