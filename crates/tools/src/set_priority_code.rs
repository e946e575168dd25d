//! Set the priority correlation code.
//!
//! The handler knows whether the escalation rule holds for this incident and
//! refuses to write the Category A value when it does not, whatever the
//! decision unit asks for.

use async_trait::async_trait;
use incident_core::error::ToolError;
use incident_core::incident::IncidentUpdate;
use incident_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use tracing::{info, warn};

use crate::context::{ToolContext, non_blank, store_failure};
use crate::names;

pub struct SetPriorityCodeTool {
    ctx: ToolContext,
    escalation_allowed: bool,
}

#[derive(Deserialize)]
struct SetPriorityCodeArgs {
    category: String,
}

impl SetPriorityCodeTool {
    pub fn new(ctx: ToolContext, escalation_allowed: bool) -> Self {
        Self {
            ctx,
            escalation_allowed,
        }
    }
}

#[async_trait]
impl Tool for SetPriorityCodeTool {
    fn name(&self) -> &str {
        names::SET_PRIORITY_CODE
    }

    fn description(&self) -> &str {
        "Set the Problem Correlation Code (PCC) on the incident. Lower categories such as \
         CAT B or CAT C are always accepted. The Category A value is refused unless the order \
         value exceeds the threshold AND the caller shows frustration; a refused escalation \
         will be refused again, so do not retry it."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "category": {
                    "type": "string",
                    "description": format!(
                        "The PCC value to set. '{}' is the highest priority and only accepted when the escalation criteria are met.",
                        self.ctx.category_a
                    )
                }
            },
            "required": ["category"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: SetPriorityCodeArgs = parse_arguments(self.name(), arguments)?;
        let category = args.category.trim().to_string();
        non_blank(self.name(), "category", &category)?;

        if category.eq_ignore_ascii_case(&self.ctx.category_a) && !self.escalation_allowed {
            warn!(sys_id = %self.ctx.sys_id, "Refusing escalation: criteria not met");
            return Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!(
                    "escalation to {} requires order value above threshold and caller frustration; \
                     the criteria are not met for this incident, do not retry",
                    self.ctx.category_a
                ),
            });
        }

        let escalated = category.eq_ignore_ascii_case(&self.ctx.category_a);
        let note = if escalated {
            format!("[PriorityAgent] Problem Correlation Code escalated to {category}.")
        } else {
            format!("[PriorityAgent] Problem Correlation Code set to {category}.")
        };
        let update = IncidentUpdate::note(note).with_field(&self.ctx.pcc_field, &category);
        self.ctx
            .store
            .update(&self.ctx.sys_id, update)
            .await
            .map_err(|e| store_failure(self.name(), e))?;

        info!(sys_id = %self.ctx.sys_id, field = %self.ctx.pcc_field, %category, "Priority code set");
        Ok(ToolResult::ok(serde_json::json!({
            "status": "success",
            "category": category,
            "escalated": escalated,
            "message": format!("PCC set to {category}."),
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{context, store_with_incident};

    #[tokio::test]
    async fn escalates_when_allowed() {
        let store = store_with_incident();
        let tool = SetPriorityCodeTool::new(context(&store).with_pcc_field("u_pcc"), true);
        let result = tool
            .execute(serde_json::json!({ "category": "CAT A" }))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["escalated"], true);

        let incident = store.snapshot("sys-1").await.unwrap();
        assert_eq!(incident.custom_field("u_pcc"), Some("CAT A"));
        assert_eq!(incident.work_notes.len(), 1);
    }

    #[tokio::test]
    async fn refuses_escalation_when_criteria_unmet() {
        let store = store_with_incident();
        let tool = SetPriorityCodeTool::new(context(&store), false);
        let err = tool
            .execute(serde_json::json!({ "category": "cat a" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { ref reason, .. } if reason.contains("do not retry")));
        assert!(store.updates().await.is_empty());
    }

    #[test]
    fn description_tells_which_categories_are_refused() {
        let tool = SetPriorityCodeTool::new(context(&store_with_incident()), false);
        assert!(tool.description().contains("CAT B or CAT C are always accepted"));
        assert!(tool.description().contains("do not retry"));
        let schema = tool.parameters_schema();
        assert!(
            schema["properties"]["category"]["description"]
                .as_str()
                .unwrap()
                .contains("only accepted when the escalation criteria are met")
        );
    }

    #[tokio::test]
    async fn lower_categories_always_allowed() {
        let store = store_with_incident();
        let tool = SetPriorityCodeTool::new(context(&store), false);
        let result = tool
            .execute(serde_json::json!({ "category": "CAT C" }))
            .await
            .unwrap();
        assert_eq!(result.data.unwrap()["escalated"], false);

        let incident = store.snapshot("sys-1").await.unwrap();
        assert_eq!(incident.work_notes, vec!["[PriorityAgent] Problem Correlation Code set to CAT C.".to_string()]);
    }
}
