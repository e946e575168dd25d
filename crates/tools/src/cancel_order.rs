//! Cancel the customer's order through the order API.

use async_trait::async_trait;
use incident_core::error::ToolError;
use incident_core::tool::{Tool, ToolResult, parse_arguments};
use serde::Deserialize;
use tracing::{info, warn};

use crate::context::{ToolContext, non_blank, order_failure};
use crate::names;

pub struct CancelOrderTool {
    ctx: ToolContext,
}

#[derive(Deserialize)]
struct CancelOrderArgs {
    order_id: String,
}

impl CancelOrderTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Tool for CancelOrderTool {
    fn name(&self) -> &str {
        names::CANCEL_ORDER
    }

    fn description(&self) -> &str {
        "Cancel a customer order via the Order Management API. Call only with a valid order ID \
         extracted from the incident. Returns success/failure and a message from the Order API."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "order_id": {
                    "type": "string",
                    "description": "The order identifier, e.g. 'ORD-12345'."
                }
            },
            "required": ["order_id"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let args: CancelOrderArgs = parse_arguments(self.name(), arguments)?;
        let order_id = args.order_id.trim();
        non_blank(self.name(), "order_id", order_id)?;

        let result = self
            .ctx
            .order_api
            .cancel_order(order_id)
            .await
            .map_err(|e| order_failure(self.name(), e))?;

        if result.success {
            info!(sys_id = %self.ctx.sys_id, order_id, "Order cancelled");
        } else {
            warn!(sys_id = %self.ctx.sys_id, order_id, message = %result.message, "Order cancellation rejected");
        }

        let data = serde_json::json!({
            "success": result.success,
            "order_id": order_id,
            "message": result.message,
        });
        Ok(ToolResult {
            call_id: String::new(),
            success: result.success,
            output: data.to_string(),
            data: Some(data),
        })
    }
}
