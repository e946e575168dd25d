//! The specialists exposed as tools to the super orchestrator.
//!
//! Adapters take no arguments: inputs are threaded from earlier results, so
//! the coordinator decides only which step to request. A refused request
//! aborts the whole run while the incident is still untouched; once a step
//! has written, the refusal comes back as a failed result instead.

use std::sync::Arc;

use async_trait::async_trait;
use incident_core::error::ToolError;
use incident_core::tool::{Tool, ToolRegistry, ToolResult};

use super::pipeline::{Pipeline, StepError};
use crate::policy;
use crate::specialists::SpecialistKind;

pub struct SpecialistAdapter {
    kind: SpecialistKind,
    pipeline: Arc<Pipeline>,
}

impl SpecialistAdapter {
    pub fn new(kind: SpecialistKind, pipeline: Arc<Pipeline>) -> Self {
        Self { kind, pipeline }
    }
}

#[async_trait]
impl Tool for SpecialistAdapter {
    fn name(&self) -> &str {
        self.kind.adapter_tool()
    }

    fn description(&self) -> &str {
        match self.kind {
            SpecialistKind::Triage => {
                "Step 1. Assess the incident, extract order details, and either assign it or set it to pending."
            }
            SpecialistKind::CiValidation => {
                "Step 2. Check the Reported CI field and add a warning note when it is empty."
            }
            SpecialistKind::Priority => {
                "Step 3. Escalate to Category A when the order value exceeds the threshold and the caller is frustrated."
            }
            SpecialistKind::OrderCancellation => {
                "Step 4. Cancel the order found during triage and note the outcome."
            }
            SpecialistKind::Resolution => "Step 5. Write close notes and resolve the incident.",
        }
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        match self.pipeline.run_step(self.kind).await {
            Ok(output) => Ok(ToolResult::ok(output.to_value())),
            Err(StepError::Refused(violation)) => Err(ToolError::Aborted {
                tool_name: self.kind.adapter_tool().to_string(),
                reason: violation.reason,
            }),
            Err(StepError::Declined(violation)) => Err(ToolError::ExecutionFailed {
                tool_name: self.kind.adapter_tool().to_string(),
                reason: violation.reason,
            }),
            Err(StepError::Failed(e)) => Err(ToolError::ExecutionFailed {
                tool_name: self.kind.adapter_tool().to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

/// The coordinator's registry: one adapter per specialist, in order.
pub fn registry(pipeline: &Arc<Pipeline>) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    for kind in policy::PIPELINE {
        registry.register(Box::new(SpecialistAdapter::new(kind, pipeline.clone())))?;
    }
    Ok(registry)
}
