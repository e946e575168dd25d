//! Per-run binding shared by every incident tool.

use incident_core::error::{OrderApiError, StoreError, ToolError};
use incident_core::order::OrderApi;
use incident_core::store::IncidentStore;
use std::sync::Arc;

pub const DEFAULT_ENGINEER_NAME: &str = "Incident Orchestrator Bot";
pub const DEFAULT_PCC_FIELD: &str = "u_problem_correlation_code";
pub const DEFAULT_CATEGORY_A: &str = "CAT A";

/// What a tool acts on: one incident, and the clients that reach it.
///
/// The incident is fixed when the tools are built, so a decision unit can
/// never redirect a write to another record.
#[derive(Clone)]
pub struct ToolContext {
    pub sys_id: String,
    pub store: Arc<dyn IncidentStore>,
    pub order_api: Arc<dyn OrderApi>,
    pub engineer_name: String,
    pub pcc_field: String,
    pub category_a: String,
}

impl ToolContext {
    pub fn new(
        sys_id: impl Into<String>,
        store: Arc<dyn IncidentStore>,
        order_api: Arc<dyn OrderApi>,
    ) -> Self {
        Self {
            sys_id: sys_id.into(),
            store,
            order_api,
            engineer_name: DEFAULT_ENGINEER_NAME.into(),
            pcc_field: DEFAULT_PCC_FIELD.into(),
            category_a: DEFAULT_CATEGORY_A.into(),
        }
    }

    pub fn with_engineer(mut self, name: impl Into<String>) -> Self {
        self.engineer_name = name.into();
        self
    }

    pub fn with_pcc_field(mut self, field: impl Into<String>) -> Self {
        self.pcc_field = field.into();
        self
    }

    pub fn with_category_a(mut self, category: impl Into<String>) -> Self {
        self.category_a = category.into();
        self
    }
}

/// Map an incident store failure onto the tool error taxonomy.
pub(crate) fn store_failure(tool_name: &str, error: StoreError) -> ToolError {
    if error.is_transient() {
        ToolError::Transient {
            tool_name: tool_name.into(),
            reason: error.to_string(),
        }
    } else {
        ToolError::ExecutionFailed {
            tool_name: tool_name.into(),
            reason: error.to_string(),
        }
    }
}

/// Order API `Err`s are network or server failures; both may be retried.
pub(crate) fn order_failure(tool_name: &str, error: OrderApiError) -> ToolError {
    ToolError::Transient {
        tool_name: tool_name.into(),
        reason: error.to_string(),
    }
}

/// Reject blank string arguments.
pub(crate) fn non_blank(tool_name: &str, field: &str, value: &str) -> Result<(), ToolError> {
    if value.trim().is_empty() {
        Err(ToolError::InvalidArguments(format!(
            "{tool_name}: '{field}' must not be empty"
        )))
    } else {
        Ok(())
    }
}
