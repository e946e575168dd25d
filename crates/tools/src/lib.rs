//! Incident tools: the side-effecting operations specialists may request.
//!
//! Every tool is bound to one incident through a [`ToolContext`] and acts
//! through the `IncidentStore` or `OrderApi` it carries.

pub mod add_work_note;
pub mod assign_incident;
pub mod cancel_order;
pub mod context;
pub mod resolve_incident;
pub mod set_pending;
pub mod set_priority_code;

pub use add_work_note::AddWorkNoteTool;
pub use assign_incident::AssignIncidentTool;
pub use cancel_order::CancelOrderTool;
pub use context::ToolContext;
pub use resolve_incident::ResolveIncidentTool;
pub use set_pending::SetPendingTool;
pub use set_priority_code::SetPriorityCodeTool;

/// Tool names as the decision unit sees them.
pub mod names {
    pub const ASSIGN_INCIDENT: &str = "assign_incident";
    pub const SET_PENDING: &str = "set_pending";
    pub const ADD_WORK_NOTE: &str = "add_work_note";
    pub const SET_PRIORITY_CODE: &str = "set_priority_code";
    pub const CANCEL_ORDER: &str = "cancel_order";
    pub const RESOLVE_INCIDENT: &str = "resolve_incident";
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::context::ToolContext;
    use incident_clients::{InMemoryIncidentStore, StubOrderApi};
    use incident_core::incident::Incident;
    use std::sync::Arc;

    pub fn store_with_incident() -> InMemoryIncidentStore {
        InMemoryIncidentStore::with_incidents(vec![Incident::new(
            "sys-1",
            "INC0010001",
            "Cancel my order",
            "Please cancel ORD-12345",
        )])
    }

    pub fn context(store: &InMemoryIncidentStore) -> ToolContext {
        context_with_orders(store, &StubOrderApi::succeeding())
    }

    pub fn context_with_orders(store: &InMemoryIncidentStore, orders: &StubOrderApi) -> ToolContext {
        ToolContext::new("sys-1", Arc::new(store.clone()), Arc::new(orders.clone()))
    }
}
