//! Scripted decision units and fixtures shared by the orchestrator tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use incident_agent::AgentSettings;
use incident_clients::{InMemoryIncidentStore, StubOrderApi};
use incident_config::OrchestratorMode;
use incident_core::error::ProviderError;
use incident_core::incident::Incident;
use incident_core::message::{Message, MessageToolCall};
use incident_core::provider::{Provider, ProviderRequest, ProviderResponse, StopReason};

pub const COORDINATOR: &str = "test-coordinator";
pub const TRIAGE: &str = "test-triage";
pub const CI: &str = "test-ci";
pub const PRIORITY: &str = "test-priority";
pub const CANCEL: &str = "test-cancel";
pub const RESOLUTION: &str = "test-resolution";

pub const CLOSE_NOTES: &str = "Issue: customer requested cancellation\nError: order ORD-12345 no longer wanted\nRecovery steps:\n1. Cancelled the order\n2. Noted the outcome";

/// Answers each request from the script registered for its model.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<HashMap<String, VecDeque<ProviderResponse>>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, model: &str, responses: Vec<ProviderResponse>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(model.to_string(), responses.into());
        self
    }

    pub fn requests_for(&self, model: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.model == model)
            .count()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&model)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| ProviderError::ApiError {
                status_code: 500,
                message: format!("no scripted response left for {model}"),
            })
    }
}

pub fn text(body: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(body),
        stop_reason: StopReason::EndTurn,
        usage: None,
        model: "scripted".into(),
    }
}

pub fn calls(calls: &[(&str, serde_json::Value)]) -> ProviderResponse {
    let tool_calls = calls
        .iter()
        .enumerate()
        .map(|(i, (name, args))| MessageToolCall {
            id: format!("toolu_{name}_{i}"),
            name: name.to_string(),
            arguments: args.to_string(),
        })
        .collect();
    ProviderResponse {
        message: Message::assistant_with_calls("", tool_calls),
        stop_reason: StopReason::ToolUse,
        usage: None,
        model: "scripted".into(),
    }
}

pub fn call(name: &str, args: serde_json::Value) -> ProviderResponse {
    calls(&[(name, args)])
}

pub fn settings(mode: OrchestratorMode) -> AgentSettings {
    let mut settings = AgentSettings::default();
    settings.models.orchestrator = COORDINATOR.into();
    settings.models.triage = TRIAGE.into();
    settings.models.ci_validation = CI.into();
    settings.models.priority = PRIORITY.into();
    settings.models.order_cancellation = CANCEL.into();
    settings.models.resolution = RESOLUTION.into();
    settings.orchestrator.mode = mode;
    settings.orchestrator.retry_backoff_ms = 1;
    settings
}

pub fn incident() -> Incident {
    Incident::new(
        "sys-1",
        "INC0010001",
        "Cancel order ORD-12345",
        "Please cancel order ORD-12345 worth $7,000. This delay is unacceptable!",
    )
    .with_reported_ci("Order Service")
    .with_group("Order Support")
}

pub fn store(incident: Incident) -> InMemoryIncidentStore {
    InMemoryIncidentStore::with_incidents(vec![incident])
}

pub fn orders() -> StubOrderApi {
    StubOrderApi::succeeding()
}

/// Coordinator script that requests every step, one per turn.
pub fn coordinator_full() -> Vec<ProviderResponse> {
    vec![
        call("run_triage", serde_json::json!({})),
        call("run_ci_validation", serde_json::json!({})),
        call("run_priority_assessment", serde_json::json!({})),
        call("run_order_cancellation", serde_json::json!({})),
        call("run_resolution", serde_json::json!({})),
        text(r#"{"incident_number":"INC0010001","outcome":"resolved","summary":"Order cancelled and incident resolved."}"#),
    ]
}

/// Triage script that assigns with the given extraction.
pub fn triage_assign(order_value: f64, frustrated: bool) -> Vec<ProviderResponse> {
    vec![
        call("assign_incident", serde_json::json!({})),
        text(&serde_json::json!({
            "action": "assign",
            "order_id": "ORD-12345",
            "order_value": order_value,
            "has_frustration": frustrated,
            "missing_fields": [],
            "reasoning": "order id and CI present"
        }).to_string()),
    ]
}

pub fn ci_valid() -> Vec<ProviderResponse> {
    vec![text(r#"{"ci_valid": true, "ci_value": "Order Service"}"#)]
}

pub fn priority_escalate() -> Vec<ProviderResponse> {
    vec![
        call("set_priority_code", serde_json::json!({ "category": "CAT A" })),
        text(r#"{"escalated": true, "pcc": "CAT A", "reason": "high value, frustrated"}"#),
    ]
}

pub fn priority_none() -> Vec<ProviderResponse> {
    vec![text(r#"{"escalated": false, "pcc": null, "reason": "criteria not met"}"#)]
}

pub fn cancel_order() -> Vec<ProviderResponse> {
    vec![
        call("cancel_order", serde_json::json!({ "order_id": "ORD-12345" })),
        call(
            "add_work_note",
            serde_json::json!({ "note": "[OrderCancellationAgent] Order cancellation result for ORD-12345: success - cancelled" }),
        ),
        text(r#"{"success": true, "order_id": "ORD-12345", "message": "cancelled"}"#),
    ]
}

pub fn resolve() -> Vec<ProviderResponse> {
    vec![
        call("resolve_incident", serde_json::json!({ "close_notes": CLOSE_NOTES })),
        text(&serde_json::json!({ "resolved": true, "close_notes": CLOSE_NOTES }).to_string()),
    ]
}
