//! Order cancellation: cancel the order triage extracted and note the result.

use incident_core::error::Error;
use incident_core::incident::{CancelResult, Incident};
use incident_core::tool::ToolRegistry;
use incident_tools::{AddWorkNoteTool, CancelOrderTool, names};
use serde::{Deserialize, Serialize};

use super::{SpecialistEnv, SpecialistKind};
use crate::loop_runner::AgentRun;

pub const NO_ORDER_MESSAGE: &str = "No order ID found in description.";

pub const NO_ORDER_NOTE: &str =
    "[OrderCancellationAgent] No order ID found in incident description. Manual cancellation required.";

pub const INSTRUCTIONS: &str = "\
You are the Order Cancellation Agent.

If the order ID below is NOT FOUND, do not call cancel_order. Add this work note:
  [OrderCancellationAgent] No order ID found in incident description. Manual cancellation required.
and reply {\"success\": false, \"order_id\": null, \"message\": \"No order ID found in description.\"}.

Otherwise call cancel_order with the order ID, then add a work note:
  [OrderCancellationAgent] Order cancellation result for <order_id>: <success|failure> - <message>
and reply {\"success\": bool, \"order_id\": string, \"message\": string}.

Always add the work note, whatever the outcome. Reply with only the JSON object.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancellation {
    #[serde(flatten)]
    pub result: CancelResult,
    pub note_added: bool,
}

pub fn task(incident: &Incident, order_id: Option<&str>) -> String {
    format!(
        "Incident {}.\nOrder ID to cancel: {}\n\nDescription:\n{}",
        incident.number,
        order_id.unwrap_or("NOT FOUND"),
        incident.description
    )
}

pub fn result_note(result: &CancelResult) -> String {
    match &result.order_id {
        Some(id) => format!(
            "[OrderCancellationAgent] Order cancellation result for {id}: {} - {}",
            if result.success { "success" } else { "failure" },
            result.message
        ),
        None => NO_ORDER_NOTE.to_string(),
    }
}

pub async fn run(
    env: &SpecialistEnv,
    incident: &Incident,
    order_id: Option<&str>,
) -> Result<(AgentRun, OrderCancellation), Error> {
    let kind = SpecialistKind::OrderCancellation;
    let registry = ToolRegistry::new()
        .with(Box::new(CancelOrderTool::new(env.tools.clone())))?
        .with(Box::new(AddWorkNoteTool::new(env.tools.clone())))?;

    let (mut run, registry) = env
        .execute(kind, INSTRUCTIONS, registry, &task(incident, order_id))
        .await?;

    let result = interpret(&run, order_id);
    if !run.succeeded(names::ADD_WORK_NOTE) {
        env.reconcile(
            &registry,
            &mut run,
            names::ADD_WORK_NOTE,
            serde_json::json!({ "note": result_note(&result) }),
        )
        .await;
    }

    let output = OrderCancellation {
        note_added: run.succeeded(names::ADD_WORK_NOTE),
        result,
    };
    env.complete(kind, &mut run, &output);
    Ok((run, output))
}

/// Only a completed cancel_order call can report success.
pub fn interpret(run: &AgentRun, order_id: Option<&str>) -> CancelResult {
    let attempts: Vec<_> = run
        .executions()
        .filter(|(call, _)| call.name == names::CANCEL_ORDER)
        .collect();

    let reported = attempts
        .iter()
        .rev()
        .find_map(|(_, result)| result.data.clone())
        .and_then(|data| serde_json::from_value::<CancelResult>(data).ok());
    if let Some(result) = reported {
        return result;
    }

    match (order_id, attempts.last()) {
        (None, _) => CancelResult::failed(None, NO_ORDER_MESSAGE),
        (Some(id), Some((_, failure))) => CancelResult::failed(Some(id.to_string()), failure.output.clone()),
        (Some(id), None) => CancelResult::failed(Some(id.to_string()), "Cancellation was not attempted."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specialists::testing;
    use crate::test_helpers::{ScriptedProvider, make_text_response, make_tool_call, make_tool_call_response};
    use incident_clients::{InMemoryIncidentStore, StubBehavior, StubOrderApi};

    fn store() -> InMemoryIncidentStore {
        InMemoryIncidentStore::with_incidents(vec![testing::incident()])
    }

    fn cancel_then_note(note: &str, answer: &str) -> Vec<incident_core::provider::ProviderResponse> {
        vec![
            make_tool_call_response(vec![make_tool_call(
                "o1",
                "cancel_order",
                r#"{"order_id":"ORD-12345"}"#,
            )]),
            make_tool_call_response(vec![make_tool_call(
                "o2",
                "add_work_note",
                &serde_json::json!({ "note": note }).to_string(),
            )]),
            make_text_response(answer),
        ]
    }

    #[tokio::test]
    async fn cancels_and_notes_the_result() {
        let store = store();
        let orders = StubOrderApi::succeeding();
        let provider = ScriptedProvider::new().script(
            &testing::model(SpecialistKind::OrderCancellation),
            cancel_then_note(
                "[OrderCancellationAgent] Order cancellation result for ORD-12345: success - ok",
                r#"{"success": true, "order_id": "ORD-12345", "message": "ok"}"#,
            ),
        );
        let env = testing::env(&provider, &store, &orders);

        let (_, output) = run(&env, &testing::incident(), Some("ORD-12345")).await.unwrap();

        assert!(output.result.success);
        assert_eq!(output.result.order_id.as_deref(), Some("ORD-12345"));
        assert!(output.note_added);
        assert_eq!(orders.calls().await, vec!["ORD-12345".to_string()]);
    }

    #[tokio::test]
    async fn rejection_is_a_failed_result_with_a_note() {
        let store = store();
        let orders = StubOrderApi::new(StubBehavior::Reject);
        let provider = ScriptedProvider::new().script(
            &testing::model(SpecialistKind::OrderCancellation),
            vec![
                make_tool_call_response(vec![make_tool_call(
                    "o1",
                    "cancel_order",
                    r#"{"order_id":"ORD-12345"}"#,
                )]),
                make_text_response(r#"{"success": true, "order_id": "ORD-12345", "message": "claimed"}"#),
            ],
        );
        let env = testing::env(&provider, &store, &orders);

        let (run, output) = run(&env, &testing::incident(), Some("ORD-12345")).await.unwrap();

        assert!(!output.result.success);
        assert!(output.note_added);
        assert_eq!(run.reconciled.len(), 1);
        let stored = store.snapshot("sys-1").await.unwrap();
        assert!(stored.work_notes.iter().any(|n| n.contains("failure")));
    }

    #[tokio::test]
    async fn missing_order_id_skips_the_api() {
        let store = store();
        let orders = StubOrderApi::succeeding();
        let provider = ScriptedProvider::new().script(
            &testing::model(SpecialistKind::OrderCancellation),
            vec![make_text_response(
                r#"{"success": false, "order_id": null, "message": "No order ID found in description."}"#,
            )],
        );
        let env = testing::env(&provider, &store, &orders);

        let (_, output) = run(&env, &testing::incident(), None).await.unwrap();

        assert_eq!(output.result, CancelResult::failed(None, NO_ORDER_MESSAGE));
        assert!(orders.calls().await.is_empty());
        let stored = store.snapshot("sys-1").await.unwrap();
        assert_eq!(stored.work_notes, vec![NO_ORDER_NOTE.to_string()]);
    }

    #[tokio::test]
    async fn unreachable_api_is_reported_as_failure() {
        let store = store();
        let orders = StubOrderApi::failing();
        let provider = ScriptedProvider::new().script(
            &testing::model(SpecialistKind::OrderCancellation),
            vec![
                make_tool_call_response(vec![make_tool_call(
                    "o1",
                    "cancel_order",
                    r#"{"order_id":"ORD-12345"}"#,
                )]),
                make_text_response(r#"{"success": false}"#),
            ],
        );
        let env = testing::env(&provider, &store, &orders);

        let (_, output) = run(&env, &testing::incident(), Some("ORD-12345")).await.unwrap();

        assert!(!output.result.success);
        assert_eq!(output.result.order_id.as_deref(), Some("ORD-12345"));
        // one attempt plus one transient retry
        assert_eq!(orders.calls().await.len(), 2);
    }

    #[test]
    fn task_marks_missing_order() {
        assert!(task(&testing::incident(), None).contains("Order ID to cancel: NOT FOUND"));
    }
}
