//! The agent loop: Request → Tools → Observe → Repeat.
//!
//! Every specialist and the super orchestrator are driven by the same
//! [`AgentLoop`]. Each turn sends the instructions, the tool schemas and the
//! conversation so far to the decision unit. Requested tools run in order and
//! each result is appended before the next turn, so no call is left without
//! an answer.

use std::sync::Arc;
use std::time::{Duration, Instant};

use incident_core::error::{Error, ToolError};
use incident_core::event::{DomainEvent, EventBus};
use incident_core::message::{Conversation, Message, MessageToolCall};
use incident_core::provider::{Provider, ProviderRequest};
use incident_core::tool::{ToolCall, ToolRegistry, ToolResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::policy;

/// How a loop ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LoopOutcome {
    /// The decision unit answered with no tool requests.
    Completed { text: String },
    /// The iteration cap was reached while tools were still being requested.
    Exhausted,
    /// The decision unit could not be reached or answered with an error.
    BackendFailed { error: String },
}

impl LoopOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            LoopOutcome::Completed { .. } => "completed",
            LoopOutcome::Exhausted => "exhausted",
            LoopOutcome::BackendFailed { .. } => "backend_failed",
        }
    }
}

/// One decision-unit turn and the tool results it produced.
#[derive(Debug, Clone, Serialize)]
pub struct AgentTurn {
    pub assistant: String,
    pub calls: Vec<MessageToolCall>,
    pub results: Vec<ToolResult>,
}

/// The record of one loop execution.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRun {
    pub agent: String,
    pub turns: Vec<AgentTurn>,
    pub outcome: LoopOutcome,
    pub iterations: u32,
    /// Tool calls the engine made on the unit's behalf after the loop.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reconciled: Vec<ToolResult>,
    /// Result shape extracted from the run by its owner.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

impl AgentRun {
    fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            turns: Vec::new(),
            outcome: LoopOutcome::Exhausted,
            iterations: 0,
            reconciled: Vec::new(),
            structured: None,
        }
    }

    /// The final text, if the loop completed.
    pub fn final_text(&self) -> Option<&str> {
        match &self.outcome {
            LoopOutcome::Completed { text } => Some(text),
            _ => None,
        }
    }

    /// Every executed call paired with its result, in execution order.
    pub fn executions(&self) -> impl Iterator<Item = (&MessageToolCall, &ToolResult)> {
        self.turns
            .iter()
            .flat_map(|turn| turn.calls.iter().zip(turn.results.iter()))
    }

    /// Results of successful calls to `tool`, in execution order.
    pub fn successes<'a>(&'a self, tool: &'a str) -> impl Iterator<Item = (&'a MessageToolCall, &'a ToolResult)> {
        self.executions()
            .filter(move |(call, result)| call.name == tool && result.success)
    }

    /// Whether a call to `tool` succeeded, inside the loop or afterwards.
    pub fn succeeded(&self, tool: &str) -> bool {
        self.successes(tool).next().is_some()
            || self
                .reconciled
                .iter()
                .any(|r| r.success && r.call_id == reconcile_call_id(tool))
    }

    /// Total tool calls requested across all turns.
    pub fn call_count(&self) -> usize {
        self.turns.iter().map(|t| t.calls.len()).sum()
    }
}

/// Call id given to tool calls the engine makes itself.
pub fn reconcile_call_id(tool: &str) -> String {
    format!("reconcile_{tool}")
}

/// The loop executor.
pub struct AgentLoop {
    name: String,
    provider: Arc<dyn Provider>,
    model: String,
    instructions: String,
    tools: Arc<ToolRegistry>,
    temperature: f32,
    max_tokens: Option<u32>,
    max_iterations: u32,
    transient_retries: u32,
    retry_backoff: Duration,
    event_bus: EventBus,
}

impl AgentLoop {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        instructions: impl Into<String>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model: model.into(),
            instructions: instructions.into(),
            tools,
            temperature: 0.0,
            max_tokens: None,
            max_iterations: policy::MAX_ITERATIONS,
            transient_retries: 1,
            retry_backoff: Duration::from_millis(500),
            event_bus: EventBus::default(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Retries for a call whose handler reported a transient failure.
    pub fn with_transient_retries(mut self, retries: u32) -> Self {
        self.transient_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the loop on `task`.
    ///
    /// Backend failures and the iteration cap are reported in the returned
    /// [`AgentRun`]. Only an aborting tool handler makes this return `Err`.
    pub async fn run(&self, task: &str) -> Result<AgentRun, Error> {
        let mut conversation = Conversation::new(self.instructions.clone(), task);
        let definitions = self.tools.definitions();
        let mut run = AgentRun::new(&self.name);

        info!(agent = %self.name, model = %self.model, "Agent loop started");

        for iteration in 1..=self.max_iterations {
            run.iterations = iteration;

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: conversation.messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: definitions.clone(),
            };

            let response = match self.provider.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(agent = %self.name, iteration, error = %e, "Decision unit call failed");
                    run.outcome = LoopOutcome::BackendFailed {
                        error: e.to_string(),
                    };
                    return Ok(run);
                }
            };

            if response.message.tool_calls.is_empty() {
                let text = response.message.content.clone();
                conversation.push(response.message);
                debug!(agent = %self.name, iteration, "Agent loop completed");
                run.outcome = LoopOutcome::Completed { text };
                return Ok(run);
            }

            let calls = response.message.tool_calls.clone();
            let assistant = response.message.content.clone();
            conversation.push(response.message);
            debug!(agent = %self.name, iteration, tool_count = calls.len(), "Executing tool calls");

            let mut results = Vec::with_capacity(calls.len());
            for tc in &calls {
                let result = self.execute_call(tc).await?;
                conversation.push(Message::tool_result(
                    &tc.id,
                    &result.output,
                    !result.success,
                ));
                results.push(result);
            }

            run.turns.push(AgentTurn {
                assistant,
                calls,
                results,
            });
        }

        warn!(
            agent = %self.name,
            max_iterations = self.max_iterations,
            "Iteration cap reached with tools still requested"
        );
        run.outcome = LoopOutcome::Exhausted;
        Ok(run)
    }

    /// Execute one requested call, turning every recoverable failure into a
    /// failed [`ToolResult`] for the decision unit to see.
    async fn execute_call(&self, tc: &MessageToolCall) -> Result<ToolResult, Error> {
        let start = Instant::now();
        let outcome = match parse_call_arguments(tc) {
            Ok(call) => self.execute_with_retry(&call).await,
            Err(e) => Err(e),
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = match outcome {
            Ok(result) => result,
            Err(ToolError::Aborted { tool_name, reason }) => {
                warn!(agent = %self.name, tool = %tool_name, %reason, "Tool aborted the run");
                self.publish_execution(&tc.name, false, duration_ms);
                return Err(Error::Aborted { tool_name, reason });
            }
            Err(e) => {
                warn!(agent = %self.name, tool = %tc.name, error = %e, "Tool execution failed");
                ToolResult::failure(&tc.id, &e)
            }
        };

        self.publish_execution(&tc.name, result.success, duration_ms);
        Ok(result)
    }

    async fn execute_with_retry(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let mut attempt = 0;
        loop {
            match self.tools.execute(call).await {
                Err(e) if e.is_transient() && attempt < self.transient_retries => {
                    attempt += 1;
                    warn!(
                        agent = %self.name,
                        tool = %call.name,
                        attempt,
                        error = %e,
                        "Transient tool failure, retrying"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    fn publish_execution(&self, tool_name: &str, success: bool, duration_ms: u64) {
        self.event_bus.publish(DomainEvent::ToolExecuted {
            agent: self.name.clone(),
            tool_name: tool_name.to_string(),
            success,
            duration_ms,
            timestamp: chrono::Utc::now(),
        });
    }
}

/// Decode the argument string the decision unit produced. Empty means `{}`.
fn parse_call_arguments(tc: &MessageToolCall) -> Result<ToolCall, ToolError> {
    let raw = tc.arguments.trim();
    let arguments = if raw.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
            ToolError::InvalidArguments(format!("{}: arguments are not valid JSON: {e}", tc.name))
        })?
    };
    if !arguments.is_object() {
        return Err(ToolError::InvalidArguments(format!(
            "{}: arguments must be a JSON object",
            tc.name
        )));
    }
    Ok(ToolCall {
        id: tc.id.clone(),
        name: tc.name.clone(),
        arguments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        SequentialMockProvider, make_text_response, make_tool_call, make_tool_call_response,
    };
    use async_trait::async_trait;
    use incident_core::error::ProviderError;
    use incident_core::tool::Tool;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails transiently `failures` times, then succeeds.
    struct FlakyTool {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "add_work_note"
        }
        fn description(&self) -> &str {
            "Append a work note"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(ToolError::Transient {
                    tool_name: "add_work_note".into(),
                    reason: "503".into(),
                });
            }
            Ok(ToolResult::ok(serde_json::json!({ "status": "note_added" })))
        }
    }

    struct AbortingTool;

    #[async_trait]
    impl Tool for AbortingTool {
        fn name(&self) -> &str {
            "run_priority_assessment"
        }
        fn description(&self) -> &str {
            "Always aborts"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
            Err(ToolError::Aborted {
                tool_name: "run_priority_assessment".into(),
                reason: "expected run_triage".into(),
            })
        }
    }

    fn flaky(failures: u32) -> Arc<ToolRegistry> {
        Arc::new(
            ToolRegistry::new()
                .with(Box::new(FlakyTool {
                    failures,
                    calls: AtomicU32::new(0),
                }))
                .unwrap(),
        )
    }

    fn agent(provider: SequentialMockProvider, tools: Arc<ToolRegistry>) -> AgentLoop {
        AgentLoop::new("TestAgent", Arc::new(provider), "mock-model", "You test.", tools)
            .with_retry_backoff(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn text_answer_completes_in_one_turn() {
        let provider = SequentialMockProvider::new(vec![make_text_response("{\"ok\": true}")]);
        let run = agent(provider, Arc::new(ToolRegistry::new()))
            .run("task")
            .await
            .unwrap();
        assert_eq!(run.iterations, 1);
        assert_eq!(run.final_text(), Some("{\"ok\": true}"));
        assert!(run.turns.is_empty());
    }

    #[tokio::test]
    async fn tool_results_are_fed_back_before_next_turn() {
        let provider = SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("c1", "add_work_note", r#"{"note":"x"}"#)]),
            make_text_response("done"),
        ]);
        let probe = provider.clone();
        let run = agent(provider, flaky(0)).run("task").await.unwrap();

        assert_eq!(run.iterations, 2);
        assert_eq!(run.call_count(), 1);
        assert!(run.succeeded("add_work_note"));

        let second = &probe.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.tool_call_id.as_deref(), Some("c1"));
        assert!(!last.is_error);
    }

    #[tokio::test]
    async fn every_call_in_a_batch_gets_a_result() {
        let provider = SequentialMockProvider::new(vec![
            make_tool_call_response(vec![
                make_tool_call("c1", "add_work_note", "{}"),
                make_tool_call("c2", "drop_tables", "{}"),
                make_tool_call("c3", "add_work_note", "not json"),
            ]),
            make_text_response("done"),
        ]);
        let probe = provider.clone();
        let run = agent(provider, flaky(0)).run("task").await.unwrap();

        let results = &run.turns[0].results;
        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert!(!results[2].success);

        let ids: Vec<_> = probe.requests()[1]
            .messages
            .iter()
            .filter_map(|m| m.tool_call_id.clone())
            .collect();
        assert_eq!(ids, vec!["c1", "c2", "c3"]);
    }

    #[tokio::test]
    async fn transient_failure_is_retried_once() {
        let provider = SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("c1", "add_work_note", "{}")]),
            make_text_response("done"),
        ]);
        let run = agent(provider, flaky(1)).run("task").await.unwrap();
        assert!(run.turns[0].results[0].success);
    }

    #[tokio::test]
    async fn persistent_transient_failure_is_reported() {
        let provider = SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("c1", "add_work_note", "{}")]),
            make_text_response("done"),
        ]);
        let run = agent(provider, flaky(5)).run("task").await.unwrap();
        let result = &run.turns[0].results[0];
        assert!(!result.success);
        assert!(result.output.contains("503"));
        assert_eq!(run.final_text(), Some("done"));
    }

    #[tokio::test]
    async fn iteration_cap_is_enforced() {
        let responses = (0..30)
            .map(|i| {
                make_tool_call_response(vec![make_tool_call(
                    &format!("c{i}"),
                    "add_work_note",
                    "{}",
                )])
            })
            .collect();
        let provider = SequentialMockProvider::new(responses);
        let probe = provider.clone();
        let run = agent(provider, flaky(0)).run("task").await.unwrap();

        assert_eq!(run.outcome, LoopOutcome::Exhausted);
        assert_eq!(run.iterations, policy::MAX_ITERATIONS);
        assert_eq!(probe.requests().len(), policy::MAX_ITERATIONS as usize);
    }

    #[tokio::test]
    async fn backend_failure_is_recorded_not_raised() {
        let provider = SequentialMockProvider::new(vec![]);
        let run = agent(provider, flaky(0)).run("task").await.unwrap();
        assert_eq!(run.outcome.label(), "backend_failed");
    }

    #[tokio::test]
    async fn backend_error_mid_run_keeps_earlier_turns() {
        let provider = SequentialMockProvider::with_results(vec![
            Ok(make_tool_call_response(vec![make_tool_call("c1", "add_work_note", "{}")])),
            Err(ProviderError::Network("connection reset".into())),
        ]);
        let run = agent(provider, flaky(0)).run("task").await.unwrap();
        assert_eq!(run.turns.len(), 1);
        assert!(matches!(run.outcome, LoopOutcome::BackendFailed { ref error } if error.contains("reset")));
    }

    #[tokio::test]
    async fn aborting_tool_stops_the_loop() {
        let provider = SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("c1", "run_priority_assessment", "{}")]),
            make_text_response("never reached"),
        ]);
        let tools = Arc::new(ToolRegistry::new().with(Box::new(AbortingTool)).unwrap());
        let err = agent(provider, tools).run("task").await.unwrap_err();
        assert!(matches!(err, Error::Aborted { ref tool_name, .. } if tool_name == "run_priority_assessment"));
    }

    #[tokio::test]
    async fn tool_executions_are_published() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let provider = SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("c1", "add_work_note", "{}")]),
            make_text_response("done"),
        ]);
        agent(provider, flaky(0))
            .with_event_bus(bus)
            .run("task")
            .await
            .unwrap();

        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ToolExecuted { agent, tool_name, success, .. } => {
                assert_eq!(agent, "TestAgent");
                assert_eq!(tool_name, "add_work_note");
                assert!(success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
