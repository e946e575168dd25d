//! Shared test helpers for loop, specialist and orchestrator tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use incident_core::error::ProviderError;
use incident_core::message::{Message, MessageToolCall};
use incident_core::provider::{Provider, ProviderRequest, ProviderResponse, StopReason, Usage};

type Scripted = Result<ProviderResponse, ProviderError>;

/// A mock decision unit that returns a sequence of scripted responses.
///
/// Once the script runs out every further call fails with an API error.
/// Clones share the same script and request log.
#[derive(Clone, Default)]
pub struct SequentialMockProvider {
    responses: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(ProviderError::ApiError {
                    status_code: 500,
                    message: "script exhausted".into(),
                })
            })
    }
}

/// Routes each request to a per-model script, so one provider can stand in
/// for every agent of a run.
#[derive(Clone, Default)]
pub struct ScriptedProvider {
    scripts: Arc<Mutex<HashMap<String, SequentialMockProvider>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, model: &str, responses: Vec<ProviderResponse>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(model.to_string(), SequentialMockProvider::new(responses));
        self
    }

    /// Requests received for `model`.
    pub fn requests(&self, model: &str) -> Vec<ProviderRequest> {
        self.scripts
            .lock()
            .unwrap()
            .get(model)
            .map(|p| p.requests())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let script = self.scripts.lock().unwrap().get(&request.model).cloned();
        match script {
            Some(script) => script.complete(request).await,
            None => Err(ProviderError::NotConfigured(format!(
                "no script for model {}",
                request.model
            ))),
        }
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        stop_reason: StopReason::EndTurn,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Create a response requesting `tool_calls`.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_calls("", tool_calls),
        stop_reason: StopReason::ToolUse,
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// Helper to create a tool call with raw argument text.
pub fn make_tool_call(id: &str, name: &str, arguments: &str) -> MessageToolCall {
    MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}
