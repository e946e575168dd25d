//! Tool trait: the abstraction over side-effecting handlers.
//!
//! A tool is a named, schema-described operation a decision unit may
//! request. Each agent receives its own closed [`ToolRegistry`]; the set of
//! names is checked when the agent is built, not when a call arrives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the decision unit's tool_use id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// Text handed back to the decision unit
    pub output: String,

    /// Optional structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    /// A successful result with a structured payload.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: data.to_string(),
            data: Some(data),
        }
    }

    /// A failed result describing `error`, fed back so the unit can adapt.
    pub fn failure(call_id: impl Into<String>, error: &ToolError) -> Self {
        Self {
            call_id: call_id.into(),
            success: false,
            output: serde_json::json!({ "error": error.to_string() }).to_string(),
            data: None,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = call_id.into();
        self
    }
}

/// The core Tool trait.
///
/// Handlers never panic on bad input: argument problems are reported as
/// [`ToolError::InvalidArguments`] and downstream failures as
/// [`ToolError::ExecutionFailed`] or [`ToolError::Transient`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "set_pending").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the decision unit).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for the decision unit.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Deserialize tool arguments into a typed parameter struct.
///
/// Schema violations come back as [`ToolError::InvalidArguments`].
pub fn parse_arguments<T: serde::de::DeserializeOwned>(
    tool_name: &str,
    arguments: serde_json::Value,
) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("{tool_name}: {e}")))
}

/// An ordered, closed set of tools bound for one agent.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool. Names must be unique within one registry.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        if self.get(tool.name()).is_some() {
            return Err(ToolError::InvalidArguments(format!(
                "duplicate tool name '{}'",
                tool.name()
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style registration.
    pub fn with(mut self, tool: Box<dyn Tool>) -> Result<Self, ToolError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Tool definitions in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Check that this registry binds exactly `expected`, in any order.
    pub fn ensure_exact(&self, expected: &[&str]) -> Result<(), String> {
        let mut actual = self.names();
        actual.sort_unstable();
        let mut wanted = expected.to_vec();
        wanted.sort_unstable();
        if actual == wanted {
            Ok(())
        } else {
            Err(format!("expected tools {wanted:?}, found {actual:?}"))
        }
    }

    /// Execute a tool call. Unknown names are a [`ToolError::NotFound`].
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let result = tool.execute(call.arguments.clone()).await?;
        Ok(result.with_call_id(&call.id))
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
