//! Message and Conversation value objects.
//!
//! A conversation is what a decision unit sees on every turn: the role
//! instructions, the task message, and every assistant turn with its tool
//! results appended in order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Role instructions
    System,
    /// The task handed to the agent
    User,
    /// The decision unit
    Assistant,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Set on tool results that carry a failure
    #[serde(default)]
    pub is_error: bool,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content.into())
    }

    /// An assistant turn that requests tool execution.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<MessageToolCall>) -> Self {
        let mut msg = Self::with_role(Role::Assistant, content.into());
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool result message correlated to `tool_call_id`.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        let mut msg = Self::with_role(Role::Tool, content.into());
        msg.tool_call_id = Some(tool_call_id.into());
        msg.is_error = is_error;
        msg
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string, exactly as the decision unit produced them
    pub arguments: String,
}

/// An ordered sequence of messages for one agent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Run-scoped ID, used to correlate log lines
    pub id: String,

    pub messages: Vec<Message>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Start a conversation with role instructions and the task message.
    pub fn new(instructions: impl Into<String>, task: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            messages: vec![Message::system(instructions), Message::user(task)],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Tool call IDs requested by the assistant that have no result yet.
    pub fn pending_call_ids(&self) -> Vec<String> {
        let mut pending: Vec<String> = Vec::new();
        for msg in &self.messages {
            match msg.role {
                Role::Assistant => pending.extend(msg.tool_calls.iter().map(|c| c.id.clone())),
                Role::Tool => {
                    if let Some(id) = &msg.tool_call_id {
                        pending.retain(|p| p != id);
                    }
                }
                _ => {}
            }
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> MessageToolCall {
        MessageToolCall {
            id: id.into(),
            name: "add_work_note".into(),
            arguments: "{}".into(),
        }
    }

    #[test]
    fn conversation_starts_with_instructions_and_task() {
        let conv = Conversation::new("You are TriageAgent", "Incident INC0010001");
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, Role::System);
        assert_eq!(conv.messages[1].role, Role::User);
        assert!(conv.updated_at >= conv.created_at);
    }

    #[test]
    fn pending_calls_clear_when_results_arrive() {
        let mut conv = Conversation::new("sys", "task");
        conv.push(Message::assistant_with_calls("", vec![call("a"), call("b")]));
        assert_eq!(conv.pending_call_ids(), vec!["a".to_string(), "b".to_string()]);

        conv.push(Message::tool_result("a", "ok", false));
        assert_eq!(conv.pending_call_ids(), vec!["b".to_string()]);

        conv.push(Message::tool_result("b", "boom", true));
        assert!(conv.pending_call_ids().is_empty());
    }

    #[test]
    fn tool_result_carries_error_flag() {
        let msg = Message::tool_result("call_1", "Error: denied", true);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(msg.is_error);
    }
}
