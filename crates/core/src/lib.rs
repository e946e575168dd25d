//! # Incident Core
//!
//! Domain types, traits, and error definitions for the incident orchestrator.
//! This crate defines the incident model and the seams every other crate
//! implements against: the decision unit (`Provider`), tool handlers (`Tool`),
//! the incident store (`IncidentStore`) and the order API (`OrderApi`).
//!
//! Implementations live in their respective crates, so the sequencing logic
//! can be exercised end to end with deterministic stubs.

pub mod error;
pub mod event;
pub mod incident;
pub mod message;
pub mod order;
pub mod provider;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, OrderApiError, ProviderError, Result, StoreError, ToolError};
pub use event::{DomainEvent, EventBus};
pub use incident::{CancelResult, Incident, IncidentState, IncidentUpdate, LLMAssessment, TriageAction};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use order::OrderApi;
pub use provider::{Provider, ProviderRequest, ProviderResponse, StopReason, ToolDefinition};
pub use store::IncidentStore;
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
