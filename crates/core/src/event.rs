//! Domain event system: decoupled observation of orchestration runs.
//!
//! The loop executor, the orchestrator and the poller publish events here;
//! the daemon subscribes and logs them. Nothing in the dispatch path depends
//! on a subscriber being present.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A tool handler ran (successfully or not)
    ToolExecuted {
        agent: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A specialist finished its loop
    SpecialistCompleted {
        incident_number: String,
        agent: String,
        outcome: String,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },

    /// An orchestration run produced a summary
    IncidentProcessed {
        incident_number: String,
        branch: String,
        outcome: String,
        timestamp: DateTime<Utc>,
    },

    /// An orchestration run was aborted before any summary
    RunAborted {
        incident_number: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short kind label, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::ToolExecuted { .. } => "tool_executed",
            DomainEvent::SpecialistCompleted { .. } => "specialist_completed",
            DomainEvent::IncidentProcessed { .. } => "incident_processed",
            DomainEvent::RunAborted { .. } => "run_aborted",
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
