//! IncidentStore trait: the incident-tracking system seen from the core.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::incident::{Incident, IncidentUpdate};

/// Read and write access to incident records.
///
/// Implementations own their concurrency discipline; the core treats each
/// call as one full round trip.
#[async_trait]
pub trait IncidentStore: Send + Sync {
    /// A human-readable name (e.g., "servicenow", "in-memory").
    fn name(&self) -> &str;

    /// Open, unassigned incidents for an assignment group.
    async fn list_new(&self, group: &str) -> Result<Vec<Incident>, StoreError>;

    /// Fetch one incident. `Ok(None)` when the record does not exist.
    async fn get(&self, sys_id: &str) -> Result<Option<Incident>, StoreError>;

    /// Apply a delta to an incident.
    async fn update(&self, sys_id: &str, update: IncidentUpdate) -> Result<(), StoreError>;

    /// Append a work note.
    async fn add_work_note(&self, sys_id: &str, note: &str) -> Result<(), StoreError> {
        self.update(sys_id, IncidentUpdate::note(note)).await
    }

    /// Fetch an incident, treating absence as an error.
    async fn require(&self, sys_id: &str) -> Result<Incident, StoreError> {
        self.get(sys_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(sys_id.to_string()))
    }
}
