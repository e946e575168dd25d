//! In-memory incident store and stub order API.
//! Useful for testing and `--dry-run` sessions.

use async_trait::async_trait;
use incident_core::error::{OrderApiError, StoreError};
use incident_core::incident::{CancelResult, Incident, IncidentUpdate};
use incident_core::order::OrderApi;
use incident_core::store::IncidentStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An incident store backed by a map, recording every applied update.
#[derive(Clone, Default)]
pub struct InMemoryIncidentStore {
    incidents: Arc<RwLock<HashMap<String, Incident>>>,
    updates: Arc<RwLock<Vec<(String, IncidentUpdate)>>>,
    fail_updates: bool,
}

impl InMemoryIncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_incidents(incidents: impl IntoIterator<Item = Incident>) -> Self {
        let map = incidents
            .into_iter()
            .map(|i| (i.sys_id.clone(), i))
            .collect();
        Self {
            incidents: Arc::new(RwLock::new(map)),
            ..Self::default()
        }
    }

    /// Every `update` call fails with a server error.
    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub async fn insert(&self, incident: Incident) {
        self.incidents
            .write()
            .await
            .insert(incident.sys_id.clone(), incident);
    }

    /// Snapshot of an incident's current state.
    pub async fn snapshot(&self, sys_id: &str) -> Option<Incident> {
        self.incidents.read().await.get(sys_id).cloned()
    }

    /// All updates applied so far, in order.
    pub async fn updates(&self) -> Vec<(String, IncidentUpdate)> {
        self.updates.read().await.clone()
    }
}

#[async_trait]
impl IncidentStore for InMemoryIncidentStore {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn list_new(&self, group: &str) -> Result<Vec<Incident>, StoreError> {
        let incidents = self.incidents.read().await;
        let mut open: Vec<Incident> = incidents
            .values()
            .filter(|i| i.state.is_open())
            .filter(|i| i.assigned_to.trim().is_empty())
            .filter(|i| group.is_empty() || i.assignment_group == group)
            .cloned()
            .collect();
        open.sort_by(|a, b| a.number.cmp(&b.number));
        Ok(open)
    }

    async fn get(&self, sys_id: &str) -> Result<Option<Incident>, StoreError> {
        Ok(self.incidents.read().await.get(sys_id).cloned())
    }

    async fn update(&self, sys_id: &str, update: IncidentUpdate) -> Result<(), StoreError> {
        if self.fail_updates {
            return Err(StoreError::Api {
                status_code: 500,
                message: "simulated store failure".into(),
            });
        }
        let mut incidents = self.incidents.write().await;
        let incident = incidents
            .get_mut(sys_id)
            .ok_or_else(|| StoreError::NotFound(sys_id.to_string()))?;
        update.apply_to(incident);
        self.updates
            .write()
            .await
            .push((sys_id.to_string(), update));
        Ok(())
    }
}

/// How [`StubOrderApi`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    Succeed,
    /// A definitive rejection (`success == false`)
    Reject,
    /// A server error on every call
    Fail,
}

/// An order API that never leaves the process.
#[derive(Clone)]
pub struct StubOrderApi {
    behavior: StubBehavior,
    calls: Arc<RwLock<Vec<String>>>,
}

impl StubOrderApi {
    pub fn new(behavior: StubBehavior) -> Self {
        Self {
            behavior,
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(StubBehavior::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(StubBehavior::Fail)
    }

    /// Order ids passed to `cancel_order`, in call order.
    pub async fn calls(&self) -> Vec<String> {
        self.calls.read().await.clone()
    }
}

impl Default for StubOrderApi {
    fn default() -> Self {
        Self::succeeding()
    }
}

#[async_trait]
impl OrderApi for StubOrderApi {
    fn name(&self) -> &str {
        "order-api-stub"
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResult, OrderApiError> {
        self.calls.write().await.push(order_id.to_string());
        match self.behavior {
            StubBehavior::Succeed => Ok(CancelResult::succeeded(
                order_id,
                format!("Order {order_id} cancelled successfully (stub mode)."),
            )),
            StubBehavior::Reject => Ok(CancelResult::failed(
                Some(order_id.to_string()),
                format!("Order {order_id} cannot be cancelled: already shipped"),
            )),
            StubBehavior::Fail => Err(OrderApiError::Server {
                status_code: 503,
                message: "order service unavailable".into(),
            }),
        }
    }
}
