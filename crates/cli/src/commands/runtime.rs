//! Wiring shared by `run` and `process`: config, clients, orchestrator.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use incident_agent::{AgentSettings, SuperOrchestrator};
use incident_clients::{HttpOrderApi, InMemoryIncidentStore, ServiceNowClient, StubOrderApi};
use incident_config::AppConfig;
use incident_core::event::{DomainEvent, EventBus};
use incident_core::order::OrderApi;
use incident_core::store::IncidentStore;
use incident_providers::AnthropicProvider;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    AppConfig::load_with(path).context("Failed to load config")
}

pub struct Runtime {
    pub config: AppConfig,
    pub orchestrator: Arc<SuperOrchestrator>,
    /// Where incidents are listed and written.
    pub store: Arc<dyn IncidentStore>,
    pub event_bus: EventBus,
    live: Arc<ServiceNowClient>,
    mirror: Option<InMemoryIncidentStore>,
}

impl Runtime {
    pub fn build(config: AppConfig, dry_run: bool) -> anyhow::Result<Self> {
        config
            .validate_live()
            .context("Configuration is incomplete")?;

        let provider = Arc::new(
            AnthropicProvider::from_config(&config.anthropic).context("Failed to build decision unit")?,
        );
        let live = Arc::new(
            ServiceNowClient::from_config(&config.servicenow).context("Failed to build ServiceNow client")?,
        );

        let (store, order_api, mirror) = if dry_run {
            let mirror = InMemoryIncidentStore::new();
            (
                Arc::new(mirror.clone()) as Arc<dyn IncidentStore>,
                Arc::new(StubOrderApi::succeeding()) as Arc<dyn OrderApi>,
                Some(mirror),
            )
        } else {
            let orders = HttpOrderApi::from_config(&config.order_api)
                .context("Failed to build order API client")?;
            (
                live.clone() as Arc<dyn IncidentStore>,
                Arc::new(orders) as Arc<dyn OrderApi>,
                None,
            )
        };

        let event_bus = EventBus::default();
        let orchestrator = SuperOrchestrator::new(
            provider,
            store.clone(),
            order_api,
            AgentSettings::from_config(&config),
        )
        .with_event_bus(event_bus.clone());

        info!(
            instance = %config.servicenow.base_url(),
            group = %config.servicenow.group,
            mode = ?config.orchestrator.mode,
            dry_run,
            "Runtime ready"
        );

        Ok(Self {
            config,
            orchestrator: Arc::new(orchestrator),
            store,
            event_bus,
            live,
            mirror,
        })
    }

    pub fn is_dry_run(&self) -> bool {
        self.mirror.is_some()
    }

    /// In dry-run mode, copy the live queue into memory. Returns the count.
    pub async fn mirror_queue(&self) -> anyhow::Result<usize> {
        let Some(mirror) = &self.mirror else {
            return Ok(0);
        };
        let incidents = self
            .live
            .list_new(&self.config.servicenow.group)
            .await
            .context("Failed to list incidents")?;
        let count = incidents.len();
        for incident in incidents {
            mirror.insert(incident).await;
        }
        info!(count, "Mirrored live queue for dry run");
        Ok(count)
    }

    /// In dry-run mode, copy one incident into memory.
    pub async fn mirror_incident(&self, sys_id: &str) -> anyhow::Result<()> {
        let Some(mirror) = &self.mirror else {
            return Ok(());
        };
        let incident = self
            .live
            .get(sys_id)
            .await
            .context("Failed to fetch incident")?
            .with_context(|| format!("Incident {sys_id} not found"))?;
        mirror.insert(incident).await;
        Ok(())
    }

    /// Log every domain event until the bus closes.
    pub fn spawn_event_logger(&self) -> tokio::task::JoinHandle<()> {
        let mut rx = self.event_bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event logger lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::ToolExecuted {
            agent,
            tool_name,
            success,
            duration_ms,
            ..
        } => debug!(kind = event.kind(), %agent, tool = %tool_name, success, duration_ms, "Event"),
        DomainEvent::SpecialistCompleted {
            incident_number,
            agent,
            outcome,
            iterations,
            ..
        } => info!(kind = event.kind(), incident = %incident_number, %agent, %outcome, iterations, "Event"),
        DomainEvent::IncidentProcessed {
            incident_number,
            branch,
            outcome,
            ..
        } => info!(kind = event.kind(), incident = %incident_number, %branch, %outcome, "Event"),
        DomainEvent::RunAborted {
            incident_number,
            reason,
            ..
        } => warn!(kind = event.kind(), incident = %incident_number, %reason, "Event"),
    }
}
