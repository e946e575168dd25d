//! Incident poller: fetch new incidents on an interval and run each through
//! the super orchestrator.
//!
//! The first cycle runs immediately. Incidents that completed a run are not
//! picked up again while they stay in the queue; incidents whose run was
//! aborted for a sequencing violation are quarantined. Both sets only keep
//! ids the store still lists, so they are bounded by the queue size. Runs
//! inside one cycle execute concurrently up to `max_concurrent_runs`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use incident_agent::{OrchestrationError, OrchestrationResult, RunOutcome, SuperOrchestrator};
use incident_config::PollerConfig;
use incident_core::error::StoreError;
use incident_core::incident::Incident;
use incident_core::store::IncidentStore;
use serde::Serialize;
use tokio::sync::{RwLock, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// What one polling cycle did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub started_at: Option<DateTime<Utc>>,
    pub fetched: usize,
    pub skipped: usize,
    pub resolved: usize,
    pub pending: usize,
    pub unresolved: usize,
    pub quarantined: usize,
    pub failed: usize,
    pub duration_ms: u64,
}

impl CycleReport {
    pub fn processed(&self) -> usize {
        self.resolved + self.pending + self.unresolved
    }
}

enum RunVerdict {
    Completed(RunOutcome),
    Quarantined,
    Failed,
}

pub struct IncidentPoller {
    orchestrator: Arc<SuperOrchestrator>,
    store: Arc<dyn IncidentStore>,
    group: String,
    interval: Duration,
    max_concurrent: usize,
    processed: Arc<RwLock<HashSet<String>>>,
    quarantined: Arc<RwLock<HashSet<String>>>,
}

impl IncidentPoller {
    pub fn new(
        orchestrator: Arc<SuperOrchestrator>,
        store: Arc<dyn IncidentStore>,
        group: impl Into<String>,
        config: &PollerConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            group: group.into(),
            interval: Duration::from_secs(config.interval_seconds.max(1)),
            max_concurrent: config.max_concurrent_runs.max(1),
            processed: Arc::new(RwLock::new(HashSet::new())),
            quarantined: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// sys_ids that completed a run this session.
    pub async fn processed(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.processed.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// sys_ids held back after an aborted run.
    pub async fn quarantined(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.quarantined.read().await.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Run one polling cycle.
    pub async fn poll_once(&self) -> Result<CycleReport, StoreError> {
        let started = Instant::now();
        let mut report = CycleReport {
            started_at: Some(Utc::now()),
            ..CycleReport::default()
        };

        let incidents = self.store.list_new(&self.group).await?;
        report.fetched = incidents.len();
        self.forget_departed(&incidents).await;

        let fresh = self.unseen(incidents).await;
        report.skipped = report.fetched - fresh.len();
        if fresh.is_empty() {
            debug!(group = %self.group, skipped = report.skipped, "No new incidents");
        }

        let verdicts: Vec<RunVerdict> = stream::iter(fresh)
            .map(|incident| self.run_one(incident))
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        for verdict in verdicts {
            match verdict {
                RunVerdict::Completed(RunOutcome::Resolved) => report.resolved += 1,
                RunVerdict::Completed(RunOutcome::Pending) => report.pending += 1,
                RunVerdict::Completed(RunOutcome::Unresolved) => report.unresolved += 1,
                RunVerdict::Quarantined => report.quarantined += 1,
                RunVerdict::Failed => report.failed += 1,
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            fetched = report.fetched,
            skipped = report.skipped,
            resolved = report.resolved,
            pending = report.pending,
            unresolved = report.unresolved,
            quarantined = report.quarantined,
            failed = report.failed,
            duration_ms = report.duration_ms,
            "Poll cycle complete"
        );
        Ok(report)
    }

    /// Poll until `shutdown` flips to true. A cycle in progress is finished
    /// before stopping; no new cycle starts afterwards.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            group = %self.group,
            interval_secs = self.interval.as_secs(),
            max_concurrent = self.max_concurrent,
            "Poller started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "Failed to fetch incidents");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Poller stopped");
    }

    /// Drop remembered ids that have left the queue. One reopened later is
    /// treated as new.
    async fn forget_departed(&self, listed: &[Incident]) {
        let listed: HashSet<&str> = listed.iter().map(|i| i.sys_id.as_str()).collect();
        let mut processed = self.processed.write().await;
        let before = processed.len();
        processed.retain(|id| listed.contains(id.as_str()));
        let mut quarantined = self.quarantined.write().await;
        quarantined.retain(|id| {
            let keep = listed.contains(id.as_str());
            if !keep {
                info!(sys_id = %id, "Quarantined incident left the queue");
            }
            keep
        });
        if processed.len() < before {
            debug!(forgotten = before - processed.len(), "Forgot incidents no longer queued");
        }
    }

    async fn unseen(&self, incidents: Vec<Incident>) -> Vec<Incident> {
        let processed = self.processed.read().await;
        let quarantined = self.quarantined.read().await;
        incidents
            .into_iter()
            .filter(|i| !processed.contains(&i.sys_id) && !quarantined.contains(&i.sys_id))
            .collect()
    }

    async fn run_one(&self, incident: Incident) -> RunVerdict {
        let sys_id = incident.sys_id.clone();
        match self.orchestrator.process(incident).await {
            Ok(result) => {
                self.processed.write().await.insert(sys_id);
                log_result(&result);
                RunVerdict::Completed(result.summary.outcome)
            }
            Err(e @ OrchestrationError::SequencingViolation { .. }) => {
                warn!(sys_id = %sys_id, error = %e, "Quarantining incident after aborted run");
                self.quarantined.write().await.insert(sys_id);
                RunVerdict::Quarantined
            }
            Err(e) => {
                error!(sys_id = %sys_id, error = %e, "Run failed, will retry next cycle");
                RunVerdict::Failed
            }
        }
    }
}

fn log_result(result: &OrchestrationResult) {
    info!(
        incident = %result.incident_number,
        outcome = result.summary.outcome.as_str(),
        branch = result.branch.as_str(),
        summary = %result.summary.summary,
        "Run summary"
    );
}
