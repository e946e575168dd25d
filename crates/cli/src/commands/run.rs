//! `incident-orchestrator run`: Poll the queue until interrupted.

use std::path::Path;

use incident_workflow::IncidentPoller;
use tokio::sync::watch;
use tracing::{info, warn};

use super::runtime::{Runtime, load_config};

pub async fn run(config_path: Option<&Path>, dry_run: bool) -> anyhow::Result<()> {
    let runtime = Runtime::build(load_config(config_path)?, dry_run)?;
    let _events = runtime.spawn_event_logger();

    if runtime.is_dry_run() {
        runtime.mirror_queue().await?;
    }

    let poller = IncidentPoller::new(
        runtime.orchestrator.clone(),
        runtime.store.clone(),
        runtime.config.servicenow.group.clone(),
        &runtime.config.poller,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested, finishing current cycle"),
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    poller.run(shutdown_rx).await;

    let processed = poller.processed().await;
    let quarantined = poller.quarantined().await;
    info!(
        processed = processed.len(),
        quarantined = quarantined.len(),
        "Session finished"
    );
    if !quarantined.is_empty() {
        warn!(sys_ids = ?quarantined, "Quarantined incidents still in the queue need manual review");
    }
    Ok(())
}
