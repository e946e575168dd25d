//! `incident-orchestrator process <sys_id>`: Process one incident.

use std::path::Path;

use anyhow::Context;

use super::runtime::{Runtime, load_config};

pub async fn run(config_path: Option<&Path>, dry_run: bool, sys_id: &str, full: bool) -> anyhow::Result<()> {
    let runtime = Runtime::build(load_config(config_path)?, dry_run)?;
    let _events = runtime.spawn_event_logger();
    runtime.mirror_incident(sys_id).await?;

    let result = runtime
        .orchestrator
        .process_by_id(sys_id)
        .await
        .with_context(|| format!("Failed to process incident {sys_id}"))?;

    let output = if full {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string_pretty(&result.summary)?
    };
    println!("{output}");
    Ok(())
}
