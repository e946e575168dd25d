//! `incident-orchestrator doctor`: Show effective settings and client modes.

use std::path::Path;

use incident_config::AppConfig;

pub fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("Incident Orchestrator Doctor");
    println!("============================\n");

    let mut issues = 0;

    let file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if file.exists() {
        println!("  ok    config file: {}", file.display());
    } else {
        println!("  info  no config file at {} (defaults + environment)", file.display());
    }

    let config = match AppConfig::load_with(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("  FAIL  config invalid: {e}");
            return Ok(());
        }
    };

    match config.validate_live() {
        Ok(()) => println!("  ok    live settings present"),
        Err(e) => {
            println!("  FAIL  {e}");
            issues += 1;
        }
    }

    println!("  info  ServiceNow: {} (group '{}')", config.servicenow.base_url(), config.servicenow.group);
    if config.order_api.is_stub() {
        println!("  info  order API: stub mode (cancellations are simulated)");
    } else {
        println!("  info  order API: {}", config.order_api.base_url);
    }
    println!("  info  orchestrator mode: {:?}", config.orchestrator.mode);
    println!(
        "  info  poller: every {}s, up to {} concurrent runs",
        config.poller.interval_seconds, config.poller.max_concurrent_runs
    );

    println!("\nEffective configuration (secrets redacted):\n{config:#?}");

    println!();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        println!("  {issues} issue(s) found. See above for details.");
    }
    Ok(())
}
