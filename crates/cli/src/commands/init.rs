//! `incident-orchestrator init`: Write a default config file.

use std::path::Path;

use anyhow::Context;
use incident_config::AppConfig;

pub fn run(config_path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    if path.exists() && !force {
        println!("Config already exists at: {}", path.display());
        println!("Edit it manually or re-run with --force.");
        return Ok(());
    }

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    std::fs::write(&path, AppConfig::default_toml())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created config at: {}", path.display());
    println!();
    println!("Next steps:");
    println!("  1. Set servicenow.instance, user, group and anthropic.api_key");
    println!("     (or SERVICENOW_INSTANCE, SN_USER, SN_PASS, SN_GROUP, ANTHROPIC_API_KEY)");
    println!("  2. Run: incident-orchestrator doctor");
    println!("  3. Run: incident-orchestrator run --dry-run");
    Ok(())
}
