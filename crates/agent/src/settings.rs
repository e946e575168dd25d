//! The slice of configuration the dispatch engine runs with.

use incident_config::{AppConfig, ModelsConfig, OrchestratorConfig, PolicyConfig};

/// Immutable settings handed to the orchestrator at construction.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub models: ModelsConfig,
    pub policy: PolicyConfig,
    pub orchestrator: OrchestratorConfig,
    pub temperature: f32,
    pub pcc_field: String,
}

impl AgentSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            models: config.models.clone(),
            policy: config.policy.clone(),
            orchestrator: config.orchestrator.clone(),
            temperature: config.anthropic.temperature,
            pcc_field: config.servicenow.pcc_field.clone(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}
