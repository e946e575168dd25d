//! Configuration loading, validation, and management for the incident orchestrator.
//!
//! Loads configuration from `~/.incident-orchestrator/config.toml` (or an
//! explicit path) with environment variable overrides. Validates all settings
//! at startup; the resulting [`AppConfig`] is immutable and handed to each
//! component at construction.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub servicenow: ServiceNowConfig,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    #[serde(default)]
    pub order_api: OrderApiConfig,

    /// Model identifier per agent role
    #[serde(default)]
    pub models: ModelsConfig,

    /// Business rules: escalation threshold, category value, engineer identity
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub poller: PollerConfig,
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceNowConfig {
    /// Instance host, e.g. "dev12345.service-now.com"
    #[serde(default)]
    pub instance: String,

    #[serde(default)]
    pub user: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Assignment group whose queue is polled
    #[serde(default)]
    pub group: String,

    /// Field holding the problem correlation code
    #[serde(default = "default_pcc_field")]
    pub pcc_field: String,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_pcc_field() -> String {
    "u_problem_correlation_code".into()
}
fn default_http_timeout() -> u64 {
    30
}

impl ServiceNowConfig {
    /// Base URL of the instance, tolerating a configured scheme.
    pub fn base_url(&self) -> String {
        let instance = self.instance.trim().trim_end_matches('/');
        if instance.starts_with("http://") || instance.starts_with("https://") {
            instance.to_string()
        } else {
            format!("https://{instance}")
        }
    }
}

impl Default for ServiceNowConfig {
    fn default() -> Self {
        Self {
            instance: String::new(),
            user: String::new(),
            password: None,
            group: String::new(),
            pcc_field: default_pcc_field(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl std::fmt::Debug for ServiceNowConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceNowConfig")
            .field("instance", &self.instance)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("group", &self.group)
            .field("pcc_field", &self.pcc_field)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_anthropic_url")]
    pub api_url: String,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com/v1/messages".into()
}
fn default_provider_timeout() -> u64 {
    120
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_anthropic_url(),
            temperature: 0.0,
            timeout_secs: default_provider_timeout(),
        }
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Base URL that puts the order client in simulated mode.
pub const ORDER_API_STUB_URL: &str = "http://localhost:9999";

#[derive(Clone, Serialize, Deserialize)]
pub struct OrderApiConfig {
    #[serde(default = "default_order_api_url")]
    pub base_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

fn default_order_api_url() -> String {
    ORDER_API_STUB_URL.into()
}

impl OrderApiConfig {
    /// No real endpoint or no credentials: cancellations are simulated.
    pub fn is_stub(&self) -> bool {
        self.base_url.trim_end_matches('/') == ORDER_API_STUB_URL
            || self.api_key.as_deref().is_none_or(|k| k.trim().is_empty())
    }
}

impl Default for OrderApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_order_api_url(),
            api_key: None,
            timeout_secs: default_http_timeout(),
        }
    }
}

impl std::fmt::Debug for OrderApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderApiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &redact(&self.api_key))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_orchestrator_model")]
    pub orchestrator: String,

    #[serde(default = "default_reasoning_model")]
    pub triage: String,

    #[serde(default = "default_fast_model")]
    pub ci_validation: String,

    #[serde(default = "default_fast_model")]
    pub priority: String,

    #[serde(default = "default_fast_model")]
    pub order_cancellation: String,

    #[serde(default = "default_reasoning_model")]
    pub resolution: String,
}

fn default_orchestrator_model() -> String {
    "claude-opus-4-5".into()
}
fn default_reasoning_model() -> String {
    "claude-3-5-sonnet-20241022".into()
}
fn default_fast_model() -> String {
    "claude-3-5-haiku-20241022".into()
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            orchestrator: default_orchestrator_model(),
            triage: default_reasoning_model(),
            ci_validation: default_fast_model(),
            priority: default_fast_model(),
            order_cancellation: default_fast_model(),
            resolution: default_reasoning_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Escalate when the order value is strictly above this amount
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: f64,

    /// Correlation code written on escalation
    #[serde(default = "default_category_a")]
    pub category_a: String,

    /// Identity incidents are assigned to
    #[serde(default = "default_engineer_name")]
    pub engineer_name: String,
}

fn default_escalation_threshold() -> f64 {
    5000.0
}
fn default_category_a() -> String {
    "CAT A".into()
}
fn default_engineer_name() -> String {
    "Incident Orchestrator Bot".into()
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: default_escalation_threshold(),
            category_a: default_category_a(),
            engineer_name: default_engineer_name(),
        }
    }
}

/// Who drives the specialist sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorMode {
    /// A coordinator decision unit requests each step; the sequencer polices it
    #[default]
    Agentic,
    /// The sequencer runs every step itself
    Deterministic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub mode: OrchestratorMode,

    #[serde(default = "default_specialist_max_tokens")]
    pub specialist_max_tokens: u32,

    #[serde(default = "default_coordinator_max_tokens")]
    pub coordinator_max_tokens: u32,

    /// Extra attempts for a tool call that reported a transient failure
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_specialist_max_tokens() -> u32 {
    4096
}
fn default_coordinator_max_tokens() -> u32 {
    8192
}
fn default_transient_retries() -> u32 {
    1
}
fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            mode: OrchestratorMode::default(),
            specialist_max_tokens: default_specialist_max_tokens(),
            coordinator_max_tokens: default_coordinator_max_tokens(),
            transient_retries: default_transient_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_poll_interval")]
    pub interval_seconds: u64,

    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
}

fn default_poll_interval() -> u64 {
    60
}
fn default_max_concurrent_runs() -> usize {
    4
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_poll_interval(),
            max_concurrent_runs: default_max_concurrent_runs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(None)
    }

    /// Load from `path` (or the default path), then apply environment overrides.
    pub fn load_with(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| Self::config_dir().join("config.toml"));
        let mut config = Self::read_file(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides. Environment values take priority over the file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SERVICENOW_INSTANCE") {
            self.servicenow.instance = v;
        }
        if let Some(v) = get("SN_USER") {
            self.servicenow.user = v;
        }
        if let Some(v) = get("SN_PASS") {
            self.servicenow.password = Some(v);
        }
        if let Some(v) = get("SN_GROUP") {
            self.servicenow.group = v;
        }
        if let Some(v) = get("SN_PCC_FIELD") {
            self.servicenow.pcc_field = v;
        }
        if let Some(v) = get("ANTHROPIC_API_KEY") {
            self.anthropic.api_key = Some(v);
        }
        if let Some(v) = get("ORDER_API_BASE_URL") {
            self.order_api.base_url = v;
        }
        if let Some(v) = get("ORDER_API_KEY") {
            self.order_api.api_key = Some(v);
        }
        if let Some(v) = get("ENGINEER_NAME") {
            self.policy.engineer_name = v;
        }
        if let Some(v) = get("POLL_INTERVAL_SECONDS") {
            self.poller.interval_seconds = v.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "POLL_INTERVAL_SECONDS must be a positive integer, got '{v}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".incident-orchestrator")
    }

    /// Validate settings that every mode depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let policy = &self.policy;
        if !policy.escalation_threshold.is_finite() || policy.escalation_threshold < 0.0 {
            return Err(ConfigError::ValidationError(
                "policy.escalation_threshold must be a non-negative number".into(),
            ));
        }
        if policy.category_a.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "policy.category_a must not be empty".into(),
            ));
        }
        if policy.engineer_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "policy.engineer_name must not be empty".into(),
            ));
        }
        if self.servicenow.pcc_field.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "servicenow.pcc_field must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.anthropic.temperature) {
            return Err(ConfigError::ValidationError(
                "anthropic.temperature must be between 0.0 and 1.0".into(),
            ));
        }
        if self.poller.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "poller.interval_seconds must be > 0".into(),
            ));
        }
        if self.poller.max_concurrent_runs == 0 {
            return Err(ConfigError::ValidationError(
                "poller.max_concurrent_runs must be > 0".into(),
            ));
        }
        if self.orchestrator.specialist_max_tokens == 0 || self.orchestrator.coordinator_max_tokens == 0
        {
            return Err(ConfigError::ValidationError(
                "orchestrator max token limits must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Validate the credentials needed to talk to live services.
    pub fn validate_live(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        if self.servicenow.instance.trim().is_empty() {
            missing.push("SERVICENOW_INSTANCE");
        }
        if self.servicenow.user.trim().is_empty() {
            missing.push("SN_USER");
        }
        if self.servicenow.password.is_none() {
            missing.push("SN_PASS");
        }
        if self.servicenow.group.trim().is_empty() {
            missing.push("SN_GROUP");
        }
        if self.anthropic.api_key.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingSettings(missing.join(", ")))
        }
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("Missing required settings: {0}")]
    MissingSettings(String),
}
