//! Error types for the incident orchestrator domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context (decision unit, tools, incident store, order API)
//! has its own error enum that folds into the top-level [`Error`].

use thiserror::Error;

/// The top-level error type for all orchestrator operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Decision unit errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Incident store errors ---
    #[error("Incident store error: {0}")]
    Store(#[from] StoreError),

    // --- Order API errors ---
    #[error("Order API error: {0}")]
    OrderApi(#[from] OrderApiError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- A tool handler stopped the loop on a contract violation ---
    #[error("Run aborted by {tool_name}: {reason}")]
    Aborted { tool_name: String, reason: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    /// The handler hit a failure worth one more round trip (network, 5xx).
    #[error("Transient failure in {tool_name}: {reason}")]
    Transient { tool_name: String, reason: String },

    /// The call broke a contract the caller must not recover from.
    /// The loop executor stops immediately instead of feeding this back.
    #[error("Aborted by {tool_name}: {reason}")]
    Aborted { tool_name: String, reason: String },
}

impl ToolError {
    /// Whether the executor may retry the same call.
    pub fn is_transient(&self) -> bool {
        matches!(self, ToolError::Transient { .. })
    }
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Incident not found: {0}")]
    NotFound(String),

    #[error("Incident store request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Incident store unreachable: {0}")]
    Network(String),

    #[error("Unexpected incident store payload: {0}")]
    InvalidPayload(String),
}

impl StoreError {
    /// Network failures and server-side errors are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Network(_) => true,
            StoreError::Api { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderApiError {
    #[error("Order API unreachable: {0}")]
    Network(String),

    #[error("Order API returned {status_code}: {message}")]
    Server { status_code: u16, message: String },
}
