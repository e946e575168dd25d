//! Decision-unit backends for the incident orchestrator.
//!
//! All providers implement the `incident_core::Provider` trait.

pub mod anthropic;

pub use anthropic::AnthropicProvider;
