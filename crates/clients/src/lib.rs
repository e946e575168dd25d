//! Clients for the systems the orchestrator acts on.
//!
//! `ServiceNowClient` implements `IncidentStore` over the ServiceNow Table
//! API; `HttpOrderApi` implements `OrderApi` over the order service. The
//! in-memory variants back tests and `--dry-run`.

pub mod in_memory;
pub mod order_api;
pub mod servicenow;

pub use in_memory::{InMemoryIncidentStore, StubBehavior, StubOrderApi};
pub use order_api::HttpOrderApi;
pub use servicenow::ServiceNowClient;
