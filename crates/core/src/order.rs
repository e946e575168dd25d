//! OrderApi trait: the order-cancellation service seen from the core.

use async_trait::async_trait;

use crate::error::OrderApiError;
use crate::incident::CancelResult;

/// Cancels customer orders.
///
/// A rejection by the service is a `CancelResult` with `success == false`;
/// `Err` is reserved for failures where the request may not have landed
/// (network errors, 5xx).
#[async_trait]
pub trait OrderApi: Send + Sync {
    fn name(&self) -> &str;

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResult, OrderApiError>;
}
