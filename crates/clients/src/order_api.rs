//! Order cancellation client.
//!
//! `POST {base_url}/cancel` with `{"order_id": ...}` and a bearer key. With
//! the localhost default base URL or no key, cancellations are simulated.

use async_trait::async_trait;
use incident_config::OrderApiConfig;
use incident_core::error::{Error, OrderApiError};
use incident_core::incident::CancelResult;
use incident_core::order::OrderApi;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct HttpOrderApi {
    base_url: String,
    api_key: String,
    stub: bool,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct CancelResponse {
    #[serde(default)]
    message: Option<String>,
}

impl HttpOrderApi {
    pub fn from_config(config: &OrderApiConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config {
                message: format!("order API HTTP client: {e}"),
            })?;
        let stub = config.is_stub();
        if stub {
            warn!(
                "Order API running in stub mode; no real cancellations will be made. \
                 Set ORDER_API_BASE_URL and ORDER_API_KEY to enable live mode"
            );
        }
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().unwrap_or_default(),
            stub,
            client,
        })
    }

    pub fn is_stub(&self) -> bool {
        self.stub
    }
}

#[async_trait]
impl OrderApi for HttpOrderApi {
    fn name(&self) -> &str {
        if self.stub { "order-api-stub" } else { "order-api" }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelResult, OrderApiError> {
        if self.stub {
            info!(order_id, "[STUB] Simulating order cancellation");
            return Ok(CancelResult::succeeded(
                order_id,
                format!("Order {order_id} cancelled successfully (stub mode)."),
            ));
        }

        let response = self
            .client
            .post(format!("{}/cancel", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "order_id": order_id }))
            .send()
            .await
            .map_err(|e| OrderApiError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 500 {
            let body = response.text().await.unwrap_or_default();
            error!(order_id, status, "Order API server error");
            return Err(OrderApiError::Server {
                status_code: status,
                message: body,
            });
        }
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = format!("HTTP error cancelling order {order_id}: {status} {body}");
            error!(order_id, status, "Order API rejected cancellation");
            return Ok(CancelResult::failed(Some(order_id.to_string()), message));
        }

        let message = response
            .json::<CancelResponse>()
            .await
            .ok()
            .and_then(|r| r.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Order {order_id} cancelled."));
        info!(order_id, %message, "Order cancelled via API");
        Ok(CancelResult::succeeded(order_id, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_mode_simulates_success() {
        let api = HttpOrderApi::from_config(&OrderApiConfig::default()).unwrap();
        assert!(api.is_stub());
        assert_eq!(api.name(), "order-api-stub");
        let result = api.cancel_order("ORD-12345").await.unwrap();
        assert!(result.success);
        assert_eq!(result.order_id.as_deref(), Some("ORD-12345"));
        assert!(result.message.contains("stub mode"));
    }

    #[test]
    fn live_mode_needs_url_and_key() {
        let config = OrderApiConfig {
            base_url: "https://orders.example.com/".into(),
            api_key: Some("key".into()),
            ..OrderApiConfig::default()
        };
        let api = HttpOrderApi::from_config(&config).unwrap();
        assert!(!api.is_stub());
        assert_eq!(api.base_url, "https://orders.example.com");
    }

    #[tokio::test]
    async fn unreachable_service_is_network_error() {
        let config = OrderApiConfig {
            base_url: "http://127.0.0.1:1".into(),
            api_key: Some("key".into()),
            timeout_secs: 2,
        };
        let api = HttpOrderApi::from_config(&config).unwrap();
        let err = api.cancel_order("ORD-1").await.unwrap_err();
        assert!(matches!(err, OrderApiError::Network(_)));
    }
}
