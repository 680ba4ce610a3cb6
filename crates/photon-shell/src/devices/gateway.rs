//! Outbound delivery of messages to registered devices.

use async_trait::async_trait;
use photon_core::config::DeviceConfig;
use photon_core::models::{SendMessageResult, SlDevice};
use photon_core::{PhotonError, Result};
use serde_json::{json, Value};
use tracing::{debug, warn};

/// Reaches a device on the virtual-world side.
#[async_trait]
pub trait DeviceGateway: Send + Sync + 'static {
    async fn send(
        &self,
        device: &SlDevice,
        message_type: &str,
        payload: &Value,
    ) -> Result<SendMessageResult>;
}

/// Posts `{ "type", "payload" }` to the device's callback URL.
pub struct HttpDeviceGateway {
    client: reqwest::Client,
}

impl HttpDeviceGateway {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DeviceConfig::SEND_TIMEOUT)
            .build()
            .map_err(|e| PhotonError::Config {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceGateway for HttpDeviceGateway {
    async fn send(
        &self,
        device: &SlDevice,
        message_type: &str,
        payload: &Value,
    ) -> Result<SendMessageResult> {
        if !device.is_online {
            return Ok(SendMessageResult::offline(format!(
                "Device {} is offline",
                device.name
            )));
        }
        let Some(callback_url) = device.callback_url.as_deref() else {
            return Ok(SendMessageResult::failed(format!(
                "Device {} has no callback URL",
                device.name
            )));
        };

        debug!("Sending {} to device {} at {}", message_type, device.id, callback_url);
        let response = self
            .client
            .post(callback_url)
            .json(&json!({ "type": message_type, "payload": payload }))
            .send()
            .await;

        match response {
            Ok(resp) if resp.status().is_success() => Ok(SendMessageResult::delivered()),
            Ok(resp) => {
                warn!("Device {} rejected message: HTTP {}", device.id, resp.status());
                Ok(SendMessageResult::failed(format!(
                    "Device responded with HTTP {}",
                    resp.status()
                )))
            }
            Err(e) if e.is_connect() || e.is_timeout() => {
                warn!("Device {} unreachable: {}", device.id, e);
                Ok(SendMessageResult::offline(format!(
                    "Device {} is unreachable",
                    device.name
                )))
            }
            Err(e) => Ok(SendMessageResult::failed(format!("Delivery failed: {}", e))),
        }
    }
}
