//! Device messaging types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message pushed from an in-world device to the owning user's apps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMessage {
    pub device_id: String,
    pub object_key: String,
    pub object_name: String,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

/// A device registered to a user.
///
/// `is_online` is advisory and may be stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlDevice {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub object_key: String,
    pub is_online: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Result of `devices_sendMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_offline: Option<bool>,
}

impl SendMessageResult {
    pub fn delivered() -> Self {
        Self {
            success: true,
            error: None,
            device_offline: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            device_offline: None,
        }
    }

    pub fn offline(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            device_offline: Some(true),
        }
    }
}
