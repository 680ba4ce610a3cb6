//! Wire messages exchanged between RPC endpoints.
//!
//! Every message is a JSON object tagged by `kind`:
//!
//! ```text
//! {"kind":"request","requestId":7,"apiName":"photon-os","methodName":"apps_getInstalledApps","args":[]}
//! {"kind":"response","requestId":7,"result":[...]}
//! {"kind":"response","requestId":8,"error":{"code":-32603,"message":"boom"}}
//! {"kind":"subscribe","requestId":9,"apiName":"photon-os","topic":"devices","subscriptionId":5}
//! {"kind":"event","subscriptionId":5,"payload":{...}}
//! ```

use crate::error::{PhotonError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message on an RPC channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RpcMessage {
    Request {
        request_id: u64,
        api_name: String,
        method_name: String,
        #[serde(default)]
        args: Vec<Value>,
    },
    Response {
        request_id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
    Subscribe {
        request_id: u64,
        api_name: String,
        topic: String,
        subscription_id: u64,
    },
    Unsubscribe {
        request_id: u64,
        api_name: String,
        topic: String,
        subscription_id: u64,
    },
    Event {
        subscription_id: u64,
        #[serde(default)]
        payload: Value,
    },
}

/// Error carried by a response. Only the code and message cross the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcMessage {
    /// Build the response for a finished call.
    pub fn response(request_id: u64, outcome: &Result<Value>) -> Self {
        match outcome {
            Ok(value) => RpcMessage::Response {
                request_id,
                result: Some(value.clone()),
                error: None,
            },
            Err(e) => RpcMessage::Response {
                request_id,
                result: None,
                error: Some(RpcError {
                    code: e.to_rpc_error_code(),
                    message: e.to_string(),
                }),
            },
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| PhotonError::Json {
            message: format!("not an RPC message: {}", e),
            source: Some(e),
        })
    }
}
