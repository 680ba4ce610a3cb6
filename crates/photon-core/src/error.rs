//! Error types for Photon OS.
//!
//! Every failure the bridge can observe is a `PhotonError`. Only the rendered
//! message (plus a JSON-RPC style code) crosses a frame boundary, so callers on
//! the app side see remote failures as `PhotonError::Remote`.

use std::time::Duration;
use thiserror::Error;

use crate::transport::WindowId;

/// Main error type for Photon OS.
#[derive(Debug, Error)]
pub enum PhotonError {
    // Transport errors
    #[error("Target window {target} is no longer available")]
    TransportUnavailable { target: WindowId },

    #[error("Message from origin {origin} rejected")]
    OriginRejected { origin: String },

    #[error("Endpoint channel closed")]
    ChannelClosed,

    #[error("RPC call timed out after {0:?}")]
    Timeout(Duration),

    // RPC errors
    #[error("No such capability: {api}.{method}")]
    NoSuchCapability { api: String, method: String },

    #[error("API already registered: {name}")]
    ApiAlreadyRegistered { name: String },

    #[error("{message}")]
    Remote { message: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Lifecycle errors
    #[error("App is not running: {bundle_id}")]
    NotRunning { bundle_id: String },

    #[error("App is not installed: {bundle_id}")]
    NotInstalled { bundle_id: String },

    #[error("System app cannot be uninstalled: {bundle_id}")]
    SystemAppProtected { bundle_id: String },

    #[error("Install of {bundle_id} was declined")]
    InstallDeclined { bundle_id: String },

    // Session errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // Store errors
    #[error("Store error: {message}")]
    Store { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for Photon operations.
pub type Result<T> = std::result::Result<T, PhotonError>;

impl From<std::io::Error> for PhotonError {
    fn from(err: std::io::Error) -> Self {
        PhotonError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PhotonError {
    fn from(err: serde_json::Error) -> Self {
        PhotonError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PhotonError {
    /// JSON-RPC "method not found".
    pub const CODE_METHOD_NOT_FOUND: i32 = -32601;

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Application-defined codes:
    /// - -32000: Transport / timeout
    /// - -32005: Validation error
    /// - -32010: App not running
    /// - -32011: App not installed
    /// - -32012: System app protected
    /// - -32013: Install declined
    /// - -32014: Unauthorized or rejected origin
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            PhotonError::NoSuchCapability { .. } => Self::CODE_METHOD_NOT_FOUND,

            PhotonError::InvalidParams { .. } => -32602,

            PhotonError::TransportUnavailable { .. }
            | PhotonError::ChannelClosed
            | PhotonError::Timeout(_) => -32000,

            PhotonError::Validation { .. } => -32005,

            PhotonError::NotRunning { .. } => -32010,
            PhotonError::NotInstalled { .. } => -32011,
            PhotonError::SystemAppProtected { .. } => -32012,
            PhotonError::InstallDeclined { .. } => -32013,

            PhotonError::Unauthorized { .. } | PhotonError::OriginRejected { .. } => -32014,

            _ => -32603,
        }
    }

    /// Rebuild a caller-side error from a reply's `{code, message}` pair.
    ///
    /// Only "method not found" keeps its identity; everything else becomes a
    /// `Remote` error carrying the message string.
    pub fn from_remote(code: i32, message: impl Into<String>, api: &str, method: &str) -> Self {
        if code == Self::CODE_METHOD_NOT_FOUND {
            PhotonError::NoSuchCapability {
                api: api.to_string(),
                method: method.to_string(),
            }
        } else {
            PhotonError::Remote {
                message: message.into(),
            }
        }
    }

    /// Shorthand for an invalid-params error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        PhotonError::InvalidParams {
            message: message.into(),
        }
    }

    /// Shorthand for a store error.
    pub fn store(message: impl Into<String>) -> Self {
        PhotonError::Store {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhotonError::NotRunning {
            bundle_id: "com.example.notes".into(),
        };
        assert_eq!(err.to_string(), "App is not running: com.example.notes");
    }

    #[test]
    fn test_remote_error_displays_bare_message() {
        let err = PhotonError::Remote {
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            PhotonError::NoSuchCapability {
                api: "photon-os".into(),
                method: "nope".into()
            }
            .to_rpc_error_code(),
            -32601
        );
        assert_eq!(
            PhotonError::SystemAppProtected {
                bundle_id: "com.photon.launcher".into()
            }
            .to_rpc_error_code(),
            -32012
        );
        assert_eq!(PhotonError::Other("x".into()).to_rpc_error_code(), -32603);
    }

    #[test]
    fn test_from_remote_maps_method_not_found() {
        let err = PhotonError::from_remote(-32601, "gone", "photon-os", "apps_nope");
        assert!(matches!(err, PhotonError::NoSuchCapability { .. }));

        let err = PhotonError::from_remote(-32603, "boom", "photon-os", "apps_launchApp");
        assert!(matches!(err, PhotonError::Remote { ref message } if message == "boom"));
    }
}
