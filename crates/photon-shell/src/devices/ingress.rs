//! HTTP ingress for externally originated device messages.
//!
//! The virtual-world side posts a [`DeviceMessage`] to `POST /devices/messages`;
//! the ingress looks up which user owns the device and publishes the message
//! on that user's realtime channel.

use super::realtime::RealtimeHub;
use crate::store::ShellStore;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use photon_core::config::DeviceConfig;
use photon_core::models::DeviceMessage;
use photon_core::{PhotonError, Result};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// State shared by ingress handlers.
pub struct IngressState {
    pub hub: RealtimeHub,
    pub store: Arc<dyn ShellStore>,
    /// Shared secret expected in the ingress token header, if set.
    pub token: Option<String>,
}

/// Build the ingress router.
pub fn router(state: Arc<IngressState>) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/devices/messages", post(handle_device_message))
        .layer(ConcurrencyLimitLayer::new(DeviceConfig::INGRESS_MAX_CONCURRENT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve the ingress in the background.
///
/// Returns the bound address (useful when `port` is 0) and the server task.
pub async fn start_ingress(
    state: Arc<IngressState>,
    host: &str,
    port: u16,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| PhotonError::Config {
            message: format!("Invalid listen address {}:{}: {}", host, port, e),
        })?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    info!("Device ingress listening on {}", actual_addr);

    let app = router(state);
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Device ingress stopped: {}", e);
        }
    });

    Ok((actual_addr, task))
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn handle_device_message(
    State(state): State<Arc<IngressState>>,
    headers: HeaderMap,
    Json(message): Json<DeviceMessage>,
) -> Response {
    if let Some(expected) = state.token.as_deref() {
        let presented = headers
            .get(DeviceConfig::INGRESS_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected) {
            warn!("Rejected device message for {}: bad ingress token", message.device_id);
            return error_response(StatusCode::UNAUTHORIZED, "invalid ingress token");
        }
    }

    let owner = match state.store.device_owner(&message.device_id).await {
        Ok(Some(owner)) => owner,
        Ok(None) => {
            debug!("Device message for unknown device {}", message.device_id);
            return error_response(StatusCode::NOT_FOUND, "unknown device");
        }
        Err(e) => {
            error!("Device owner lookup failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable");
        }
    };

    let delivered = state.hub.publish(&owner, message);
    (StatusCode::ACCEPTED, Json(json!({ "delivered": delivered }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::Request;
    use photon_core::models::SlDevice;
    use tower::ServiceExt;

    async fn test_state(token: Option<&str>) -> Arc<IngressState> {
        let store = MemoryStore::new();
        store
            .register_device(
                "u1",
                &SlDevice {
                    id: "dev-1".into(),
                    name: "Door".into(),
                    object_key: "obj-1".into(),
                    is_online: true,
                    callback_url: None,
                    last_seen: None,
                },
            )
            .await
            .unwrap();
        Arc::new(IngressState {
            hub: RealtimeHub::new(),
            store: Arc::new(store),
            token: token.map(String::from),
        })
    }

    fn post_message(device_id: &str, token: Option<&str>) -> Request<Body> {
        let body = json!({
            "deviceId": device_id,
            "objectKey": "obj-1",
            "objectName": "Door",
            "type": "opened",
            "payload": {"by": "Resident"},
            "timestamp": "2024-05-01T12:00:00Z"
        });
        let mut builder = Request::builder()
            .method("POST")
            .uri("/devices/messages")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header(DeviceConfig::INGRESS_TOKEN_HEADER, token);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(test_state(None).await);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_message_reaches_owner_channel() {
        let state = test_state(None).await;
        let mut lease = state.hub.acquire("u1");
        let app = router(state.clone());

        let response = app.oneshot(post_message("dev-1", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let message = lease.recv().await.unwrap();
        assert_eq!(message.message_type, "opened");
        assert_eq!(message.payload["by"], "Resident");
    }

    #[tokio::test]
    async fn test_unknown_device_is_not_found() {
        let app = router(test_state(None).await);
        let response = app.oneshot(post_message("dev-9", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_token_is_enforced() {
        let state = test_state(Some("s3cret")).await;

        let response = router(state.clone())
            .oneshot(post_message("dev-1", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = router(state)
            .oneshot(post_message("dev-1", Some("s3cret")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
