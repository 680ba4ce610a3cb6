//! Caller-side proxies for APIs published by another window.

use super::endpoint::RpcEndpoint;
use crate::error::{PhotonError, Result};
use crate::transport::WindowId;
use futures::Stream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

/// Proxy for one named API on one target window.
///
/// Calls made through the proxy correlate independently, so any number may be
/// in flight at once.
#[derive(Clone)]
pub struct RemoteApi {
    endpoint: RpcEndpoint,
    api_name: String,
    target: WindowId,
    timeout: Option<Duration>,
}

impl RemoteApi {
    pub(crate) fn new(
        endpoint: RpcEndpoint,
        api_name: String,
        target: WindowId,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            endpoint,
            api_name,
            target,
            timeout,
        }
    }

    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    pub fn target(&self) -> WindowId {
        self.target
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Invoke `method` with positional `args`.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        self.endpoint
            .call(self.target, &self.api_name, method, args, self.timeout)
            .await
    }

    /// Invoke `method` and decode its result.
    pub async fn call_as<T: DeserializeOwned>(&self, method: &str, args: Vec<Value>) -> Result<T> {
        let value = self.call(method, args).await?;
        serde_json::from_value(value).map_err(|e| PhotonError::Json {
            message: format!(
                "unexpected result from {}.{}: {}",
                self.api_name, method, e
            ),
            source: Some(e),
        })
    }

    /// Open a standing event stream on `topic`.
    pub async fn subscribe(&self, topic: &str) -> Result<Subscription> {
        self.endpoint
            .subscribe(self.target, &self.api_name, topic, self.timeout)
            .await
    }
}

impl std::fmt::Debug for RemoteApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteApi")
            .field("api_name", &self.api_name)
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A live event stream.
///
/// [`cancel`](Self::cancel) waits for the publisher to confirm. Dropping the
/// subscription instead sends the unsubscribe without waiting.
pub struct Subscription {
    endpoint: RpcEndpoint,
    target: WindowId,
    api_name: String,
    topic: String,
    subscription_id: u64,
    events: mpsc::UnboundedReceiver<Value>,
    timeout: Option<Duration>,
    cancelled: bool,
}

impl Subscription {
    pub(crate) fn new(
        endpoint: RpcEndpoint,
        target: WindowId,
        api_name: String,
        topic: String,
        subscription_id: u64,
        events: mpsc::UnboundedReceiver<Value>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            endpoint,
            target,
            api_name,
            topic,
            subscription_id,
            events,
            timeout,
            cancelled: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.subscription_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Next event, or `None` once the endpoint shuts down.
    pub async fn next_event(&mut self) -> Option<Value> {
        self.events.recv().await
    }

    /// Unsubscribe at the publisher and stop local delivery.
    pub async fn cancel(mut self) -> Result<()> {
        self.cancelled = true;
        self.endpoint
            .unsubscribe(
                self.target,
                &self.api_name,
                &self.topic,
                self.subscription_id,
                self.timeout,
            )
            .await
    }
}

impl Stream for Subscription {
    type Item = Value;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Value>> {
        self.events.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("api_name", &self.api_name)
            .field("target", &self.target)
            .field("topic", &self.topic)
            .field("subscription_id", &self.subscription_id)
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancelled)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.cancelled {
            self.endpoint.drop_subscription(self.subscription_id);
        } else {
            self.endpoint.release_subscription(
                self.target,
                &self.api_name,
                &self.topic,
                self.subscription_id,
            );
        }
    }
}
