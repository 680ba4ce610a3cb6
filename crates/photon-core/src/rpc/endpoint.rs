//! Per-document RPC endpoint.
//!
//! One endpoint runs per document. It serves the document's [`RpcHost`] to
//! other windows and issues calls to APIs published elsewhere, all multiplexed
//! over a single [`ChannelTransport`].
//!
//! # Correlation
//!
//! Outstanding calls live in a map keyed by request id, so replies may arrive
//! in any order. Replies with no matching call, or from a window other than
//! the one the call went to, are dropped.

use super::events::EventSink;
use super::protocol::{RpcError, RpcMessage};
use super::registry::{CallContext, RpcHost};
use super::remote::{RemoteApi, Subscription};
use crate::config::RpcConfig;
use crate::error::{PhotonError, Result};
use crate::transport::{ChannelTransport, TransportReceiver, TransportSender, WindowId};
use futures::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Runtime options for an endpoint.
#[derive(Debug, Clone)]
pub struct EndpointOptions {
    /// Deadline applied to every outgoing call; `None` waits indefinitely.
    pub call_timeout: Option<Duration>,
}

impl Default for EndpointOptions {
    fn default() -> Self {
        Self {
            call_timeout: RpcConfig::DEFAULT_CALL_TIMEOUT,
        }
    }
}

impl EndpointOptions {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

struct PendingCall {
    tx: oneshot::Sender<Result<Value>>,
    target: WindowId,
    api_name: String,
    method_name: String,
}

struct LocalSubscription {
    source: WindowId,
    tx: mpsc::UnboundedSender<Value>,
}

struct EndpointInner {
    sender: TransportSender,
    host: RpcHost,
    options: EndpointOptions,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingCall>>,
    subscriptions: Mutex<HashMap<u64, LocalSubscription>>,
}

/// Removes a pending entry when the waiting future finishes or is dropped.
struct PendingGuard<'a> {
    inner: &'a EndpointInner,
    request_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock_pending().remove(&self.request_id);
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Handle to a running endpoint. Cheap to clone; the receive loop stops when
/// the last clone is dropped.
#[derive(Clone)]
pub struct RpcEndpoint {
    inner: Arc<EndpointInner>,
    _task: Arc<AbortOnDrop>,
}

impl RpcEndpoint {
    /// Start serving `host` over `transport` with default options.
    pub fn spawn(transport: ChannelTransport, host: RpcHost) -> Self {
        Self::spawn_with(transport, host, EndpointOptions::default())
    }

    pub fn spawn_with(transport: ChannelTransport, host: RpcHost, options: EndpointOptions) -> Self {
        let (sender, receiver) = transport.split();
        let inner = Arc::new(EndpointInner {
            sender,
            host,
            options,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        });
        let task = tokio::spawn(Self::receive_loop(inner.clone(), receiver));

        Self {
            inner,
            _task: Arc::new(AbortOnDrop(task)),
        }
    }

    pub fn local_id(&self) -> WindowId {
        self.inner.sender.local_id()
    }

    /// This document's parent window, if it is embedded.
    pub fn parent(&self) -> Option<WindowId> {
        self.inner.sender.parent()
    }

    /// The APIs this document publishes.
    pub fn host(&self) -> &RpcHost {
        &self.inner.host
    }

    pub fn options(&self) -> &EndpointOptions {
        &self.inner.options
    }

    /// Proxy for the API `api_name` published by `target`.
    pub fn request(&self, api_name: impl Into<String>, target: WindowId) -> RemoteApi {
        RemoteApi::new(
            self.clone(),
            api_name.into(),
            target,
            self.inner.options.call_timeout,
        )
    }

    /// Proxy for an API published by this document's parent.
    pub fn request_parent(&self, api_name: impl Into<String>) -> Result<RemoteApi> {
        let parent = self.parent().ok_or_else(|| PhotonError::Config {
            message: format!("{} has no parent window", self.local_id()),
        })?;
        Ok(self.request(api_name, parent))
    }

    /// Number of calls still waiting for a reply.
    pub fn pending_calls(&self) -> usize {
        self.inner.lock_pending().len()
    }

    pub(crate) async fn call(
        &self,
        target: WindowId,
        api_name: &str,
        method_name: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let request_id = self.inner.next_id();
        let message = RpcMessage::Request {
            request_id,
            api_name: api_name.to_string(),
            method_name: method_name.to_string(),
            args,
        }
        .to_value()?;
        self.inner
            .round_trip(target, request_id, api_name, method_name, message, timeout)
            .await
    }

    pub(crate) async fn subscribe(
        &self,
        target: WindowId,
        api_name: &str,
        topic: &str,
        timeout: Option<Duration>,
    ) -> Result<Subscription> {
        let subscription_id = self.inner.next_id();
        let (tx, rx) = mpsc::unbounded_channel();

        // Registered before the request goes out so early events are buffered.
        self.inner.lock_subscriptions().insert(
            subscription_id,
            LocalSubscription { source: target, tx },
        );

        let request_id = self.inner.next_id();
        let outcome = match (RpcMessage::Subscribe {
            request_id,
            api_name: api_name.to_string(),
            topic: topic.to_string(),
            subscription_id,
        })
        .to_value()
        {
            Ok(message) => {
                self.inner
                    .round_trip(target, request_id, api_name, topic, message, timeout)
                    .await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(_) => Ok(Subscription::new(
                self.clone(),
                target,
                api_name.to_string(),
                topic.to_string(),
                subscription_id,
                rx,
                timeout,
            )),
            Err(e) => {
                self.drop_subscription(subscription_id);
                Err(e)
            }
        }
    }

    pub(crate) async fn unsubscribe(
        &self,
        target: WindowId,
        api_name: &str,
        topic: &str,
        subscription_id: u64,
        timeout: Option<Duration>,
    ) -> Result<()> {
        self.drop_subscription(subscription_id);
        let request_id = self.inner.next_id();
        let message = RpcMessage::Unsubscribe {
            request_id,
            api_name: api_name.to_string(),
            topic: topic.to_string(),
            subscription_id,
        }
        .to_value()?;
        self.inner
            .round_trip(target, request_id, api_name, topic, message, timeout)
            .await?;
        Ok(())
    }

    pub(crate) fn drop_subscription(&self, subscription_id: u64) {
        self.inner.lock_subscriptions().remove(&subscription_id);
    }

    /// Stop local delivery and tell the publisher without waiting for its reply.
    pub(crate) fn release_subscription(
        &self,
        target: WindowId,
        api_name: &str,
        topic: &str,
        subscription_id: u64,
    ) {
        self.drop_subscription(subscription_id);
        let message = RpcMessage::Unsubscribe {
            request_id: self.inner.next_id(),
            api_name: api_name.to_string(),
            topic: topic.to_string(),
            subscription_id,
        };
        match message.to_value() {
            Ok(value) => {
                debug!(
                    "{} -> {}: releasing subscription {} on {}.{}",
                    self.inner.sender.local_id(),
                    target,
                    subscription_id,
                    api_name,
                    topic
                );
                self.inner.sender.send(target, value);
            }
            Err(e) => error!("Could not encode release of subscription {}: {}", subscription_id, e),
        }
    }

    async fn receive_loop(inner: Arc<EndpointInner>, mut receiver: TransportReceiver) {
        while let Some(envelope) = receiver.recv().await {
            let message = match RpcMessage::from_value(envelope.data) {
                Ok(message) => message,
                Err(e) => {
                    debug!("Ignoring non-RPC message from {}: {}", envelope.source, e);
                    continue;
                }
            };

            match message {
                RpcMessage::Request {
                    request_id,
                    api_name,
                    method_name,
                    args,
                } => {
                    let ctx = CallContext {
                        source: envelope.source,
                        origin: envelope.origin,
                        api_name,
                        request_id,
                    };
                    tokio::spawn(inner.clone().serve_call(ctx, method_name, args));
                }
                RpcMessage::Response {
                    request_id,
                    result,
                    error,
                } => inner.complete(envelope.source, request_id, result, error),
                RpcMessage::Subscribe {
                    request_id,
                    api_name,
                    topic,
                    subscription_id,
                } => {
                    let ctx = CallContext {
                        source: envelope.source,
                        origin: envelope.origin,
                        api_name,
                        request_id,
                    };
                    tokio::spawn(inner.clone().serve_subscribe(ctx, topic, subscription_id));
                }
                RpcMessage::Unsubscribe {
                    request_id,
                    api_name,
                    topic,
                    subscription_id,
                } => {
                    let ctx = CallContext {
                        source: envelope.source,
                        origin: envelope.origin,
                        api_name,
                        request_id,
                    };
                    tokio::spawn(inner.clone().serve_unsubscribe(ctx, topic, subscription_id));
                }
                RpcMessage::Event {
                    subscription_id,
                    payload,
                } => inner.deliver_event(envelope.source, subscription_id, payload),
            }
        }

        debug!("{} receive loop finished", inner.sender.local_id());
        inner.lock_pending().clear();
        inner.lock_subscriptions().clear();
    }
}

impl EndpointInner {
    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, PendingCall>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, HashMap<u64, LocalSubscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn round_trip(
        &self,
        target: WindowId,
        request_id: u64,
        api_name: &str,
        method_name: &str,
        message: Value,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(
            request_id,
            PendingCall {
                tx,
                target,
                api_name: api_name.to_string(),
                method_name: method_name.to_string(),
            },
        );
        let _guard = PendingGuard {
            inner: self,
            request_id,
        };

        debug!(
            "{} -> {}: {}.{} (#{})",
            self.sender.local_id(),
            target,
            api_name,
            method_name,
            request_id
        );
        self.sender.send(target, message);

        let reply = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| PhotonError::Timeout(limit))?,
            None => rx.await,
        };
        reply.map_err(|_| PhotonError::ChannelClosed)?
    }

    fn complete(
        &self,
        source: WindowId,
        request_id: u64,
        result: Option<Value>,
        error: Option<RpcError>,
    ) {
        let call = {
            let mut pending = self.lock_pending();
            match pending.get(&request_id) {
                Some(call) if call.target != source => {
                    warn!(
                        "Ignoring reply #{} from {}: call went to {}",
                        request_id, source, call.target
                    );
                    return;
                }
                Some(_) => pending.remove(&request_id),
                None => None,
            }
        };
        let Some(call) = call else {
            debug!("Dropping unmatched reply #{} from {}", request_id, source);
            return;
        };

        let outcome = match error {
            Some(err) => Err(PhotonError::from_remote(
                err.code,
                err.message,
                &call.api_name,
                &call.method_name,
            )),
            None => Ok(result.unwrap_or(Value::Null)),
        };
        // The caller may have stopped waiting.
        let _ = call.tx.send(outcome);
    }

    fn deliver_event(&self, source: WindowId, subscription_id: u64, payload: Value) {
        let subscriptions = self.lock_subscriptions();
        match subscriptions.get(&subscription_id) {
            Some(sub) if sub.source == source => {
                if sub.tx.send(payload).is_err() {
                    debug!("Subscription {} receiver dropped", subscription_id);
                }
            }
            Some(sub) => warn!(
                "Ignoring event for subscription {} from {} (expected {})",
                subscription_id, source, sub.source
            ),
            None => debug!(
                "Dropping event for unknown subscription {} from {}",
                subscription_id, source
            ),
        }
    }

    fn reply(&self, target: WindowId, request_id: u64, outcome: &Result<Value>) {
        match RpcMessage::response(request_id, outcome).to_value() {
            Ok(value) => self.sender.send(target, value),
            Err(e) => error!("Could not encode reply #{} for {}: {}", request_id, target, e),
        }
    }

    /// Run a handler future, turning a panic into an error reply.
    async fn guarded<F>(ctx: &CallContext, name: &str, fut: F) -> Result<Value>
    where
        F: Future<Output = Result<Value>>,
    {
        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(
                    "Handler for {}.{} panicked (request #{} from {})",
                    ctx.api_name, name, ctx.request_id, ctx.source
                );
                Err(PhotonError::Other(format!(
                    "{}.{} failed unexpectedly",
                    ctx.api_name, name
                )))
            }
        }
    }

    async fn serve_call(self: Arc<Self>, ctx: CallContext, method: String, args: Vec<Value>) {
        let outcome = Self::guarded(&ctx, &method, self.host.dispatch(&ctx, &method, args)).await;
        if let Err(ref e) = outcome {
            debug!("{}.{} from {} failed: {}", ctx.api_name, method, ctx.source, e);
        }
        self.reply(ctx.source, ctx.request_id, &outcome);
    }

    async fn serve_subscribe(self: Arc<Self>, ctx: CallContext, topic: String, subscription_id: u64) {
        let sink = EventSink::new(self.sender.clone(), ctx.source, subscription_id);
        let outcome = Self::guarded(&ctx, &topic, async {
            self.host.subscribe(&ctx, &topic, sink).await.map(|_| Value::Null)
        })
        .await;
        self.reply(ctx.source, ctx.request_id, &outcome);
    }

    async fn serve_unsubscribe(self: Arc<Self>, ctx: CallContext, topic: String, subscription_id: u64) {
        let outcome = Self::guarded(&ctx, &topic, async {
            self.host
                .unsubscribe(&ctx, &topic, subscription_id)
                .await
                .map(|_| Value::Null)
        })
        .await;
        self.reply(ctx.source, ctx.request_id, &outcome);
    }
}
