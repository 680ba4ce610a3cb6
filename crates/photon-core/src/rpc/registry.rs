//! Named API registration for one document.
//!
//! An [`RpcHost`] maps API names to [`ApiHandler`]s. Each document constructs
//! its own host and hands it to its [`RpcEndpoint`](super::RpcEndpoint); there
//! is no process-wide registry.

use super::events::EventSink;
use crate::error::{PhotonError, Result};
use crate::transport::{Origin, WindowId};
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Who is calling, and on which API.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// Window the request came from.
    pub source: WindowId,
    /// Origin of `source`, stamped by the transport.
    pub origin: Origin,
    pub api_name: String,
    pub request_id: u64,
}

impl CallContext {
    pub fn no_such_capability(&self, method: &str) -> PhotonError {
        PhotonError::NoSuchCapability {
            api: self.api_name.clone(),
            method: method.to_string(),
        }
    }
}

/// Implementation behind a published API name.
///
/// Arguments and results are plain JSON data. Standing event streams go
/// through [`subscribe`](ApiHandler::subscribe) instead of callback arguments.
#[async_trait::async_trait]
pub trait ApiHandler: Send + Sync + 'static {
    async fn call(&self, ctx: &CallContext, method: &str, args: Vec<Value>) -> Result<Value>;

    /// Start pushing events for `topic` through `sink`.
    async fn subscribe(&self, ctx: &CallContext, topic: &str, sink: EventSink) -> Result<()> {
        let _ = sink;
        Err(ctx.no_such_capability(topic))
    }

    /// Stop the subscription `subscription_id` on `topic`.
    async fn unsubscribe(&self, ctx: &CallContext, topic: &str, subscription_id: u64) -> Result<()> {
        let _ = subscription_id;
        Err(ctx.no_such_capability(topic))
    }
}

type MethodFn = Arc<dyn Fn(CallContext, Vec<Value>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// An [`ApiHandler`] assembled from named async closures.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, MethodFn>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CallContext, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let method: MethodFn = Arc::new(
            move |ctx: CallContext, args: Vec<Value>| -> BoxFuture<'static, Result<Value>> {
                Box::pin(f(ctx, args))
            },
        );
        self.methods.insert(name.into(), method);
        self
    }

    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[async_trait::async_trait]
impl ApiHandler for MethodTable {
    async fn call(&self, ctx: &CallContext, method: &str, args: Vec<Value>) -> Result<Value> {
        let f = self
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| ctx.no_such_capability(method))?;
        f(ctx.clone(), args).await
    }
}

/// Per-document table of published APIs.
#[derive(Clone, Default)]
pub struct RpcHost {
    apis: Arc<RwLock<HashMap<String, Arc<dyn ApiHandler>>>>,
}

impl RpcHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `handler` under `name`, replacing any earlier registration.
    ///
    /// Last writer wins; an overwrite is logged. Use [`register`](Self::register)
    /// to refuse overwrites or [`replace`](Self::replace) to take the old handler back.
    pub fn set<H: ApiHandler>(&self, name: impl Into<String>, handler: H) {
        let name = name.into();
        if self.replace(name.clone(), handler).is_some() {
            warn!("API '{}' re-registered; previous handler replaced", name);
        }
    }

    /// Publish `handler` under `name`, failing if the name is taken.
    pub fn register<H: ApiHandler>(&self, name: impl Into<String>, handler: H) -> Result<()> {
        let name = name.into();
        let mut apis = self.apis.write().unwrap_or_else(PoisonError::into_inner);
        if apis.contains_key(&name) {
            return Err(PhotonError::ApiAlreadyRegistered { name });
        }
        debug!("Registered API '{}'", name);
        apis.insert(name, Arc::new(handler));
        Ok(())
    }

    /// Swap in `handler` under `name`, returning the previous handler.
    pub fn replace<H: ApiHandler>(
        &self,
        name: impl Into<String>,
        handler: H,
    ) -> Option<Arc<dyn ApiHandler>> {
        let name = name.into();
        debug!("Publishing API '{}'", name);
        self.apis
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(handler))
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ApiHandler>> {
        self.apis
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn handler_for(&self, ctx: &CallContext, method: &str) -> Result<Arc<dyn ApiHandler>> {
        self.get(&ctx.api_name)
            .ok_or_else(|| ctx.no_such_capability(method))
    }

    pub async fn dispatch(&self, ctx: &CallContext, method: &str, args: Vec<Value>) -> Result<Value> {
        self.handler_for(ctx, method)?.call(ctx, method, args).await
    }

    pub async fn subscribe(&self, ctx: &CallContext, topic: &str, sink: EventSink) -> Result<()> {
        self.handler_for(ctx, topic)?.subscribe(ctx, topic, sink).await
    }

    pub async fn unsubscribe(&self, ctx: &CallContext, topic: &str, subscription_id: u64) -> Result<()> {
        self.handler_for(ctx, topic)?
            .unsubscribe(ctx, topic, subscription_id)
            .await
    }
}
