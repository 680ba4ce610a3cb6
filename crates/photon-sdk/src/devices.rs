//! Device message listeners.
//!
//! Any number of listeners share one `devices` subscription on the shell. The
//! subscription is opened when the first listener is added and cancelled when
//! the last one leaves. Transitions are serialized, so concurrent first
//! listeners still produce a single subscription.
//!
//! A listener that fails or panics is logged and skipped; the others keep
//! receiving and the subscription stays up.

use photon_core::config::DeviceConfig;
use photon_core::models::DeviceMessage;
use photon_core::rpc::{RemoteApi, Subscription};
use photon_core::Result;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Callback invoked for each device message.
pub type DeviceListener = Arc<dyn Fn(&DeviceMessage) -> Result<()> + Send + Sync>;

type ListenerMap = Arc<Mutex<BTreeMap<u64, DeviceListener>>>;

/// The open subscription and the task fanning it out.
struct ActiveStream {
    stop: oneshot::Sender<()>,
    task: JoinHandle<Option<Subscription>>,
}

struct Inner {
    api: RemoteApi,
    listeners: ListenerMap,
    next_id: AtomicU64,
    /// Held across subscribe and cancel so transitions never interleave.
    stream: tokio::sync::Mutex<Option<ActiveStream>>,
}

impl Inner {
    fn listeners(&self) -> MutexGuard<'_, BTreeMap<u64, DeviceListener>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reference-counted device subscription for one app document.
#[derive(Clone)]
pub struct DeviceListeners {
    inner: Arc<Inner>,
}

impl DeviceListeners {
    pub fn new(api: RemoteApi) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                listeners: Arc::new(Mutex::new(BTreeMap::new())),
                next_id: AtomicU64::new(1),
                stream: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Register `listener`, subscribing on the shell if it is the first.
    ///
    /// If the subscription cannot be opened the listener is not kept.
    pub async fn add_listener<F>(&self, listener: F) -> Result<ListenerHandle>
    where
        F: Fn(&DeviceMessage) -> Result<()> + Send + Sync + 'static,
    {
        let mut stream = self.inner.stream.lock().await;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().insert(id, Arc::new(listener));

        let needs_subscription = stream.as_ref().map_or(true, |s| s.task.is_finished());
        if needs_subscription {
            match self.inner.api.subscribe(DeviceConfig::TOPIC).await {
                Ok(subscription) => {
                    info!("Subscribed to device messages ({})", subscription.id());
                    *stream = Some(spawn_fan_out(subscription, self.inner.listeners.clone()));
                }
                Err(e) => {
                    self.inner.listeners().remove(&id);
                    return Err(e);
                }
            }
        }

        debug!("Added device listener {}", id);
        Ok(ListenerHandle {
            inner: self.inner.clone(),
            id,
            removed: AtomicBool::new(false),
        })
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Whether a shell subscription is currently open.
    pub async fn is_subscribed(&self) -> bool {
        self.inner
            .stream
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }
}

/// Registration of one listener.
pub struct ListenerHandle {
    inner: Arc<Inner>,
    id: u64,
    removed: AtomicBool,
}

impl std::fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("id", &self.id)
            .field("removed", &self.removed)
            .finish()
    }
}

impl ListenerHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the listener. The last one out cancels the shell subscription.
    ///
    /// Calling this again is a no-op.
    pub async fn unsubscribe(&self) -> Result<()> {
        if self.removed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut stream = self.inner.stream.lock().await;
        let now_empty = {
            let mut listeners = self.inner.listeners();
            listeners.remove(&self.id);
            listeners.is_empty()
        };
        debug!("Removed device listener {}", self.id);
        if !now_empty {
            return Ok(());
        }

        let Some(active) = stream.take() else {
            return Ok(());
        };
        // The task may already have ended with the endpoint.
        let _ = active.stop.send(());
        match active.task.await {
            Ok(Some(subscription)) => {
                info!("Cancelling device subscription {}", subscription.id());
                subscription.cancel().await
            }
            Ok(None) => Ok(()),
            Err(e) => {
                warn!("Device fan-out task failed: {}", e);
                Ok(())
            }
        }
    }
}

fn spawn_fan_out(subscription: Subscription, listeners: ListenerMap) -> ActiveStream {
    let (stop, stop_rx) = oneshot::channel();
    let task = tokio::spawn(fan_out(subscription, listeners, stop_rx));
    ActiveStream { stop, task }
}

/// Deliver events until stopped. Hands the subscription back for cancelling.
async fn fan_out(
    mut subscription: Subscription,
    listeners: ListenerMap,
    mut stop: oneshot::Receiver<()>,
) -> Option<Subscription> {
    loop {
        tokio::select! {
            _ = &mut stop => return Some(subscription),
            event = subscription.next_event() => {
                let Some(value) = event else {
                    debug!("Device subscription {} closed", subscription.id());
                    return None;
                };
                match serde_json::from_value::<DeviceMessage>(value) {
                    Ok(message) => deliver(&listeners, &message),
                    Err(e) => warn!("Ignoring malformed device message: {}", e),
                }
            }
        }
    }
}

/// Call every listener registered right now.
fn deliver(listeners: &ListenerMap, message: &DeviceMessage) {
    let snapshot: Vec<(u64, DeviceListener)> = listeners
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(id, l)| (*id, l.clone()))
        .collect();

    for (id, listener) in snapshot {
        match catch_unwind(AssertUnwindSafe(|| listener(message))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Device listener {} failed: {}", id, e),
            Err(_) => warn!("Device listener {} panicked", id),
        }
    }
}
