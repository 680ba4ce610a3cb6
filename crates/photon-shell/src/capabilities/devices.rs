//! Device capability handlers and the per-subscription forwarding tasks.

use super::{optional_arg, require_str_arg};
use crate::shell::ShellState;
use photon_core::models::SendMessageResult;
use photon_core::rpc::{CallContext, EventSink};
use photon_core::transport::WindowId;
use photon_core::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

type StreamKey = (WindowId, u64);

/// Forwarding tasks for live `devices` subscriptions, keyed by subscriber
/// window and subscription id. Dropping the set stops every stream.
#[derive(Default)]
pub struct DeviceStreams {
    tasks: Mutex<HashMap<StreamKey, JoinHandle<()>>>,
}

impl DeviceStreams {
    fn lock(&self) -> MutexGuard<'_, HashMap<StreamKey, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn insert(&self, key: StreamKey, task: JoinHandle<()>) {
        let mut tasks = self.lock();
        tasks.retain(|_, t| !t.is_finished());
        if let Some(previous) = tasks.insert(key, task) {
            previous.abort();
        }
    }

    fn cancel(&self, key: StreamKey) -> bool {
        match self.lock().remove(&key) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    fn cancel_all_for(&self, window: WindowId) -> usize {
        let mut tasks = self.lock();
        let keys: Vec<StreamKey> = tasks.keys().filter(|(w, _)| *w == window).copied().collect();
        for key in &keys {
            if let Some(task) = tasks.remove(key) {
                task.abort();
            }
        }
        keys.len()
    }

    /// Stop every stream. Returns how many were running.
    pub fn clear(&self) -> usize {
        let mut tasks = self.lock();
        let running = tasks.values().filter(|t| !t.is_finished()).count();
        for (_, task) in tasks.drain() {
            task.abort();
        }
        running
    }

    /// Streams still forwarding.
    pub fn active(&self) -> usize {
        self.lock().values().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for DeviceStreams {
    fn drop(&mut self) {
        self.clear();
    }
}

pub async fn get_registered(state: &ShellState) -> Result<Value> {
    let user = state.current_user()?;
    let devices = state.store().registered_devices(&user.id).await?;
    Ok(serde_json::to_value(devices)?)
}

pub async fn send_message(state: &ShellState, args: &[Value]) -> Result<Value> {
    let device_id = require_str_arg(args, 0, "deviceId")?;
    let message_type = require_str_arg(args, 1, "type")?;
    let payload = optional_arg(args, 2);
    let user = state.current_user()?;

    let result = match state.store().device(&user.id, &device_id).await? {
        Some(device) => state.gateway().send(&device, &message_type, &payload).await?,
        None => SendMessageResult::failed(format!("Unknown device: {}", device_id)),
    };
    Ok(serde_json::to_value(result)?)
}

/// Open a device stream for the caller.
///
/// The realtime lease is taken before this returns, so every message published
/// after the subscription is acknowledged reaches the subscriber.
pub fn subscribe(state: &ShellState, ctx: &CallContext, sink: EventSink) -> Result<()> {
    let user = state.current_user()?;
    let mut lease = state.hub().acquire(&user.id);
    let key = (ctx.source, sink.subscription_id());
    info!("Device stream {} opened for {} by {}", key.1, user.id, ctx.source);

    let task = tokio::spawn(async move {
        while let Some(message) = lease.recv().await {
            if let Err(e) = sink.emit_json(&message) {
                debug!("Device stream {} ended: {}", sink.subscription_id(), e);
                break;
            }
        }
    });
    state.device_streams().insert(key, task);
    Ok(())
}

pub fn unsubscribe(state: &ShellState, ctx: &CallContext, subscription_id: u64) {
    if state.device_streams().cancel((ctx.source, subscription_id)) {
        info!("Device stream {} closed by {}", subscription_id, ctx.source);
    } else {
        debug!("Device stream {} from {} was not open", subscription_id, ctx.source);
    }
}

/// Stop every device stream the calling window holds.
pub fn unsubscribe_all(state: &ShellState, ctx: &CallContext) -> Value {
    let stopped = state.device_streams().cancel_all_for(ctx.source);
    debug!("Stopped {} device streams for {}", stopped, ctx.source);
    Value::Null
}
