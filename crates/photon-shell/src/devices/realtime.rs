//! Per-user realtime broadcast channels for device messages.
//!
//! At most one channel exists per user. Each subscriber holds a
//! [`RealtimeLease`]; the channel is torn down when the last lease drops.
//! Delivery is at-most-once: a message published while nobody holds a lease
//! is discarded, and receivers that fall behind skip ahead.

use photon_core::config::DeviceConfig;
use photon_core::models::DeviceMessage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

struct Channel {
    tx: broadcast::Sender<DeviceMessage>,
    leases: usize,
}

/// Owner of every realtime channel in the process.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join `user_id`'s channel, opening it if this is the first lease.
    pub fn acquire(&self, user_id: &str) -> RealtimeLease {
        let mut channels = self.lock();
        let channel = channels.entry(user_id.to_string()).or_insert_with(|| {
            info!("Opening realtime channel for user {}", user_id);
            let (tx, _) = broadcast::channel(DeviceConfig::BROADCAST_CAPACITY);
            Channel { tx, leases: 0 }
        });
        channel.leases += 1;
        debug!("User {} now has {} realtime leases", user_id, channel.leases);

        RealtimeLease {
            hub: self.clone(),
            user_id: user_id.to_string(),
            rx: channel.tx.subscribe(),
        }
    }

    /// Fan `message` out to `user_id`'s channel. Returns how many receivers got it.
    pub fn publish(&self, user_id: &str, message: DeviceMessage) -> usize {
        let channels = self.lock();
        let Some(channel) = channels.get(user_id) else {
            debug!(
                "No realtime channel for user {}; dropping message from {}",
                user_id, message.device_id
            );
            return 0;
        };
        channel.tx.send(message).unwrap_or(0)
    }

    pub fn is_open(&self, user_id: &str) -> bool {
        self.lock().contains_key(user_id)
    }

    pub fn lease_count(&self, user_id: &str) -> usize {
        self.lock().get(user_id).map(|c| c.leases).unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.lock().len()
    }

    fn release(&self, user_id: &str) {
        let mut channels = self.lock();
        let Some(channel) = channels.get_mut(user_id) else {
            return;
        };
        channel.leases = channel.leases.saturating_sub(1);
        if channel.leases == 0 {
            channels.remove(user_id);
            info!("Closed realtime channel for user {}", user_id);
        }
    }
}

/// A reference on one user's channel.
pub struct RealtimeLease {
    hub: RealtimeHub,
    user_id: String,
    rx: broadcast::Receiver<DeviceMessage>,
}

impl RealtimeLease {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Next message, or `None` once the channel is gone.
    ///
    /// Messages lost to lag are logged and skipped.
    pub async fn recv(&mut self) -> Option<DeviceMessage> {
        loop {
            match self.rx.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Realtime receiver for user {} lagged; skipped {} messages",
                        self.user_id, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for RealtimeLease {
    fn drop(&mut self) {
        self.hub.release(&self.user_id);
    }
}
