//! Host-side handle for pushing events to a subscriber.

use super::protocol::RpcMessage;
use crate::error::{PhotonError, Result};
use crate::transport::{TransportSender, WindowId};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

/// Delivers `event` messages for one subscription to the subscribing window.
#[derive(Clone)]
pub struct EventSink {
    sender: TransportSender,
    target: WindowId,
    subscription_id: u64,
}

impl EventSink {
    pub(crate) fn new(sender: TransportSender, target: WindowId, subscription_id: u64) -> Self {
        Self {
            sender,
            target,
            subscription_id,
        }
    }

    /// Push one event. Returns `false` once the subscriber's window is gone.
    pub fn emit(&self, payload: Value) -> bool {
        if !self.is_open() {
            return false;
        }
        let message = RpcMessage::Event {
            subscription_id: self.subscription_id,
            payload,
        };
        match message.to_value() {
            Ok(value) => {
                self.sender.send(self.target, value);
                true
            }
            Err(e) => {
                warn!("Could not encode event for {}: {}", self.target, e);
                true
            }
        }
    }

    /// Serialize and push one event, failing once the subscriber is gone.
    pub fn emit_json<T: Serialize>(&self, payload: &T) -> Result<()> {
        if self.emit(serde_json::to_value(payload)?) {
            Ok(())
        } else {
            Err(PhotonError::TransportUnavailable {
                target: self.target,
            })
        }
    }

    pub fn is_open(&self) -> bool {
        self.sender.is_open(self.target)
    }

    pub fn target(&self) -> WindowId {
        self.target
    }

    pub fn subscription_id(&self) -> u64 {
        self.subscription_id
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("target", &self.target)
            .field("subscription_id", &self.subscription_id)
            .finish()
    }
}
