//! Origin-checked point-to-point channel built on a bus window.

use super::bus::{Envelope, MessageBus, Window};
use super::window::{OriginAllowList, WindowId};
use serde_json::Value;
use tracing::{trace, warn};

/// A document's messaging endpoint.
///
/// The origin allow-list is a required construction parameter; inbound
/// messages from any other origin never reach the receiver.
pub struct ChannelTransport {
    window: Window,
    allow_list: OriginAllowList,
}

impl ChannelTransport {
    pub fn new(window: Window, allow_list: OriginAllowList) -> Self {
        Self { window, allow_list }
    }

    pub fn local_id(&self) -> WindowId {
        self.window.id()
    }

    /// Split into a cloneable sending half and the inbound loop half.
    ///
    /// The window stays open for as long as the receiver lives.
    pub fn split(self) -> (TransportSender, TransportReceiver) {
        let sender = TransportSender {
            bus: self.window.bus().clone(),
            local: self.window.id(),
            parent: self.window.parent(),
        };
        let receiver = TransportReceiver {
            window: self.window,
            allow_list: self.allow_list,
        };
        (sender, receiver)
    }
}

/// Sending half of a [`ChannelTransport`].
#[derive(Clone)]
pub struct TransportSender {
    bus: MessageBus,
    local: WindowId,
    parent: Option<WindowId>,
}

impl TransportSender {
    /// Fire-and-forget send. A torn-down target degrades to a no-op.
    pub fn send(&self, target: WindowId, data: Value) {
        if !self.bus.post(self.local, target, data) {
            trace!("{} -> {} not delivered (target gone)", self.local, target);
        }
    }

    pub fn local_id(&self) -> WindowId {
        self.local
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    pub fn is_open(&self, target: WindowId) -> bool {
        self.bus.is_open(target)
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }
}

/// Receiving half of a [`ChannelTransport`].
pub struct TransportReceiver {
    window: Window,
    allow_list: OriginAllowList,
}

impl TransportReceiver {
    /// Next message from an allowed origin, or `None` once the window is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            let envelope = self.window.rx.recv().await?;
            if self.allow_list.is_allowed(&envelope.origin) {
                return Some(envelope);
            }
            warn!(
                "{} rejected message from {} (origin {} not allowed)",
                self.window.id(),
                envelope.source,
                envelope.origin
            );
        }
    }

    pub fn local_id(&self) -> WindowId {
        self.window.id()
    }
}
