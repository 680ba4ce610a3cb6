//! In-process window table.
//!
//! # Thread Safety
//!
//! The window table sits behind a `std::sync::RwLock`; posting only takes the
//! read lock and pushes onto the target's unbounded queue, so it never awaits.

use super::window::{Origin, WindowId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// A message as seen by the receiving document.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub source: WindowId,
    /// Origin of the sending window, stamped by the bus.
    pub origin: Origin,
    pub data: Value,
}

struct WindowSlot {
    origin: Origin,
    parent: Option<WindowId>,
    tx: mpsc::UnboundedSender<Envelope>,
}

#[derive(Default)]
struct BusInner {
    windows: RwLock<HashMap<WindowId, WindowSlot>>,
    next_id: AtomicU64,
}

/// Shared table of live windows.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<WindowId, WindowSlot>> {
        self.inner
            .windows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<WindowId, WindowSlot>> {
        self.inner
            .windows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new document window. Dropping the returned [`Window`] tears it down.
    pub fn open_window(&self, origin: Origin, parent: Option<WindowId>) -> Window {
        let id = WindowId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();

        self.write().insert(
            id,
            WindowSlot {
                origin: origin.clone(),
                parent,
                tx,
            },
        );
        debug!("Opened {} ({}) parent={:?}", id, origin, parent);

        Window {
            id,
            origin,
            parent,
            bus: self.clone(),
            rx,
        }
    }

    /// Queue `data` for `target`, stamped with the origin of `source`.
    ///
    /// Returns whether the message was queued. A missing source or target is a
    /// silent no-op.
    pub fn post(&self, source: WindowId, target: WindowId, data: Value) -> bool {
        let windows = self.read();
        let Some(origin) = windows.get(&source).map(|slot| slot.origin.clone()) else {
            trace!("Dropping message from closed {}", source);
            return false;
        };
        let Some(slot) = windows.get(&target) else {
            trace!("Dropping message from {} to closed {}", source, target);
            return false;
        };
        slot.tx
            .send(Envelope {
                source,
                origin,
                data,
            })
            .is_ok()
    }

    pub fn is_open(&self, id: WindowId) -> bool {
        self.read().contains_key(&id)
    }

    pub fn parent_of(&self, id: WindowId) -> Option<WindowId> {
        self.read().get(&id).and_then(|slot| slot.parent)
    }

    pub fn origin_of(&self, id: WindowId) -> Option<Origin> {
        self.read().get(&id).map(|slot| slot.origin.clone())
    }

    pub fn window_count(&self) -> usize {
        self.read().len()
    }

    fn close(&self, id: WindowId) {
        if self.write().remove(&id).is_some() {
            debug!("Closed {}", id);
        }
    }
}

/// A live document window. Owns the window's inbound queue.
pub struct Window {
    id: WindowId,
    origin: Origin,
    parent: Option<WindowId>,
    bus: MessageBus,
    pub(crate) rx: mpsc::UnboundedReceiver<Envelope>,
}

impl Window {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("parent", &self.parent)
            .finish()
    }
}

impl Drop for Window {
    fn drop(&mut self) {
        self.bus.close(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin(s: &str) -> Origin {
        Origin::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_post_stamps_source_origin() {
        let bus = MessageBus::new();
        let host = bus.open_window(origin("https://shell.example"), None);
        let mut app = bus.open_window(origin("https://notes.example"), Some(host.id()));

        assert!(bus.post(host.id(), app.id(), json!({"hello": "app"})));

        let env = app.rx.recv().await.unwrap();
        assert_eq!(env.source, host.id());
        assert_eq!(env.origin.as_str(), "https://shell.example");
        assert_eq!(env.data["hello"], "app");
    }

    #[tokio::test]
    async fn test_post_to_closed_window_is_noop() {
        let bus = MessageBus::new();
        let host = bus.open_window(origin("https://shell.example"), None);
        let app = bus.open_window(origin("https://notes.example"), Some(host.id()));
        let app_id = app.id();

        drop(app);

        assert!(!bus.is_open(app_id));
        assert!(!bus.post(host.id(), app_id, json!(1)));
        assert_eq!(bus.window_count(), 1);
    }

    #[tokio::test]
    async fn test_fifo_per_sender_target_pair() {
        let bus = MessageBus::new();
        let host = bus.open_window(origin("https://shell.example"), None);
        let mut app = bus.open_window(origin("https://notes.example"), Some(host.id()));

        for i in 0..50 {
            bus.post(host.id(), app.id(), json!(i));
        }
        for i in 0..50 {
            assert_eq!(app.rx.recv().await.unwrap().data, json!(i));
        }
    }

    #[test]
    fn test_parent_lookup() {
        let bus = MessageBus::new();
        let host = bus.open_window(origin("https://shell.example"), None);
        let app = bus.open_window(origin("https://notes.example"), Some(host.id()));

        assert_eq!(bus.parent_of(app.id()), Some(host.id()));
        assert_eq!(bus.parent_of(host.id()), None);
        assert_eq!(app.parent(), Some(host.id()));
    }
}
