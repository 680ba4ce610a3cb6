//! Bundle id to window lookup for mounted app frames.

use crate::transport::{MessageBus, WindowId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Non-owning map from bundle id to the window hosting that app.
///
/// Entries are checked against the bus on every lookup and pruned once the
/// window is gone.
pub struct FrameRegistry {
    bus: MessageBus,
    frames: RwLock<HashMap<String, WindowId>>,
}

impl FrameRegistry {
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            frames: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `bundle_id` is mounted in `window`, replacing any earlier frame.
    pub fn attach(&self, bundle_id: impl Into<String>, window: WindowId) {
        let bundle_id = bundle_id.into();
        debug!("Frame for {} is {}", bundle_id, window);
        self.frames
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(bundle_id, window);
    }

    pub fn detach(&self, bundle_id: &str) -> Option<WindowId> {
        self.frames
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(bundle_id)
    }

    /// Live window for `bundle_id`, if its frame is still mounted.
    pub fn window_for(&self, bundle_id: &str) -> Option<WindowId> {
        let window = self
            .frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(bundle_id)
            .copied()?;
        if self.bus.is_open(window) {
            return Some(window);
        }
        debug!("Frame {} for {} is gone", window, bundle_id);
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        if frames.get(bundle_id) == Some(&window) {
            frames.remove(bundle_id);
        }
        None
    }

    /// Bundle id mounted in `window`, if any.
    pub fn bundle_for(&self, window: WindowId) -> Option<String> {
        if !self.bus.is_open(window) {
            return None;
        }
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(_, w)| **w == window)
            .map(|(bundle_id, _)| bundle_id.clone())
    }

    /// Drop every entry whose window has closed. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        let before = frames.len();
        frames.retain(|_, window| self.bus.is_open(*window));
        before - frames.len()
    }

    pub fn len(&self) -> usize {
        self.frames
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
