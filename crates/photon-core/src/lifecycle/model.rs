//! Running-app state for the host shell.
//!
//! At most one instance is in the foreground after any transition. The
//! launcher is running from construction and cannot be closed.

use crate::error::{PhotonError, Result};
use crate::models::{AppDefinition, RunningAppInstance};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Clock used to stamp transitions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Ordered set of running app instances, keyed by bundle id.
///
/// Insertion order is kept so that ties on `last_foregrounded_at` resolve to
/// the most recently launched instance.
pub struct RunningApps {
    launcher_id: String,
    instances: Vec<RunningAppInstance>,
    clock: Clock,
}

impl RunningApps {
    pub fn new(launcher: AppDefinition) -> Self {
        Self::with_clock(launcher, Arc::new(Utc::now))
    }

    pub fn with_clock(launcher: AppDefinition, clock: Clock) -> Self {
        let now = clock();
        let launcher_id = launcher.bundle_id.clone();
        Self {
            launcher_id,
            instances: vec![RunningAppInstance {
                definition: launcher,
                started_at: now,
                last_foregrounded_at: now,
                is_in_background: false,
            }],
            clock,
        }
    }

    pub fn launcher_id(&self) -> &str {
        &self.launcher_id
    }

    fn position(&self, bundle_id: &str) -> Option<usize> {
        self.instances.iter().position(|i| i.bundle_id() == bundle_id)
    }

    /// Bring the instance at `index` to the front and push everything else back.
    fn promote(&mut self, index: usize) {
        let now = (self.clock)();
        for (i, instance) in self.instances.iter_mut().enumerate() {
            if i == index {
                instance.is_in_background = false;
                instance.last_foregrounded_at = now;
            } else {
                instance.is_in_background = true;
            }
        }
    }

    /// Start `app`, or foreground it if it is already running.
    ///
    /// Returns `true` when a new instance was created.
    pub fn launch(&mut self, app: &AppDefinition) -> bool {
        if let Some(index) = self.position(&app.bundle_id) {
            debug!("{} already running, foregrounding", app.bundle_id);
            self.promote(index);
            return false;
        }

        let now = (self.clock)();
        for instance in &mut self.instances {
            instance.is_in_background = true;
        }
        self.instances.push(RunningAppInstance {
            definition: app.clone(),
            started_at: now,
            last_foregrounded_at: now,
            is_in_background: false,
        });
        debug!("Launched {}", app.bundle_id);
        true
    }

    /// Make a running app the foreground app.
    pub fn foreground(&mut self, bundle_id: &str) -> Result<()> {
        let index = self
            .position(bundle_id)
            .ok_or_else(|| PhotonError::NotRunning {
                bundle_id: bundle_id.to_string(),
            })?;
        self.promote(index);
        Ok(())
    }

    /// Close a running app. Closing the launcher or an unknown app does nothing.
    ///
    /// If the closed app was the only foreground instance, the most recently
    /// foregrounded survivor is promoted.
    pub fn close(&mut self, bundle_id: &str) -> Option<RunningAppInstance> {
        if bundle_id == self.launcher_id {
            debug!("Ignoring close of launcher {}", bundle_id);
            return None;
        }
        let index = self.position(bundle_id)?;
        let closed = self.instances.remove(index);

        if self.instances.iter().all(|i| i.is_in_background) {
            // max_by_key keeps the last maximum, so later launches win ties.
            let next = self
                .instances
                .iter()
                .enumerate()
                .max_by_key(|(_, i)| i.last_foregrounded_at)
                .map(|(index, _)| index);
            if let Some(index) = next {
                self.promote(index);
            }
        }
        debug!("Closed {}", bundle_id);
        Some(closed)
    }

    pub fn get(&self, bundle_id: &str) -> Option<&RunningAppInstance> {
        self.instances.iter().find(|i| i.bundle_id() == bundle_id)
    }

    pub fn is_running(&self, bundle_id: &str) -> bool {
        self.position(bundle_id).is_some()
    }

    pub fn foreground_app(&self) -> Option<&RunningAppInstance> {
        self.instances.iter().find(|i| !i.is_in_background)
    }

    pub fn instances(&self) -> &[RunningAppInstance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn snapshot(&self) -> Vec<RunningAppInstance> {
        self.instances.clone()
    }
}

impl std::fmt::Debug for RunningApps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunningApps")
            .field("launcher_id", &self.launcher_id)
            .field("instances", &self.instances)
            .finish()
    }
}
