//! Persistent state behind the capability surface.
//!
//! Installed apps, preferences, linked accounts and registered devices are all
//! keyed by user id. The shell only talks to the [`ShellStore`] trait; the
//! backends are:
//!
//! - [`MemoryStore`]: process-local maps, for tests and ephemeral sessions
//! - [`SqliteStore`]: a single SQLite database in WAL mode

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use photon_core::models::{AppDefinition, LinkedAccount, PreferenceValue, SlDevice};
use photon_core::Result;
use std::fmt;

/// Namespace a preference lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrefScope {
    /// Visible to every app of the user.
    Shared,
    /// Private to one app, keyed by bundle id.
    Sandboxed(String),
}

impl PrefScope {
    /// Stable string form used as a storage key.
    pub fn as_key(&self) -> String {
        match self {
            PrefScope::Shared => "shared".to_string(),
            PrefScope::Sandboxed(bundle_id) => format!("app:{}", bundle_id),
        }
    }
}

impl fmt::Display for PrefScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

/// Storage backend for per-user shell state.
#[async_trait]
pub trait ShellStore: Send + Sync + 'static {
    /// Apps the user installed, in installation order.
    async fn installed_apps(&self, user_id: &str) -> Result<Vec<AppDefinition>>;

    /// Returns `false` if the bundle id was already installed.
    async fn install_app(&self, user_id: &str, app: &AppDefinition) -> Result<bool>;

    /// Returns `false` if the bundle id was not installed.
    async fn uninstall_app(&self, user_id: &str, bundle_id: &str) -> Result<bool>;

    async fn get_preference(
        &self,
        user_id: &str,
        scope: &PrefScope,
        key: &str,
    ) -> Result<Option<PreferenceValue>>;

    async fn set_preference(
        &self,
        user_id: &str,
        scope: &PrefScope,
        key: &str,
        value: &PreferenceValue,
    ) -> Result<()>;

    /// Returns `false` if the key was not set.
    async fn delete_preference(&self, user_id: &str, scope: &PrefScope, key: &str) -> Result<bool>;

    async fn linked_accounts(&self, user_id: &str) -> Result<Vec<LinkedAccount>>;

    /// Insert or refresh a linked avatar.
    async fn link_account(&self, user_id: &str, account: &LinkedAccount) -> Result<()>;

    /// Returns `false` if no such avatar was linked.
    async fn unlink_account(&self, user_id: &str, avatar_uuid: &str) -> Result<bool>;

    async fn registered_devices(&self, user_id: &str) -> Result<Vec<SlDevice>>;

    /// Insert or replace a device registration.
    async fn register_device(&self, user_id: &str, device: &SlDevice) -> Result<()>;

    async fn device(&self, user_id: &str, device_id: &str) -> Result<Option<SlDevice>>;

    /// User that registered `device_id`, if any.
    async fn device_owner(&self, device_id: &str) -> Result<Option<String>>;
}
