//! In-memory store.

use super::{PrefScope, ShellStore};
use async_trait::async_trait;
use photon_core::models::{AppDefinition, LinkedAccount, PreferenceValue, SlDevice};
use photon_core::Result;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct UserData {
    apps: Vec<AppDefinition>,
    prefs: HashMap<(PrefScope, String), PreferenceValue>,
    accounts: Vec<LinkedAccount>,
    devices: Vec<SlDevice>,
}

/// Store backed by process-local maps. Contents are lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserData>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, user_id: &str, f: impl FnOnce(&UserData) -> T) -> Option<T> {
        self.lock().get(user_id).map(f)
    }

    fn write<T>(&self, user_id: &str, f: impl FnOnce(&mut UserData) -> T) -> T {
        f(self.lock().entry(user_id.to_string()).or_default())
    }
}

#[async_trait]
impl ShellStore for MemoryStore {
    async fn installed_apps(&self, user_id: &str) -> Result<Vec<AppDefinition>> {
        Ok(self.read(user_id, |u| u.apps.clone()).unwrap_or_default())
    }

    async fn install_app(&self, user_id: &str, app: &AppDefinition) -> Result<bool> {
        Ok(self.write(user_id, |u| {
            if u.apps.iter().any(|a| a.bundle_id == app.bundle_id) {
                return false;
            }
            u.apps.push(app.clone());
            true
        }))
    }

    async fn uninstall_app(&self, user_id: &str, bundle_id: &str) -> Result<bool> {
        Ok(self.write(user_id, |u| {
            let before = u.apps.len();
            u.apps.retain(|a| a.bundle_id != bundle_id);
            u.apps.len() != before
        }))
    }

    async fn get_preference(
        &self,
        user_id: &str,
        scope: &PrefScope,
        key: &str,
    ) -> Result<Option<PreferenceValue>> {
        Ok(self
            .read(user_id, |u| u.prefs.get(&(scope.clone(), key.to_string())).cloned())
            .flatten())
    }

    async fn set_preference(
        &self,
        user_id: &str,
        scope: &PrefScope,
        key: &str,
        value: &PreferenceValue,
    ) -> Result<()> {
        self.write(user_id, |u| {
            u.prefs.insert((scope.clone(), key.to_string()), value.clone())
        });
        Ok(())
    }

    async fn delete_preference(&self, user_id: &str, scope: &PrefScope, key: &str) -> Result<bool> {
        Ok(self.write(user_id, |u| {
            u.prefs.remove(&(scope.clone(), key.to_string())).is_some()
        }))
    }

    async fn linked_accounts(&self, user_id: &str) -> Result<Vec<LinkedAccount>> {
        Ok(self.read(user_id, |u| u.accounts.clone()).unwrap_or_default())
    }

    async fn link_account(&self, user_id: &str, account: &LinkedAccount) -> Result<()> {
        self.write(user_id, |u| {
            u.accounts.retain(|a| a.avatar_uuid != account.avatar_uuid);
            u.accounts.push(account.clone());
        });
        Ok(())
    }

    async fn unlink_account(&self, user_id: &str, avatar_uuid: &str) -> Result<bool> {
        Ok(self.write(user_id, |u| {
            let before = u.accounts.len();
            u.accounts.retain(|a| a.avatar_uuid != avatar_uuid);
            u.accounts.len() != before
        }))
    }

    async fn registered_devices(&self, user_id: &str) -> Result<Vec<SlDevice>> {
        Ok(self.read(user_id, |u| u.devices.clone()).unwrap_or_default())
    }

    async fn register_device(&self, user_id: &str, device: &SlDevice) -> Result<()> {
        self.write(user_id, |u| {
            match u.devices.iter_mut().find(|d| d.id == device.id) {
                Some(existing) => *existing = device.clone(),
                None => u.devices.push(device.clone()),
            }
        });
        Ok(())
    }

    async fn device(&self, user_id: &str, device_id: &str) -> Result<Option<SlDevice>> {
        Ok(self
            .read(user_id, |u| u.devices.iter().find(|d| d.id == device_id).cloned())
            .flatten())
    }

    async fn device_owner(&self, device_id: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .iter()
            .find(|(_, u)| u.devices.iter().any(|d| d.id == device_id))
            .map(|(user_id, _)| user_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn app(id: &str) -> AppDefinition {
        AppDefinition::new(id, "App", "Test", "https://app.example/")
    }

    #[tokio::test]
    async fn test_install_is_idempotent_per_user() {
        let store = MemoryStore::new();
        assert!(store.install_app("u1", &app("com.example.a")).await.unwrap());
        assert!(!store.install_app("u1", &app("com.example.a")).await.unwrap());
        assert!(store.install_app("u2", &app("com.example.a")).await.unwrap());

        assert_eq!(store.installed_apps("u1").await.unwrap().len(), 1);
        assert!(store.uninstall_app("u1", "com.example.a").await.unwrap());
        assert!(!store.uninstall_app("u1", "com.example.a").await.unwrap());
    }

    #[tokio::test]
    async fn test_preference_scopes_are_isolated() {
        let store = MemoryStore::new();
        let a = PrefScope::Sandboxed("com.example.a".into());
        let b = PrefScope::Sandboxed("com.example.b".into());

        store.set_preference("u1", &a, "theme", &json!("dark")).await.unwrap();
        assert_eq!(
            store.get_preference("u1", &a, "theme").await.unwrap(),
            Some(json!("dark"))
        );
        assert_eq!(store.get_preference("u1", &b, "theme").await.unwrap(), None);
        assert_eq!(
            store.get_preference("u1", &PrefScope::Shared, "theme").await.unwrap(),
            None
        );
        assert!(store.delete_preference("u1", &a, "theme").await.unwrap());
        assert!(!store.delete_preference("u1", &a, "theme").await.unwrap());
    }

    #[tokio::test]
    async fn test_device_owner_lookup() {
        let store = MemoryStore::new();
        let device = SlDevice {
            id: "dev-1".into(),
            name: "Door".into(),
            object_key: "obj-1".into(),
            is_online: true,
            callback_url: None,
            last_seen: None,
        };
        store.register_device("u1", &device).await.unwrap();

        assert_eq!(store.device_owner("dev-1").await.unwrap().as_deref(), Some("u1"));
        assert_eq!(store.device_owner("dev-2").await.unwrap(), None);
        assert!(store.device("u2", "dev-1").await.unwrap().is_none());
    }
}
