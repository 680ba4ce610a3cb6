//! Typed client for the OS API.

use crate::devices::{DeviceListeners, ListenerHandle};
use photon_core::config::RpcConfig;
use photon_core::models::{
    AppDefinition, CurrentUser, DeviceMessage, LaunchResult, LinkedAccount, PreferenceValue,
    SendMessageResult, SlDevice,
};
use photon_core::rpc::{RemoteApi, RpcEndpoint, RpcHost};
use photon_core::transport::{ChannelTransport, OriginAllowList, Window};
use photon_core::Result;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;

async fn call_unit(api: &RemoteApi, method: &str, args: Vec<Value>) -> Result<()> {
    api.call(method, args).await?;
    Ok(())
}

fn to_arg<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

/// Connection from an app document to the shell that mounted it.
///
/// # Example
///
/// ```rust,ignore
/// use photon_sdk::PhotonOs;
///
/// let os = PhotonOs::connect(window, OriginAllowList::new([shell_origin]))?;
/// let user = os.user().get_current_user().await?;
/// os.prefs().set_sandboxed("greeting", &format!("hi {}", user.display_name)).await?;
/// ```
pub struct PhotonOs {
    endpoint: RpcEndpoint,
    api: RemoteApi,
    devices: DeviceListeners,
}

impl PhotonOs {
    /// Start an endpoint on `window` and address the parent shell.
    ///
    /// `allow_list` must trust the shell's origin or every reply is dropped.
    pub fn connect(window: Window, allow_list: OriginAllowList) -> Result<Self> {
        let endpoint = RpcEndpoint::spawn(ChannelTransport::new(window, allow_list), RpcHost::new());
        Self::with_endpoint(endpoint)
    }

    /// Wrap an existing endpoint, e.g. one that also publishes app APIs.
    pub fn with_endpoint(endpoint: RpcEndpoint) -> Result<Self> {
        let api = endpoint.request_parent(RpcConfig::OS_API_NAME)?;
        let devices = DeviceListeners::new(api.clone());
        Ok(Self {
            endpoint,
            api,
            devices,
        })
    }

    /// Apply a deadline to every OS call made from here on.
    ///
    /// Device listeners already registered keep their subscription.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.api = self.api.with_timeout(timeout);
        self
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    /// Raw proxy for the OS API.
    pub fn api(&self) -> &RemoteApi {
        &self.api
    }

    pub fn system(&self) -> System<'_> {
        System { api: &self.api }
    }

    pub fn apps(&self) -> Apps<'_> {
        Apps { api: &self.api }
    }

    pub fn user(&self) -> User<'_> {
        User { api: &self.api }
    }

    pub fn prefs(&self) -> Prefs<'_> {
        Prefs { api: &self.api }
    }

    pub fn accounts(&self) -> Accounts<'_> {
        Accounts { api: &self.api }
    }

    pub fn devices(&self) -> Devices<'_> {
        Devices {
            api: &self.api,
            listeners: &self.devices,
        }
    }
}

/// Shell chrome.
pub struct System<'a> {
    api: &'a RemoteApi,
}

impl System<'_> {
    /// Return to the launcher.
    pub async fn home_button(&self) -> Result<()> {
        call_unit(self.api, "system_homeButton", vec![]).await
    }
}

/// Installed apps and their lifecycle.
pub struct Apps<'a> {
    api: &'a RemoteApi,
}

impl Apps<'_> {
    pub async fn get_installed_apps(&self) -> Result<Vec<AppDefinition>> {
        self.api.call_as("apps_getInstalledApps", vec![]).await
    }

    /// Launch `app`, or bring it forward if it is already running.
    pub async fn launch_app(&self, app: &AppDefinition) -> Result<LaunchResult> {
        self.api.call_as("apps_launchApp", vec![to_arg(app)?]).await
    }

    pub async fn foreground_app(&self, app: &AppDefinition) -> Result<()> {
        call_unit(self.api, "apps_foregroundApp", vec![to_arg(app)?]).await
    }

    pub async fn request_app_install(&self, app: &AppDefinition) -> Result<()> {
        call_unit(self.api, "apps_requestAppInstall", vec![to_arg(app)?]).await
    }

    pub async fn request_app_uninstall(&self, app: &AppDefinition) -> Result<()> {
        call_unit(self.api, "apps_requestAppUninstall", vec![to_arg(app)?]).await
    }
}

pub struct User<'a> {
    api: &'a RemoteApi,
}

impl User<'_> {
    pub async fn get_current_user(&self) -> Result<CurrentUser> {
        self.api.call_as("user_getCurrentUser", vec![]).await
    }
}

/// Preferences. Sandboxed keys are private to the calling app.
pub struct Prefs<'a> {
    api: &'a RemoteApi,
}

impl Prefs<'_> {
    async fn get(&self, method: &str, key: &str) -> Result<Option<PreferenceValue>> {
        let value = self.api.call(method, vec![json!(key)]).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn set<T: Serialize>(&self, method: &str, key: &str, value: &T) -> Result<()> {
        call_unit(self.api, method, vec![json!(key), to_arg(value)?]).await
    }

    pub async fn get_sandboxed(&self, key: &str) -> Result<Option<PreferenceValue>> {
        self.get("prefs_getSandboxed", key).await
    }

    pub async fn set_sandboxed<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set("prefs_setSandboxed", key, value).await
    }

    pub async fn delete_sandboxed(&self, key: &str) -> Result<()> {
        call_unit(self.api, "prefs_deleteSandboxed", vec![json!(key)]).await
    }

    pub async fn get_shared(&self, key: &str) -> Result<Option<PreferenceValue>> {
        self.get("prefs_getShared", key).await
    }

    pub async fn set_shared<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set("prefs_setShared", key, value).await
    }

    pub async fn delete_shared(&self, key: &str) -> Result<()> {
        call_unit(self.api, "prefs_deleteShared", vec![json!(key)]).await
    }
}

/// Linked Second Life avatars.
pub struct Accounts<'a> {
    api: &'a RemoteApi,
}

impl Accounts<'_> {
    pub async fn get_linked_second_life_accounts(&self) -> Result<Vec<LinkedAccount>> {
        self.api
            .call_as("accounts_getLinkedSecondLifeAccounts", vec![])
            .await
    }

    pub async fn unlink_second_life_account(&self, avatar_uuid: &str) -> Result<()> {
        call_unit(
            self.api,
            "accounts_unlinkSecondLifeAccount",
            vec![json!(avatar_uuid)],
        )
        .await
    }
}

/// In-world devices.
pub struct Devices<'a> {
    api: &'a RemoteApi,
    listeners: &'a DeviceListeners,
}

impl Devices<'_> {
    pub async fn get_registered(&self) -> Result<Vec<SlDevice>> {
        self.api.call_as("devices_getRegistered", vec![]).await
    }

    pub async fn send_message<T: Serialize>(
        &self,
        device_id: &str,
        message_type: &str,
        payload: &T,
    ) -> Result<SendMessageResult> {
        self.api
            .call_as(
                "devices_sendMessage",
                vec![json!(device_id), json!(message_type), to_arg(payload)?],
            )
            .await
    }

    /// Call `listener` for every device message until the handle unsubscribes.
    pub async fn add_listener<F>(&self, listener: F) -> Result<ListenerHandle>
    where
        F: Fn(&DeviceMessage) -> Result<()> + Send + Sync + 'static,
    {
        self.listeners.add_listener(listener).await
    }

    /// Listeners currently registered from this document.
    pub fn listener_count(&self) -> usize {
        self.listeners.listener_count()
    }
}
