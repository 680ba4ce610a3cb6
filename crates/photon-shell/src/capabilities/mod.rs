//! The OS API published by the shell, split by domain.
//!
//! Every capability is a method on the `photon-os` API. Arguments arrive as a
//! positional JSON array; results are plain JSON values.

mod accounts;
mod apps;
mod devices;
mod prefs;
mod system;
mod user;

pub use devices::DeviceStreams;

use crate::shell::ShellState;
use async_trait::async_trait;
use photon_core::config::DeviceConfig;
use photon_core::rpc::{ApiHandler, CallContext, EventSink};
use photon_core::{PhotonError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Argument extraction helpers
// ============================================================================

/// Positional argument `index`, or an invalid-params error naming it.
pub(crate) fn arg<'a>(args: &'a [Value], index: usize, name: &str) -> Result<&'a Value> {
    args.get(index)
        .ok_or_else(|| PhotonError::invalid_params(format!("Missing required argument: {}", name)))
}

/// Extract a required string argument.
pub(crate) fn require_str_arg(args: &[Value], index: usize, name: &str) -> Result<String> {
    arg(args, index, name)?
        .as_str()
        .map(String::from)
        .ok_or_else(|| PhotonError::invalid_params(format!("Argument {} must be a string", name)))
}

/// Deserialize a required argument into `T`.
pub(crate) fn parse_arg<T: DeserializeOwned>(args: &[Value], index: usize, name: &str) -> Result<T> {
    serde_json::from_value(arg(args, index, name)?.clone())
        .map_err(|e| PhotonError::invalid_params(format!("Invalid {}: {}", name, e)))
}

/// Optional argument, `null` when absent.
pub(crate) fn optional_arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or(Value::Null)
}

// ============================================================================
// API handler
// ============================================================================

/// Handler behind [`RpcConfig::OS_API_NAME`](photon_core::RpcConfig::OS_API_NAME).
pub struct OsApi {
    state: Arc<ShellState>,
}

impl OsApi {
    pub fn new(state: Arc<ShellState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl ApiHandler for OsApi {
    async fn call(&self, ctx: &CallContext, method: &str, args: Vec<Value>) -> Result<Value> {
        debug!("OS API call {} from {}", method, ctx.source);
        let state = self.state.as_ref();

        match method {
            // ====================================================================
            // System
            // ====================================================================
            "system_homeButton" => system::home_button(state).await,

            // ====================================================================
            // Apps
            // ====================================================================
            "apps_getInstalledApps" => apps::get_installed_apps(state).await,
            "apps_launchApp" => apps::launch_app(state, &args).await,
            "apps_foregroundApp" => apps::foreground_app(state, &args).await,
            "apps_requestAppInstall" => apps::request_app_install(state, &args).await,
            "apps_requestAppUninstall" => apps::request_app_uninstall(state, &args).await,

            // ====================================================================
            // User
            // ====================================================================
            "user_getCurrentUser" => user::get_current_user(state),

            // ====================================================================
            // Preferences
            // ====================================================================
            "prefs_getSandboxed" => prefs::get_sandboxed(state, ctx, &args).await,
            "prefs_setSandboxed" => prefs::set_sandboxed(state, ctx, &args).await,
            "prefs_deleteSandboxed" => prefs::delete_sandboxed(state, ctx, &args).await,
            "prefs_getShared" => prefs::get_shared(state, &args).await,
            "prefs_setShared" => prefs::set_shared(state, &args).await,
            "prefs_deleteShared" => prefs::delete_shared(state, &args).await,

            // ====================================================================
            // Linked accounts
            // ====================================================================
            "accounts_getLinkedSecondLifeAccounts" => accounts::get_linked(state).await,
            "accounts_unlinkSecondLifeAccount" => accounts::unlink(state, &args).await,

            // ====================================================================
            // Devices
            // ====================================================================
            "devices_getRegistered" => devices::get_registered(state).await,
            "devices_sendMessage" => devices::send_message(state, &args).await,
            "devices_subscribe" => Err(PhotonError::invalid_params(format!(
                "devices_subscribe delivers a stream; subscribe to topic '{}' instead",
                DeviceConfig::TOPIC
            ))),
            "devices_unsubscribe" => Ok(devices::unsubscribe_all(state, ctx)),

            _ => Err(ctx.no_such_capability(method)),
        }
    }

    async fn subscribe(&self, ctx: &CallContext, topic: &str, sink: EventSink) -> Result<()> {
        match topic {
            DeviceConfig::TOPIC => devices::subscribe(&self.state, ctx, sink),
            _ => Err(ctx.no_such_capability(topic)),
        }
    }

    async fn unsubscribe(&self, ctx: &CallContext, topic: &str, subscription_id: u64) -> Result<()> {
        match topic {
            DeviceConfig::TOPIC => {
                devices::unsubscribe(&self.state, ctx, subscription_id);
                Ok(())
            }
            _ => Err(ctx.no_such_capability(topic)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consent::DenyAll;
    use crate::shell::Shell;
    use crate::store::MemoryStore;
    use photon_core::config::{RpcConfig, ShellConfig};
    use photon_core::models::{AppDefinition, CurrentUser};
    use photon_core::transport::{Origin, Window};
    use serde_json::json;

    fn notes() -> AppDefinition {
        AppDefinition::new("com.example.notes", "Notes", "Example", "https://notes.example/")
    }

    fn test_shell() -> Shell {
        Shell::builder()
            .user(CurrentUser::new("u1", "Resident"))
            .store(MemoryStore::new())
            .build()
            .unwrap()
    }

    fn ctx_for(window: &Window) -> CallContext {
        CallContext {
            source: window.id(),
            origin: window.origin().clone(),
            api_name: RpcConfig::OS_API_NAME.to_string(),
            request_id: 1,
        }
    }

    fn api(shell: &Shell) -> OsApi {
        OsApi::new(shell.state().clone())
    }

    #[test]
    fn test_arg_helpers() {
        let args = vec![json!("theme"), json!(3)];
        assert_eq!(require_str_arg(&args, 0, "key").unwrap(), "theme");
        assert!(matches!(
            require_str_arg(&args, 1, "key"),
            Err(PhotonError::InvalidParams { .. })
        ));
        assert!(matches!(
            arg(&args, 2, "value"),
            Err(PhotonError::InvalidParams { ref message }) if message.contains("value")
        ));
        assert_eq!(optional_arg(&args, 5), Value::Null);
        assert_eq!(parse_arg::<u32>(&args, 1, "n").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let shell = test_shell();
        let frame = shell.open_app_frame(&notes()).unwrap();

        let err = api(&shell)
            .call(&ctx_for(&frame), "apps_teleport", vec![])
            .await
            .unwrap_err();
        assert_eq!(err.to_rpc_error_code(), PhotonError::CODE_METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_install_then_launch() {
        let shell = test_shell();
        let frame = shell.open_app_frame(&notes()).unwrap();
        let ctx = ctx_for(&frame);
        let api = api(&shell);
        let app = serde_json::to_value(notes()).unwrap();

        let result = api.call(&ctx, "apps_launchApp", vec![app.clone()]).await.unwrap();
        assert_eq!(result["launched"], false);

        api.call(&ctx, "apps_requestAppInstall", vec![app.clone()])
            .await
            .unwrap();
        let installed = api.call(&ctx, "apps_getInstalledApps", vec![]).await.unwrap();
        let ids: Vec<&str> = installed
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a["bundleId"].as_str())
            .collect();
        assert_eq!(ids.first(), Some(&ShellConfig::LAUNCHER_BUNDLE_ID));
        assert!(ids.contains(&"com.example.notes"));

        let result = api.call(&ctx, "apps_launchApp", vec![app]).await.unwrap();
        assert_eq!(result["launched"], true);
        assert_eq!(result["app"]["bundleId"], "com.example.notes");
    }

    #[tokio::test]
    async fn test_install_declined() {
        let shell = Shell::builder()
            .user(CurrentUser::new("u1", "Resident"))
            .consent(DenyAll)
            .build()
            .unwrap();
        let frame = shell.open_app_frame(&notes()).unwrap();
        let app = serde_json::to_value(notes()).unwrap();

        let err = api(&shell)
            .call(&ctx_for(&frame), "apps_requestAppInstall", vec![app])
            .await
            .unwrap_err();
        assert!(matches!(err, PhotonError::InstallDeclined { .. }));
    }

    #[tokio::test]
    async fn test_system_app_cannot_be_uninstalled() {
        let shell = test_shell();
        let frame = shell.open_app_frame(&notes()).unwrap();
        let launcher = serde_json::to_value(&shell.state().system_apps()[0]).unwrap();

        let err = api(&shell)
            .call(&ctx_for(&frame), "apps_requestAppUninstall", vec![launcher])
            .await
            .unwrap_err();
        assert!(matches!(err, PhotonError::SystemAppProtected { .. }));
    }

    #[tokio::test]
    async fn test_sandboxed_prefs_require_mounted_frame() {
        let shell = test_shell();
        let stranger = shell
            .bus()
            .open_window(Origin::parse("https://stranger.example").unwrap(), None);

        let err = api(&shell)
            .call(&ctx_for(&stranger), "prefs_getSandboxed", vec![json!("theme")])
            .await
            .unwrap_err();
        assert!(matches!(err, PhotonError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_plain_devices_subscribe_is_rejected() {
        let shell = test_shell();
        let frame = shell.open_app_frame(&notes()).unwrap();

        let err = api(&shell)
            .call(&ctx_for(&frame), "devices_subscribe", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, PhotonError::InvalidParams { .. }));
    }

    #[tokio::test]
    async fn test_signed_out_user_is_unauthorized() {
        let shell = test_shell();
        shell.state().sign_out();
        let frame = shell.open_app_frame(&notes()).unwrap();

        let err = api(&shell)
            .call(&ctx_for(&frame), "user_getCurrentUser", vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, PhotonError::Unauthorized { .. }));
    }
}
