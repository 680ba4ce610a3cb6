//! Builder for configuring a [`Shell`].

use super::{Shell, ShellState};
use crate::capabilities::{DeviceStreams, OsApi};
use crate::consent::{AutoApprove, InstallConsent};
use crate::devices::{DeviceGateway, HttpDeviceGateway, RealtimeHub};
use crate::store::{MemoryStore, ShellStore};
use photon_core::config::{RpcConfig, ShellConfig};
use photon_core::lifecycle::{Clock, FrameRegistry, RunningApps};
use photon_core::models::{AppDefinition, CurrentUser};
use photon_core::rpc::{EndpointOptions, RpcEndpoint, RpcHost};
use photon_core::transport::{ChannelTransport, MessageBus, Origin, OriginAllowList};
use photon_core::{PhotonError, Result};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::info;
use url::Url;

/// Builder for configuring a [`Shell`].
///
/// # Example
///
/// ```rust,ignore
/// use photon_shell::{Shell, SqliteStore};
///
/// let shell = Shell::builder()
///     .shell_url("https://photon.example/")
///     .store(SqliteStore::open("photon.db")?)
///     .build()?;
/// ```
pub struct ShellBuilder {
    shell_url: Option<String>,
    bus: Option<MessageBus>,
    store: Option<Arc<dyn ShellStore>>,
    gateway: Option<Arc<dyn DeviceGateway>>,
    consent: Option<Arc<dyn InstallConsent>>,
    hub: Option<RealtimeHub>,
    user: Option<CurrentUser>,
    allowed_origins: Vec<Origin>,
    system_apps: Option<Vec<AppDefinition>>,
    clock: Option<Clock>,
    options: EndpointOptions,
}

impl Default for ShellBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ShellBuilder {
    pub fn new() -> Self {
        Self {
            shell_url: None,
            bus: None,
            store: None,
            gateway: None,
            consent: None,
            hub: None,
            user: None,
            allowed_origins: Vec::new(),
            system_apps: None,
            clock: None,
            options: EndpointOptions::default(),
        }
    }

    /// URL the shell document is served from. Its origin stamps shell messages.
    ///
    /// Default: [`ShellConfig::DEFAULT_SHELL_URL`]
    pub fn shell_url(mut self, url: impl Into<String>) -> Self {
        self.shell_url = Some(url.into());
        self
    }

    /// Share an existing bus instead of creating one.
    pub fn bus(mut self, bus: MessageBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Default: [`MemoryStore`]
    pub fn store<S: ShellStore>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_store(mut self, store: Arc<dyn ShellStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Default: [`HttpDeviceGateway`]
    pub fn gateway<G: DeviceGateway>(mut self, gateway: G) -> Self {
        self.gateway = Some(Arc::new(gateway));
        self
    }

    /// Default: [`AutoApprove`]
    pub fn consent<C: InstallConsent>(mut self, consent: C) -> Self {
        self.consent = Some(Arc::new(consent));
        self
    }

    /// Share a realtime hub, e.g. with the HTTP ingress.
    pub fn hub(mut self, hub: RealtimeHub) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Start with `user` signed in.
    pub fn user(mut self, user: CurrentUser) -> Self {
        self.user = Some(user);
        self
    }

    /// Trust an origin up front. App origins are trusted when their frame mounts.
    pub fn allow_origin(mut self, origin: Origin) -> Self {
        self.allowed_origins.push(origin);
        self
    }

    /// Replace the built-in system apps. Must include the launcher.
    pub fn system_apps(mut self, apps: Vec<AppDefinition>) -> Self {
        self.system_apps = Some(apps);
        self
    }

    /// Clock for lifecycle timestamps.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Deadline for calls the shell makes into app frames.
    ///
    /// Default: none
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_call_timeout(timeout);
        self
    }

    fn default_system_apps(base: &Url) -> Result<Vec<AppDefinition>> {
        let apps = [
            (ShellConfig::LAUNCHER_BUNDLE_ID, "Launcher", "apps/launcher/"),
            (ShellConfig::SETTINGS_BUNDLE_ID, "Settings", "apps/settings/"),
            (ShellConfig::APP_STORE_BUNDLE_ID, "App Store", "apps/appstore/"),
        ];
        apps.into_iter()
            .map(|(bundle_id, name, path)| {
                let url = base.join(path).map_err(|e| PhotonError::Config {
                    message: format!("Invalid system app path {}: {}", path, e),
                })?;
                Ok(AppDefinition::new(bundle_id, name, ShellConfig::APP_NAME, url.as_str()))
            })
            .collect()
    }

    /// Build the shell and start serving the OS API.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Result<Shell> {
        let shell_url = self
            .shell_url
            .as_deref()
            .unwrap_or(ShellConfig::DEFAULT_SHELL_URL);
        let base = Url::parse(shell_url).map_err(|e| PhotonError::Config {
            message: format!("Invalid shell URL {}: {}", shell_url, e),
        })?;
        let origin = Origin::parse(base.as_str())?;

        let system_apps = match self.system_apps {
            Some(apps) => apps,
            None => Self::default_system_apps(&base)?,
        };
        let launcher = system_apps
            .iter()
            .find(|a| a.bundle_id == ShellConfig::LAUNCHER_BUNDLE_ID)
            .cloned()
            .ok_or_else(|| PhotonError::Config {
                message: format!("System apps must include {}", ShellConfig::LAUNCHER_BUNDLE_ID),
            })?;
        let running = match self.clock {
            Some(clock) => RunningApps::with_clock(launcher, clock),
            None => RunningApps::new(launcher),
        };
        let (running_tx, _) = watch::channel(running.snapshot());
        let (events, _) = broadcast::channel(ShellConfig::EVENT_CAPACITY);

        let gateway: Arc<dyn DeviceGateway> = match self.gateway {
            Some(gateway) => gateway,
            None => Arc::new(HttpDeviceGateway::new()?),
        };

        let bus = self.bus.unwrap_or_default();
        let allow_list = OriginAllowList::new(self.allowed_origins);
        let window = bus.open_window(origin.clone(), None);
        let window_id = window.id();

        let state = Arc::new(ShellState {
            frames: FrameRegistry::new(bus.clone()),
            bus,
            window_id,
            allow_list: allow_list.clone(),
            running: Mutex::new(running),
            running_tx,
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            hub: self.hub.unwrap_or_default(),
            gateway,
            consent: self.consent.unwrap_or_else(|| Arc::new(AutoApprove)),
            session: RwLock::new(self.user),
            events,
            system_apps,
            device_streams: DeviceStreams::default(),
        });

        let host = RpcHost::new();
        host.register(RpcConfig::OS_API_NAME, OsApi::new(state.clone()))?;
        let endpoint =
            RpcEndpoint::spawn_with(ChannelTransport::new(window, allow_list), host, self.options);

        info!("Shell {} started at {}", window_id, origin);
        Ok(Shell { state, endpoint })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_system_apps_follow_shell_url() {
        let shell = ShellBuilder::new()
            .shell_url("https://photon.example/os/")
            .build()
            .unwrap();
        let apps = shell.state().system_apps();

        assert_eq!(apps.len(), 3);
        assert_eq!(apps[0].bundle_id, ShellConfig::LAUNCHER_BUNDLE_ID);
        assert_eq!(apps[0].url, "https://photon.example/os/apps/launcher/");
        assert!(apps.iter().all(|a| a.author == ShellConfig::APP_NAME));
    }

    #[tokio::test]
    async fn test_launcher_is_required() {
        let settings = AppDefinition::new(
            ShellConfig::SETTINGS_BUNDLE_ID,
            "Settings",
            ShellConfig::APP_NAME,
            "https://photon.example/settings/",
        );
        let result = ShellBuilder::new().system_apps(vec![settings]).build();
        assert!(matches!(result, Err(PhotonError::Config { .. })));
    }

    #[tokio::test]
    async fn test_invalid_shell_url() {
        let result = ShellBuilder::new().shell_url("not a url").build();
        assert!(matches!(result, Err(PhotonError::Config { .. })));
    }

    #[tokio::test]
    async fn test_launcher_runs_in_foreground() {
        let shell = ShellBuilder::new().build().unwrap();
        let running = shell.running_apps().borrow().clone();

        assert_eq!(running.len(), 1);
        assert_eq!(running[0].bundle_id(), ShellConfig::LAUNCHER_BUNDLE_ID);
        assert!(!running[0].is_in_background);
    }
}
