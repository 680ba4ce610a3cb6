//! The host shell document.
//!
//! A [`Shell`] owns the top-level window on the bus, publishes the OS API on
//! it and holds every piece of host state the capabilities touch. App frames
//! are opened as children of the shell window; their origins are added to the
//! shell's allow-list as they are mounted.

mod builder;

pub use builder::ShellBuilder;

use crate::capabilities::DeviceStreams;
use crate::consent::InstallConsent;
use crate::devices::{DeviceGateway, RealtimeHub};
use crate::store::ShellStore;
use photon_core::config::ShellConfig;
use photon_core::lifecycle::{FrameRegistry, RunningApps};
use photon_core::models::{AppDefinition, CurrentUser, LaunchResult, RunningAppInstance};
use photon_core::rpc::{CallContext, RemoteApi, RpcEndpoint};
use photon_core::transport::{
    FrameLink, FrameLinkHandle, MessageBus, Origin, OriginAllowList, Window, WindowId,
};
use photon_core::{PhotonError, Result};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info};

/// Notifications for shell chrome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    HomeRequested,
    AppLaunched { bundle_id: String },
    AppForegrounded { bundle_id: String },
    AppClosed { bundle_id: String },
    AppInstalled { bundle_id: String },
    AppUninstalled { bundle_id: String },
    SessionChanged { user: Option<CurrentUser> },
}

/// Host state shared by the OS API handlers.
pub struct ShellState {
    bus: MessageBus,
    window_id: WindowId,
    allow_list: OriginAllowList,
    running: Mutex<RunningApps>,
    running_tx: watch::Sender<Vec<RunningAppInstance>>,
    frames: FrameRegistry,
    store: Arc<dyn ShellStore>,
    hub: RealtimeHub,
    gateway: Arc<dyn DeviceGateway>,
    consent: Arc<dyn InstallConsent>,
    session: RwLock<Option<CurrentUser>>,
    events: broadcast::Sender<ShellEvent>,
    system_apps: Vec<AppDefinition>,
    device_streams: DeviceStreams,
}

impl ShellState {
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    pub fn allow_list(&self) -> &OriginAllowList {
        &self.allow_list
    }

    pub fn frames(&self) -> &FrameRegistry {
        &self.frames
    }

    pub fn store(&self) -> &Arc<dyn ShellStore> {
        &self.store
    }

    pub fn hub(&self) -> &RealtimeHub {
        &self.hub
    }

    pub fn gateway(&self) -> &Arc<dyn DeviceGateway> {
        &self.gateway
    }

    pub fn system_apps(&self) -> &[AppDefinition] {
        &self.system_apps
    }

    pub fn device_streams(&self) -> &DeviceStreams {
        &self.device_streams
    }

    // ========================================
    // Session
    // ========================================

    pub fn current_user(&self) -> Result<CurrentUser> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| PhotonError::Unauthorized {
                message: "no user is signed in".to_string(),
            })
    }

    pub fn sign_in(&self, user: CurrentUser) {
        info!("Signed in as {} ({})", user.display_name, user.id);
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        self.emit(ShellEvent::SessionChanged { user: Some(user) });
    }

    /// Sign out and stop every device stream opened under the old session.
    pub fn sign_out(&self) {
        let previous = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(user) = previous {
            let stopped = self.device_streams.clear();
            info!("Signed out {} ({} device streams stopped)", user.id, stopped);
            self.emit(ShellEvent::SessionChanged { user: None });
        }
    }

    // ========================================
    // Events
    // ========================================

    pub fn subscribe_events(&self) -> broadcast::Receiver<ShellEvent> {
        self.events.subscribe()
    }

    pub(crate) fn emit(&self, event: ShellEvent) {
        // No chrome listening is fine.
        let _ = self.events.send(event);
    }

    /// Snapshots of the running-app list, refreshed after every transition.
    pub fn running_apps(&self) -> watch::Receiver<Vec<RunningAppInstance>> {
        self.running_tx.subscribe()
    }

    // ========================================
    // Installed apps
    // ========================================

    /// Installed definition of `bundle_id` for `user`, system apps included.
    pub async fn installed_definition(
        &self,
        user: &CurrentUser,
        bundle_id: &str,
    ) -> Result<Option<AppDefinition>> {
        if let Some(app) = self.system_apps.iter().find(|a| a.bundle_id == bundle_id) {
            return Ok(Some(app.clone()));
        }
        Ok(self
            .store
            .installed_apps(&user.id)
            .await?
            .into_iter()
            .find(|a| a.bundle_id == bundle_id))
    }

    /// System apps followed by the user's installed apps.
    pub async fn installed_apps(&self) -> Result<Vec<AppDefinition>> {
        let user = self.current_user()?;
        let mut apps = self.system_apps.clone();
        for app in self.store.installed_apps(&user.id).await? {
            if !apps.iter().any(|a| a.bundle_id == app.bundle_id) {
                apps.push(app);
            }
        }
        Ok(apps)
    }

    pub async fn install(&self, app: &AppDefinition) -> Result<()> {
        app.validate()?;
        let user = self.current_user()?;

        // Already-installed requests are absorbed.
        if self.installed_definition(&user, &app.bundle_id).await?.is_some() {
            debug!("{} already installed for {}", app.bundle_id, user.id);
            return Ok(());
        }
        if !self.consent.confirm_install(&user, app).await {
            return Err(PhotonError::InstallDeclined {
                bundle_id: app.bundle_id.clone(),
            });
        }
        if self.store.install_app(&user.id, app).await? {
            info!("Installed {} for {}", app.bundle_id, user.id);
            self.emit(ShellEvent::AppInstalled {
                bundle_id: app.bundle_id.clone(),
            });
        }
        Ok(())
    }

    /// Uninstall `bundle_id`, closing it first if it is running.
    pub async fn uninstall(&self, bundle_id: &str) -> Result<()> {
        if ShellConfig::is_system_app(bundle_id) {
            return Err(PhotonError::SystemAppProtected {
                bundle_id: bundle_id.to_string(),
            });
        }
        let user = self.current_user()?;

        self.close(bundle_id).await;
        if self.store.uninstall_app(&user.id, bundle_id).await? {
            info!("Uninstalled {} for {}", bundle_id, user.id);
            self.emit(ShellEvent::AppUninstalled {
                bundle_id: bundle_id.to_string(),
            });
        } else {
            debug!("{} was not installed for {}", bundle_id, user.id);
        }
        Ok(())
    }

    // ========================================
    // Lifecycle
    // ========================================

    async fn with_running<T>(&self, f: impl FnOnce(&mut RunningApps) -> T) -> T {
        let mut running = self.running.lock().await;
        let out = f(&mut running);
        self.running_tx.send_replace(running.snapshot());
        out
    }

    /// Launch an installed app, or foreground it if it is already running.
    ///
    /// The installed definition is the one that runs; failures are reported in
    /// the result rather than as errors.
    pub async fn launch(&self, app: &AppDefinition) -> Result<LaunchResult> {
        let user = self.current_user()?;
        let Some(definition) = self.installed_definition(&user, &app.bundle_id).await? else {
            let err = PhotonError::NotInstalled {
                bundle_id: app.bundle_id.clone(),
            };
            return Ok(LaunchResult::failed(err.to_string()));
        };

        let created = self.with_running(|r| r.launch(&definition)).await;
        let bundle_id = definition.bundle_id.clone();
        self.emit(if created {
            ShellEvent::AppLaunched { bundle_id }
        } else {
            ShellEvent::AppForegrounded { bundle_id }
        });
        Ok(LaunchResult::launched(definition))
    }

    pub async fn foreground(&self, bundle_id: &str) -> Result<()> {
        self.with_running(|r| r.foreground(bundle_id)).await?;
        self.emit(ShellEvent::AppForegrounded {
            bundle_id: bundle_id.to_string(),
        });
        Ok(())
    }

    /// Close a running app and forget its frame. The launcher cannot be closed.
    pub async fn close(&self, bundle_id: &str) -> Option<RunningAppInstance> {
        let closed = self.with_running(|r| r.close(bundle_id)).await?;
        self.frames.detach(bundle_id);
        self.emit(ShellEvent::AppClosed {
            bundle_id: bundle_id.to_string(),
        });
        Some(closed)
    }

    /// Bring the launcher to the front.
    pub async fn go_home(&self) -> Result<()> {
        self.with_running(|r| {
            let launcher = r.launcher_id().to_string();
            r.foreground(&launcher)
        })
        .await?;
        self.emit(ShellEvent::HomeRequested);
        Ok(())
    }

    /// Bundle id of the app frame a call came from.
    pub fn caller_bundle(&self, ctx: &CallContext) -> Result<String> {
        self.frames
            .bundle_for(ctx.source)
            .ok_or_else(|| PhotonError::Unauthorized {
                message: format!("{} is not a mounted app frame", ctx.source),
            })
    }
}

/// Running host shell. Dropping it closes the shell window.
pub struct Shell {
    state: Arc<ShellState>,
    endpoint: RpcEndpoint,
}

impl Shell {
    pub fn builder() -> ShellBuilder {
        ShellBuilder::new()
    }

    pub fn state(&self) -> &Arc<ShellState> {
        &self.state
    }

    pub fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    pub fn window_id(&self) -> WindowId {
        self.state.window_id
    }

    pub fn bus(&self) -> &MessageBus {
        &self.state.bus
    }

    fn trust_origin(&self, app: &AppDefinition) -> Result<Origin> {
        let origin = Origin::parse(&app.url).map_err(|_| PhotonError::OriginRejected {
            origin: app.url.clone(),
        })?;
        self.state.allow_list.allow(origin.clone());
        Ok(origin)
    }

    /// Mount `app` in a new frame under the shell window.
    ///
    /// The app's origin becomes trusted. The returned window is the app
    /// document's own; dropping it unmounts the frame.
    pub fn open_app_frame(&self, app: &AppDefinition) -> Result<Window> {
        let origin = self.trust_origin(app)?;
        let window = self
            .state
            .bus
            .open_window(origin, Some(self.state.window_id));
        self.state.frames.attach(&app.bundle_id, window.id());
        Ok(window)
    }

    /// Mount `app` running in another process, reached over `stream`.
    pub fn connect_remote_app<S>(&self, app: &AppDefinition, stream: S) -> Result<FrameLinkHandle>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let origin = self.trust_origin(app)?;
        let link = FrameLink::open(&self.state.bus, origin, Some(self.state.window_id));
        let handle = link.connect(self.state.window_id, stream);
        self.state.frames.attach(&app.bundle_id, handle.proxy_id());
        info!("Remote app {} linked as {}", app.bundle_id, handle.proxy_id());
        Ok(handle)
    }

    /// Proxy for an API published by a mounted app.
    pub fn app_api(&self, bundle_id: &str, api_name: &str) -> Result<RemoteApi> {
        let window = self
            .state
            .frames
            .window_for(bundle_id)
            .ok_or_else(|| PhotonError::NotRunning {
                bundle_id: bundle_id.to_string(),
            })?;
        Ok(self.endpoint.request(api_name, window))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ShellEvent> {
        self.state.subscribe_events()
    }

    pub fn running_apps(&self) -> watch::Receiver<Vec<RunningAppInstance>> {
        self.state.running_apps()
    }
}
