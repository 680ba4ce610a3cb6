//! Centralized configuration for Photon OS.
//!
//! Constants for the RPC bridge, the host shell and the device subsystem.

use std::time::Duration;

/// RPC bridge configuration.
pub struct RpcConfig;

impl RpcConfig {
    /// Well-known API name under which the host shell publishes its capabilities.
    pub const OS_API_NAME: &'static str = "photon-os";
    /// Calls have no deadline unless the caller opts in.
    pub const DEFAULT_CALL_TIMEOUT: Option<Duration> = None;
    /// Upper bound on a single frame carried over a byte-stream link.
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
}

/// Host shell configuration.
pub struct ShellConfig;

impl ShellConfig {
    pub const APP_NAME: &'static str = "Photon OS";
    pub const LAUNCHER_BUNDLE_ID: &'static str = "com.photon.launcher";
    pub const SETTINGS_BUNDLE_ID: &'static str = "com.photon.settings";
    pub const APP_STORE_BUNDLE_ID: &'static str = "com.photon.appstore";
    /// Apps that ship with the shell and can never be uninstalled.
    pub const SYSTEM_BUNDLE_IDS: [&'static str; 3] = [
        Self::LAUNCHER_BUNDLE_ID,
        Self::SETTINGS_BUNDLE_ID,
        Self::APP_STORE_BUNDLE_ID,
    ];
    pub const MAX_PREFERENCE_KEY_LEN: usize = 256;
    /// Base URL of the shell document when none is configured.
    pub const DEFAULT_SHELL_URL: &'static str = "http://localhost:8080/";
    /// Buffered shell events per subscriber.
    pub const EVENT_CAPACITY: usize = 64;
    pub const DATABASE_FILENAME: &'static str = "photon.db";
    pub const DATA_DIR_NAME: &'static str = "photon-os";

    /// Whether `bundle_id` belongs to a system app.
    pub fn is_system_app(bundle_id: &str) -> bool {
        Self::SYSTEM_BUNDLE_IDS.contains(&bundle_id)
    }
}

/// Device messaging configuration.
pub struct DeviceConfig;

impl DeviceConfig {
    /// Topic name used by the subscription primitive for device events.
    pub const TOPIC: &'static str = "devices";
    /// Per-user broadcast buffer; slower receivers skip ahead.
    pub const BROADCAST_CAPACITY: usize = 256;
    pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);
    pub const INGRESS_TOKEN_HEADER: &'static str = "x-photon-ingress-token";
    /// In-flight requests accepted by the HTTP ingress at once.
    pub const INGRESS_MAX_CONCURRENT: usize = 64;
}
