//! Photon Shell - the host side of Photon OS.
//!
//! The shell owns the top-level document. It mounts app frames, publishes the
//! OS API they call, keeps the running-app model and bridges device messages
//! between the virtual world and subscribed apps.
//!
//! # Architecture
//!
//! - [`Shell`] / [`ShellState`]: host window, session and lifecycle state
//! - [`capabilities`]: the `photon-os` API, split by domain
//! - [`store`]: per-user persistence behind [`ShellStore`]
//! - [`devices`]: realtime channels, outbound gateway and HTTP ingress
//! - [`consent`]: install confirmation

pub mod capabilities;
pub mod consent;
pub mod devices;
pub mod shell;
pub mod store;

pub use capabilities::{DeviceStreams, OsApi};
pub use consent::{AutoApprove, DenyAll, InstallConsent};
pub use devices::{
    start_ingress, DeviceGateway, HttpDeviceGateway, IngressState, RealtimeHub, RealtimeLease,
};
pub use shell::{Shell, ShellBuilder, ShellEvent, ShellState};
pub use store::{MemoryStore, PrefScope, ShellStore, SqliteStore};
