//! Photon Core - Cross-frame RPC bridge for the Photon OS shell.
//!
//! Sandboxed app documents call capabilities published by the host shell
//! through named APIs. This crate provides the pieces both sides share: the
//! origin-checked message transport, the correlated RPC runtime with its
//! subscription primitive, the wire data model and the running-app lifecycle
//! model.
//!
//! # Example
//!
//! ```rust,ignore
//! use photon_core::rpc::{MethodTable, RpcEndpoint, RpcHost};
//! use photon_core::transport::{ChannelTransport, MessageBus, Origin, OriginAllowList};
//!
//! #[tokio::main]
//! async fn main() -> photon_core::Result<()> {
//!     let bus = MessageBus::new();
//!     let shell_origin = Origin::parse("https://shell.example")?;
//!     let app_origin = Origin::parse("https://notes.example")?;
//!
//!     let host_window = bus.open_window(shell_origin.clone(), None);
//!     let app_window = bus.open_window(app_origin.clone(), Some(host_window.id()));
//!
//!     let host = RpcHost::new();
//!     host.set("greeter", MethodTable::new().method("hello", |_, _| async {
//!         Ok(serde_json::json!("hi"))
//!     }));
//!     let _shell = RpcEndpoint::spawn(
//!         ChannelTransport::new(host_window, OriginAllowList::new([app_origin])),
//!         host,
//!     );
//!
//!     let app = RpcEndpoint::spawn(
//!         ChannelTransport::new(app_window, OriginAllowList::new([shell_origin])),
//!         RpcHost::new(),
//!     );
//!     let greeting = app.request_parent("greeter")?.call("hello", vec![]).await?;
//!     println!("{}", greeting);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod rpc;
pub mod transport;

// Re-export commonly used types
pub use config::{DeviceConfig, RpcConfig, ShellConfig};
pub use error::{PhotonError, Result};
pub use lifecycle::{FrameRegistry, RunningApps};
pub use models::{
    AppDefinition, CurrentUser, DeviceMessage, LaunchResult, LinkedAccount, PreferenceValue,
    RunningAppInstance, SendMessageResult, SlDevice,
};
pub use rpc::{
    ApiHandler, CallContext, EndpointOptions, EventSink, MethodTable, RemoteApi, RpcEndpoint,
    RpcHost, Subscription,
};
pub use transport::{ChannelTransport, MessageBus, Origin, OriginAllowList, Window, WindowId};
