//! Photon SDK - the app side of Photon OS.
//!
//! An app document talks to the shell that mounted it through [`PhotonOs`],
//! which wraps the `photon-os` API in typed groups (system, apps, user,
//! prefs, accounts, devices). Device messages are pushed to listeners
//! registered with [`Devices::add_listener`].
//!
//! # Example
//!
//! ```rust,ignore
//! use photon_sdk::PhotonOs;
//!
//! let os = PhotonOs::connect(window, allow_list)?;
//! let handle = os
//!     .devices()
//!     .add_listener(|message| {
//!         println!("{} says {}", message.object_name, message.message_type);
//!         Ok(())
//!     })
//!     .await?;
//! // ...
//! handle.unsubscribe().await?;
//! ```

mod client;
pub mod devices;

pub use client::{Accounts, Apps, Devices, PhotonOs, Prefs, System, User};
pub use devices::{DeviceListener, DeviceListeners, ListenerHandle};

// Re-export the shared data model for app code.
pub use photon_core::models;
pub use photon_core::{PhotonError, Result};
