//! Data types shared by the host shell and app documents.

mod app;
mod device;
mod user;

pub use app::{AppDefinition, LaunchResult, RunningAppInstance};
pub use device::{DeviceMessage, SendMessageResult, SlDevice};
pub use user::{CurrentUser, LinkedAccount};

/// Any JSON-compatible preference value.
pub type PreferenceValue = serde_json::Value;
