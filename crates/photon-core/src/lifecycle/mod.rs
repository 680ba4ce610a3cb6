//! App lifecycle state owned by the host shell.

mod frames;
mod model;

pub use frames::FrameRegistry;
pub use model::{Clock, RunningApps};
