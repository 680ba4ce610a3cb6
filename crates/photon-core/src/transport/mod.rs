//! Cross-document message transport.
//!
//! Models the browser's window messaging: every document owns a [`Window`] on a
//! shared [`MessageBus`], addressed by [`WindowId`] and stamped with its
//! [`Origin`]. Delivery is fire-and-forget and FIFO per sender/target pair.
//!
//! # Architecture
//!
//! - **Bus**: window table and per-window inbound queues
//! - **Channel**: origin-filtered sender/receiver pair built on one window
//! - **Frame**: length-prefixed JSON link that stands a remote peer up as a
//!   local window

mod bus;
mod channel;
pub mod frame;
mod window;

pub use bus::{Envelope, MessageBus, Window};
pub use channel::{ChannelTransport, TransportReceiver, TransportSender};
pub use frame::{FrameLink, FrameLinkHandle};
pub use window::{Origin, OriginAllowList, WindowId};
