//! Host side of device messaging.
//!
//! # Architecture
//!
//! - **Realtime**: per-user broadcast channels with leased lifetimes
//! - **Gateway**: outbound delivery to a device's callback URL
//! - **Ingress**: HTTP entry point that publishes inbound device messages

mod gateway;
pub mod ingress;
mod realtime;

pub use gateway::{DeviceGateway, HttpDeviceGateway};
pub use ingress::{router as ingress_router, start_ingress, IngressState};
pub use realtime::{RealtimeHub, RealtimeLease};
