//! Named-API RPC over a [`ChannelTransport`](crate::transport::ChannelTransport).

mod endpoint;
mod events;
pub mod protocol;
mod registry;
mod remote;

pub use endpoint::{EndpointOptions, RpcEndpoint};
pub use events::EventSink;
pub use protocol::{RpcError, RpcMessage};
pub use registry::{ApiHandler, CallContext, MethodTable, RpcHost};
pub use remote::{RemoteApi, Subscription};
