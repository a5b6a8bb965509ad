//! Client side of the engine command protocol: the channel that talks to the
//! backend, the dispatch queue that orders and coalesces UI commands, the
//! render scheduler, and typed object proxies.

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod proxy;
pub mod render;
pub mod transport;

pub use channel::{ChannelOptions, CommandChannel, ErrorPolicy};
pub use config::{load_settings, Settings};
pub use dispatch::{DispatchQueue, Ticket};
pub use error::{ChannelError, DispatchError};
pub use hooks::{LoggingHooks, UiHooks};
pub use proxy::{CommandSink, ContainerProxy, MapProxy, ObjectProxy, SequenceProxy};
pub use render::{CanvasGeometry, GeometryProvider, RenderScheduler, SharedGeometry};
pub use transport::{Backend, ProcessBackend, SyncBackend};

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;
