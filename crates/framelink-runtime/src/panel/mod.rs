//! Host-page panel that embeds the plugin, and the host runtime it uses.

pub mod organizations;
pub mod runtime;

pub use organizations::{Panel, CONTAINER_CLASS};
pub use runtime::HostRuntime;
