//! Embedded plugin: host controller (`iframer`) and the in-frame side
//! (`bootstrap`), joined by the frame URL (`frame`).

pub mod bootstrap;
pub mod frame;
pub mod iframer;

pub use bootstrap::{InProcessPlugin, PluginBootstrap, SET_TITLE};
pub use frame::{plugin_url, FrameQuery};
pub use iframer::{Iframer, IframerConfig, Lifecycle};
