//! Transport layer (cross-document messaging).
//!
//! - `window`: the browser-context seam
//! - `memory`: in-memory window used by the demo and tests
//! - `adapter`: origin-checked send/on_message over one window
//! - `router`: decode-once, route-by-channelId registry

pub mod adapter;
pub mod memory;
pub mod router;
pub mod window;

pub use adapter::TransportAdapter;
pub use memory::MemoryWindow;
pub use router::ChannelRouter;
pub use window::{RawMessageEvent, Window, WindowRef};
