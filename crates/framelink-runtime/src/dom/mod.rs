//! DOM seam: the few element operations the plugin host needs.
//!
//! A browser embedding implements these over real elements; `memory`
//! provides the in-process document used by the demo and tests.

pub mod memory;

use std::sync::Arc;

use url::Url;

use framelink_core::error::Result;

use crate::transport::WindowRef;

pub use memory::{MemoryDocument, MemoryFrame, MemoryNode, PluginLoader};

pub type NodeRef = Arc<dyn HostNode>;
pub type FrameRef = Arc<dyn FrameElement>;

/// An element that can hold containers and frames.
pub trait HostNode: Send + Sync {
    /// Append a `div` container with the given class.
    fn append_container(&self, class: &str) -> Result<NodeRef>;

    /// Append an iframe with id `frame_id` and start loading `src`.
    fn append_frame(&self, frame_id: &str, src: &Url) -> Result<FrameRef>;

    /// Detach this element. Frames below it are destroyed. Idempotent.
    fn remove(&self);

    fn is_attached(&self) -> bool;

    fn class_name(&self) -> Option<&str>;

    /// Attached frames directly or indirectly below this element.
    fn frame_count(&self) -> usize;
}

/// An iframe element.
pub trait FrameElement: Send + Sync {
    fn frame_id(&self) -> &str;

    fn src(&self) -> &Url;

    /// The frame's browsing context.
    fn content_window(&self) -> WindowRef;

    /// Detach the frame; its window is destroyed. Idempotent.
    fn remove(&self);

    fn is_attached(&self) -> bool;
}
