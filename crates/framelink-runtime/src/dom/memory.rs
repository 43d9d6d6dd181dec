//! In-memory document: element tree plus child windows for frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use url::Url;

use framelink_core::error::{ChannelError, Result};

use super::{FrameElement, FrameRef, HostNode, NodeRef};
use crate::transport::{MemoryWindow, WindowRef};

/// Runs whatever document a frame loads.
///
/// Called once per appended frame, with the frame's freshly created window.
pub trait PluginLoader: Send + Sync {
    fn load(&self, window: MemoryWindow, src: &Url);
}

struct DocShared {
    window: MemoryWindow,
    loader: Option<Arc<dyn PluginLoader>>,
}

#[derive(Clone)]
pub struct MemoryDocument {
    shared: Arc<DocShared>,
    body: MemoryNode,
}

impl MemoryDocument {
    /// Document of `window`. Frames load nothing.
    pub fn new(window: MemoryWindow) -> Self {
        Self::build(window, None)
    }

    /// Document whose frames are handed to `loader`.
    pub fn with_loader(window: MemoryWindow, loader: Arc<dyn PluginLoader>) -> Self {
        Self::build(window, Some(loader))
    }

    fn build(window: MemoryWindow, loader: Option<Arc<dyn PluginLoader>>) -> Self {
        let shared = Arc::new(DocShared { window, loader });
        let body = MemoryNode::new(Arc::clone(&shared), Some("body".into()), Weak::new());
        Self { shared, body }
    }

    pub fn window(&self) -> &MemoryWindow {
        &self.shared.window
    }

    pub fn body(&self) -> MemoryNode {
        self.body.clone()
    }
}

enum Child {
    Node(MemoryNode),
    Frame(MemoryFrame),
}

impl Child {
    fn detach(&self) {
        match self {
            Child::Node(n) => n.detach(),
            Child::Frame(f) => f.detach(),
        }
    }
}

#[derive(Clone)]
pub struct MemoryNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    shared: Arc<DocShared>,
    class: Option<String>,
    parent: Weak<NodeInner>,
    children: Mutex<Vec<Child>>,
    attached: AtomicBool,
}

impl MemoryNode {
    fn new(shared: Arc<DocShared>, class: Option<String>, parent: Weak<NodeInner>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                shared,
                class,
                parent,
                children: Mutex::new(Vec::new()),
                attached: AtomicBool::new(true),
            }),
        }
    }

    pub fn handle(&self) -> NodeRef {
        Arc::new(self.clone())
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.lock().len()
    }

    fn ensure_attached(&self) -> Result<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(ChannelError::Internal("element is not attached".into()))
        }
    }

    /// Mark this subtree detached and destroy its frames.
    fn detach(&self) {
        if !self.inner.attached.swap(false, Ordering::AcqRel) {
            return;
        }
        let children = std::mem::take(&mut *self.inner.children.lock());
        for child in &children {
            child.detach();
        }
    }
}

impl HostNode for MemoryNode {
    fn append_container(&self, class: &str) -> Result<NodeRef> {
        self.ensure_attached()?;
        let node = MemoryNode::new(
            Arc::clone(&self.inner.shared),
            Some(class.to_string()),
            Arc::downgrade(&self.inner),
        );
        self.inner.children.lock().push(Child::Node(node.clone()));
        Ok(node.handle())
    }

    fn append_frame(&self, frame_id: &str, src: &Url) -> Result<FrameRef> {
        self.ensure_attached()?;
        let window = self.inner.shared.window.child(src.as_str())?;
        let frame = MemoryFrame {
            inner: Arc::new(FrameInner {
                frame_id: frame_id.to_string(),
                src: src.clone(),
                window: window.clone(),
                parent: Arc::downgrade(&self.inner),
                attached: AtomicBool::new(true),
            }),
        };
        self.inner.children.lock().push(Child::Frame(frame.clone()));
        tracing::debug!(frame_id, src = %src, "iframe appended");

        if let Some(loader) = &self.inner.shared.loader {
            loader.load(window, src);
        }
        Ok(Arc::new(frame))
    }

    fn remove(&self) {
        if let Some(parent) = self.inner.parent.upgrade() {
            parent.children.lock().retain(|c| match c {
                Child::Node(n) => !Arc::ptr_eq(&n.inner, &self.inner),
                Child::Frame(_) => true,
            });
        }
        self.detach();
    }

    fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }

    fn class_name(&self) -> Option<&str> {
        self.inner.class.as_deref()
    }

    fn frame_count(&self) -> usize {
        self.inner
            .children
            .lock()
            .iter()
            .map(|c| match c {
                Child::Node(n) => n.frame_count(),
                Child::Frame(f) => usize::from(f.is_attached()),
            })
            .sum()
    }
}

#[derive(Clone)]
pub struct MemoryFrame {
    inner: Arc<FrameInner>,
}

struct FrameInner {
    frame_id: String,
    src: Url,
    window: MemoryWindow,
    parent: Weak<NodeInner>,
    attached: AtomicBool,
}

impl MemoryFrame {
    pub fn window(&self) -> &MemoryWindow {
        &self.inner.window
    }

    fn detach(&self) {
        if self.inner.attached.swap(false, Ordering::AcqRel) {
            self.inner.window.close();
            tracing::debug!(frame_id = %self.inner.frame_id, "iframe removed");
        }
    }
}

impl FrameElement for MemoryFrame {
    fn frame_id(&self) -> &str {
        &self.inner.frame_id
    }

    fn src(&self) -> &Url {
        &self.inner.src
    }

    fn content_window(&self) -> WindowRef {
        self.inner.window.handle()
    }

    fn remove(&self) {
        if let Some(parent) = self.inner.parent.upgrade() {
            parent.children.lock().retain(|c| match c {
                Child::Frame(f) => !Arc::ptr_eq(&f.inner, &self.inner),
                Child::Node(_) => true,
            });
        }
        self.detach();
    }

    fn is_attached(&self) -> bool {
        self.inner.attached.load(Ordering::Acquire)
    }
}
