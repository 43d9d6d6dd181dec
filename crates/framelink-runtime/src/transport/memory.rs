//! In-memory window: a browser context backed by an unbounded tokio queue.
//!
//! Used by the demo binary and the test suites. Applies the same delivery
//! rules as a browser (target-origin check, destroyed windows swallow posts).

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use framelink_core::error::{ChannelError, Result};

use super::window::{RawMessageEvent, Window, WindowRef};
use crate::policy::{normalize_origin, WILDCARD};

#[derive(Clone)]
pub struct MemoryWindow {
    inner: Arc<Inner>,
}

struct Inner {
    origin: String,
    parent: Option<MemoryWindow>,
    tx: mpsc::UnboundedSender<RawMessageEvent>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<RawMessageEvent>>>,
    closed: watch::Sender<bool>,
}

impl MemoryWindow {
    /// Top-level window whose document lives at `url` (or origin).
    pub fn new(url: &str) -> Result<Self> {
        Self::build(url, None)
    }

    /// Nested window (iframe document) at `url`, with `self` as parent.
    pub fn child(&self, url: &str) -> Result<Self> {
        Self::build(url, Some(self.clone()))
    }

    fn build(url: &str, parent: Option<MemoryWindow>) -> Result<Self> {
        let origin = normalize_origin(url)?;
        if origin == WILDCARD {
            return Err(ChannelError::Config("a window needs a concrete origin".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Ok(Self {
            inner: Arc::new(Inner {
                origin,
                parent,
                tx,
                rx: Mutex::new(Some(rx)),
                closed,
            }),
        })
    }

    pub fn parent(&self) -> Option<MemoryWindow> {
        self.inner.parent.clone()
    }

    /// Destroy the window. Later posts to it are discarded.
    pub fn close(&self) {
        self.inner.closed.send_replace(true);
    }

    /// Resolves once the window is destroyed.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed.subscribe();
        // Sender lives as long as `self`.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Inject an event as if a context at `origin` had posted `data` here.
    pub fn deliver(&self, origin: &str, data: Value) {
        self.post_message(data, WILDCARD, origin);
    }

    pub fn handle(&self) -> WindowRef {
        Arc::new(self.clone())
    }
}

impl Window for MemoryWindow {
    fn origin(&self) -> &str {
        &self.inner.origin
    }

    fn post_message(&self, data: Value, target_origin: &str, source_origin: &str) {
        if self.is_closed() {
            tracing::trace!(target = %self.inner.origin, "post to destroyed window discarded");
            return;
        }
        if target_origin != WILDCARD && target_origin != self.inner.origin {
            tracing::trace!(
                target = %self.inner.origin,
                target_origin,
                "post discarded: target origin mismatch"
            );
            return;
        }
        let _ = self.inner.tx.send(RawMessageEvent {
            origin: source_origin.to_string(),
            data,
        });
    }

    fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    fn close_signal(&self) -> watch::Receiver<bool> {
        self.inner.closed.subscribe()
    }

    fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<RawMessageEvent>> {
        self.inner.rx.lock().take()
    }
}
