//! Browser-context seam: one window (top-level page or iframe document).
//!
//! Mirrors the browser contract the channel depends on:
//! - `post_message` is fire-and-forget, never blocks, never confirms;
//! - the receiving side sees the payload together with the sender's origin;
//! - a post whose target origin does not match the receiving window, or that
//!   targets a destroyed window, vanishes silently.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};

/// A raw inbound message event, before origin filtering and decoding.
#[derive(Debug, Clone)]
pub struct RawMessageEvent {
    /// Serialized origin of the posting context.
    pub origin: String,
    /// Structured-clone of the posted value.
    pub data: Value,
}

/// One browser context's message primitive.
pub trait Window: Send + Sync {
    /// Serialized origin of this window's document.
    fn origin(&self) -> &str;

    /// Deliver `data` to this window as if `source_origin` posted it with
    /// `target_origin`.
    fn post_message(&self, data: Value, target_origin: &str, source_origin: &str);

    /// Whether the window has been destroyed.
    fn is_closed(&self) -> bool;

    /// Destroyed flag as a watch; flips to `true` once, when the window goes.
    fn close_signal(&self) -> watch::Receiver<bool>;

    /// Take this window's inbound event stream. Only the first caller gets
    /// it: there is exactly one listener slot per context.
    fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<RawMessageEvent>>;
}

/// Shared window handle.
pub type WindowRef = Arc<dyn Window>;
