//! Inbound handler registry keyed by message name.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::FutureExt;
use serde_json::Value;

use framelink_core::error::ChannelError;

/// One inbound `send` or `request`, as seen by a handler.
#[derive(Debug, Clone)]
pub struct Incoming {
    pub name: String,
    pub payload: Value,
    /// `true` for a request (the handler's value becomes the response).
    pub expects_reply: bool,
}

/// Handler failure. Only the message crosses back to the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(format!("invalid payload: {e}"))
    }
}

impl From<ChannelError> for HandlerError {
    fn from(e: ChannelError) -> Self {
        Self::new(e.to_string())
    }
}

/// Handles messages of one name on a channel.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: Incoming) -> Result<Value, HandlerError>;
}

/// Adapter turning an async closure into a [`MessageHandler`].
pub struct FnHandler<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Incoming) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(Incoming) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, msg: Incoming) -> Result<Value, HandlerError> {
        (self.0)(msg).await
    }
}

/// Run a handler, turning a panic into a `HandlerError`.
pub(crate) async fn invoke(handler: Arc<dyn MessageHandler>, msg: Incoming) -> Result<Value, HandlerError> {
    match AssertUnwindSafe(handler.handle(msg)).catch_unwind().await {
        Ok(res) => res,
        Err(_) => Err(HandlerError::new("handler panicked")),
    }
}

/// Token returned by `on`, used to remove that registration with `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next: AtomicU64,
    map: DashMap<String, Vec<(HandlerId, Arc<dyn MessageHandler>)>>,
}

impl HandlerRegistry {
    pub(crate) fn insert(&self, name: &str, handler: Arc<dyn MessageHandler>) -> HandlerId {
        let id = HandlerId(self.next.fetch_add(1, Ordering::Relaxed));
        self.map
            .entry(name.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&self, name: &str, id: HandlerId) -> bool {
        let Some(mut list) = self.map.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        drop(list);
        self.map.remove_if(name, |_, list| list.is_empty());
        removed
    }

    /// Oldest registration; answers requests.
    pub(crate) fn first(&self, name: &str) -> Option<Arc<dyn MessageHandler>> {
        self.map
            .get(name)
            .and_then(|list| list.first().map(|(_, h)| Arc::clone(h)))
    }

    /// All registrations in registration order; receive sends.
    pub(crate) fn all(&self, name: &str) -> Vec<Arc<dyn MessageHandler>> {
        self.map
            .get(name)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&self) {
        self.map.clear();
    }
}
