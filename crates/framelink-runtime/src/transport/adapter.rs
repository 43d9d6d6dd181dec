//! Transport adapter: the one wrapper around a window's message primitive.
//!
//! Responsibilities:
//! - `send`: fire-and-forget post to a target window / target origin
//! - `on_message`: install the single inbound dispatcher for this context
//! - Origin allow-list: events from other origins are dropped here, before
//!   any decoding, and never surface as errors

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use framelink_core::error::{ChannelError, Result};

use super::window::{RawMessageEvent, Window, WindowRef};
use crate::obs::TransportStats;
use crate::policy::{OriginAllowlist, WILDCARD};

#[derive(Clone)]
pub struct TransportAdapter {
    inner: Arc<AdapterInner>,
}

struct AdapterInner {
    window: WindowRef,
    allowlist: OriginAllowlist,
    inbox: Mutex<Option<mpsc::UnboundedReceiver<RawMessageEvent>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<TransportStats>,
}

impl TransportAdapter {
    /// Wrap `window`. Fails if the window's listener slot is already taken.
    pub fn new(window: WindowRef, allowlist: OriginAllowlist) -> Result<Self> {
        let inbox = window.take_inbox().ok_or_else(|| {
            ChannelError::Internal(format!(
                "window {} already has a transport adapter",
                window.origin()
            ))
        })?;

        Ok(Self {
            inner: Arc::new(AdapterInner {
                window,
                allowlist,
                inbox: Mutex::new(Some(inbox)),
                pump: Mutex::new(None),
                stats: Arc::new(TransportStats::default()),
            }),
        })
    }

    /// Origin of the wrapped window.
    pub fn origin(&self) -> &str {
        self.inner.window.origin()
    }

    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.inner.stats)
    }

    /// Post `payload` to `target`. Never blocks, never confirms delivery.
    pub fn send(&self, target: &dyn Window, target_origin: &str, payload: Value) -> Result<()> {
        if target_origin == WILDCARD && !self.inner.allowlist.is_wildcard() {
            return Err(ChannelError::Config(
                "wildcard target origin requires allow_wildcard_origin".into(),
            ));
        }
        target.post_message(payload, target_origin, self.origin());
        Ok(())
    }

    /// Install the single dispatcher for inbound events and start pumping.
    ///
    /// Must be called inside a tokio runtime.
    pub fn on_message<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(RawMessageEvent) + Send + Sync + 'static,
    {
        let mut inbox = self.inner.inbox.lock().take().ok_or_else(|| {
            ChannelError::Internal("transport adapter already has a dispatcher".into())
        })?;

        let allowlist = self.inner.allowlist.clone();
        let stats = Arc::clone(&self.inner.stats);
        let span = tracing::debug_span!("transport", origin = %self.origin());

        let pump = tokio::spawn(
            async move {
                while let Some(ev) = inbox.recv().await {
                    if !allowlist.is_allowed(&ev.origin) {
                        stats.inc_origin_rejected();
                        tracing::trace!(origin = %ev.origin, "message from disallowed origin dropped");
                        continue;
                    }
                    handler(ev);
                }
            }
            .instrument(span),
        );

        *self.inner.pump.lock() = Some(pump);
        Ok(())
    }

    /// Stop delivering inbound events.
    pub fn dispose(&self) {
        if let Some(pump) = self.inner.pump.lock().take() {
            pump.abort();
        }
    }
}

impl Drop for AdapterInner {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.get_mut().take() {
            pump.abort();
        }
    }
}
