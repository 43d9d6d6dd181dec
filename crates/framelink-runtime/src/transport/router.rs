//! Channel router: the per-context registry of live channels.
//!
//! Installed as the transport adapter's single dispatcher. Decodes each
//! allowed event once and routes it strictly by `channelId`:
//! - known channel => pushed onto that channel's FIFO inbox
//! - unknown channel => dropped (not queued)
//! - undecodable => dropped; reported to the channel if it could be named

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use framelink_core::error::{ChannelError, Result};
use framelink_core::protocol::{decode, encode, ChannelId, Envelope};

use super::adapter::TransportAdapter;
use super::window::{RawMessageEvent, Window, WindowRef};
use crate::obs::StatsSnapshot;
use crate::policy::OriginAllowlist;

/// What a channel's inbox receives.
#[derive(Debug)]
pub(crate) enum Routed {
    /// Decoded envelope with the origin the transport stamped on the event.
    Envelope { env: Envelope, origin: String },
    Malformed(String),
}

#[derive(Clone)]
pub struct ChannelRouter {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    adapter: TransportAdapter,
    routes: DashMap<ChannelId, mpsc::UnboundedSender<Routed>>,
}

impl ChannelRouter {
    /// Create the registry and install it as `adapter`'s dispatcher.
    pub fn create(adapter: TransportAdapter) -> Result<Self> {
        let inner = Arc::new(RouterInner {
            adapter: adapter.clone(),
            routes: DashMap::new(),
        });

        let weak = Arc::downgrade(&inner);
        adapter.on_message(move |ev| {
            if let Some(inner) = weak.upgrade() {
                inner.route(ev);
            }
        })?;

        Ok(Self { inner })
    }

    /// Adapter + router for one window.
    pub fn attach(window: WindowRef, allowlist: OriginAllowlist) -> Result<Self> {
        Self::create(TransportAdapter::new(window, allowlist)?)
    }

    /// Stop inbound delivery and drop every route; registered channels close.
    pub fn dispose(&self) {
        self.inner.adapter.dispose();
        self.inner.routes.clear();
        tracing::debug!(origin = %self.origin(), "router disposed");
    }

    /// Origin of the local window.
    pub fn origin(&self) -> &str {
        self.inner.adapter.origin()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.inner.adapter.stats().snapshot()
    }

    pub fn channel_count(&self) -> usize {
        self.inner.routes.len()
    }

    pub(crate) fn register(&self, id: &ChannelId, tx: mpsc::UnboundedSender<Routed>) -> Result<()> {
        match self.inner.routes.entry(id.clone()) {
            Entry::Occupied(_) => Err(ChannelError::Internal(format!(
                "channel {id} already registered"
            ))),
            Entry::Vacant(v) => {
                v.insert(tx);
                Ok(())
            }
        }
    }

    pub(crate) fn unregister(&self, id: &ChannelId) {
        self.inner.routes.remove(id);
    }

    /// Encode and post one envelope to the peer window.
    pub(crate) fn post(&self, peer: &dyn Window, target_origin: &str, env: &Envelope) -> Result<()> {
        let payload = encode(env)?;
        self.inner.adapter.send(peer, target_origin, payload)
    }
}

impl RouterInner {
    fn route(&self, ev: RawMessageEvent) {
        let stats = self.adapter.stats();

        match decode(&ev.data) {
            Ok(env) => {
                let id = env.channel_id.clone();
                let Some(tx) = self.routes.get(&id).map(|r| r.value().clone()) else {
                    stats.inc_unrouted();
                    tracing::debug!(channel_id = %id, kind = env.kind().as_str(), "no channel for envelope; dropped");
                    return;
                };
                let routed = Routed::Envelope {
                    env,
                    origin: ev.origin,
                };
                if tx.send(routed).is_err() {
                    stats.inc_unrouted();
                    self.routes.remove(&id);
                    return;
                }
                stats.inc_delivered();
            }
            Err(e) => {
                stats.inc_malformed();
                tracing::warn!(origin = %ev.origin, reason = %e.reason, "malformed message dropped");
                if let Some(id) = e.channel_id {
                    if let Some(tx) = self.routes.get(&id).map(|r| r.value().clone()) {
                        let _ = tx.send(Routed::Malformed(e.reason));
                    }
                }
            }
        }
    }
}
