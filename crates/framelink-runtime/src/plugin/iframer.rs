//! Plugin host controller: owns one embedded plugin instance.
//!
//! `start` appends the iframe, opens the initiator channel, runs the
//! handshake and hands the plugin its `params`. Whatever fails on the way
//! leaves no frame behind. `stop` is safe at any point, including while a
//! `start` is still in flight (that `start` then fails with
//! `channel-closed`).

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use framelink_core::error::{ChannelError, Result};
use framelink_core::protocol::{BootstrapParams, ChannelId, ServiceUrls, PARAMS};

use super::frame::{plugin_url, FrameQuery};
use crate::channel::{Channel, ChannelConfig, MessageHandler};
use crate::dom::{FrameRef, NodeRef};
use crate::policy::normalize_origin;
use crate::transport::ChannelRouter;

/// What the Iframer needs to know about the plugin it hosts.
#[derive(Debug, Clone)]
pub struct IframerConfig {
    /// Host document URL; the plugin path is resolved against it.
    pub base_url: Url,
    pub plugin_path: String,
    /// Service endpoints handed to the plugin.
    pub params: ServiceUrls,
    pub channel: ChannelConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Starting,
    Running,
    Stopped,
}

struct Slot {
    lifecycle: Lifecycle,
    /// Bumped by every `start`, so a stale `start` never tears down a newer one.
    generation: u64,
    frame: Option<FrameRef>,
    channel: Option<Channel>,
}

pub struct Iframer {
    router: ChannelRouter,
    node: NodeRef,
    cfg: IframerConfig,
    handlers: Mutex<Vec<(String, Arc<dyn MessageHandler>)>>,
    slot: Mutex<Slot>,
}

impl Iframer {
    pub fn new(router: ChannelRouter, node: NodeRef, cfg: IframerConfig) -> Self {
        Self {
            router,
            node,
            cfg,
            handlers: Mutex::new(Vec::new()),
            slot: Mutex::new(Slot {
                lifecycle: Lifecycle::Idle,
                generation: 0,
                frame: None,
                channel: None,
            }),
        }
    }

    /// Host-side handler for messages the plugin sends (UI directives).
    /// Attached before the handshake of every subsequent `start`.
    pub fn handle<H>(&self, name: &str, handler: H) -> Result<()>
    where
        H: MessageHandler + 'static,
    {
        let handler: Arc<dyn MessageHandler> = Arc::new(handler);
        self.handlers
            .lock()
            .push((name.to_string(), Arc::clone(&handler)));

        let live = self.slot.lock().channel.clone();
        if let Some(channel) = live {
            channel.on_shared(name, handler)?;
        }
        Ok(())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.slot.lock().lifecycle
    }

    /// The channel of a running plugin, for further requests.
    pub fn channel(&self) -> Option<Channel> {
        let slot = self.slot.lock();
        match slot.lifecycle {
            Lifecycle::Running => slot.channel.clone(),
            _ => None,
        }
    }

    pub fn frame(&self) -> Option<FrameRef> {
        self.slot.lock().frame.clone()
    }

    /// Create the frame, handshake, deliver `params`. Resolves with the
    /// plugin's acknowledgement payload.
    pub async fn start(&self) -> Result<Value> {
        let generation = {
            let mut slot = self.slot.lock();
            if matches!(slot.lifecycle, Lifecycle::Starting | Lifecycle::Running) {
                return Err(ChannelError::Internal("plugin already started".into()));
            }
            slot.lifecycle = Lifecycle::Starting;
            slot.generation += 1;
            slot.generation
        };

        match self.launch(generation).await {
            Ok(ack) => {
                let mut slot = self.slot.lock();
                if slot.generation == generation && slot.lifecycle == Lifecycle::Starting {
                    slot.lifecycle = Lifecycle::Running;
                    tracing::info!(origin = %self.router.origin(), "plugin running");
                    Ok(ack)
                } else {
                    Err(ChannelError::ChannelClosed)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "plugin start failed");
                self.teardown(generation, Lifecycle::Stopped);
                Err(e)
            }
        }
    }

    async fn launch(&self, generation: u64) -> Result<Value> {
        let query = FrameQuery {
            frame_id: FrameQuery::new_frame_id(),
            channel_id: ChannelId::generate(),
            parent_host: self.router.origin().to_string(),
        };
        let src = query.apply(&plugin_url(&self.cfg.base_url, &self.cfg.plugin_path)?);
        let target_origin = normalize_origin(src.as_str())?;

        let frame = self.node.append_frame(&query.frame_id, &src)?;
        self.publish(generation, |slot| slot.frame = Some(Arc::clone(&frame)))
            .inspect_err(|_| frame.remove())?;

        let channel = Channel::initiator_with_id(
            query.channel_id.clone(),
            self.router.clone(),
            frame.content_window(),
            &target_origin,
            self.cfg.channel.clone(),
        )?;
        let handlers = self.handlers.lock().clone();
        for (name, handler) in handlers {
            channel.on_shared(&name, handler)?;
        }
        self.publish(generation, |slot| slot.channel = Some(channel.clone()))
            .inspect_err(|_| channel.close())?;

        channel.start().await?;
        tracing::debug!(frame_id = %query.frame_id, channel_id = %query.channel_id, "plugin handshake complete");

        let params = BootstrapParams {
            frame_id: query.frame_id.clone(),
            channel_id: query.channel_id.clone(),
            parent_host: query.parent_host.clone(),
            params: self.cfg.params.clone(),
        };
        let payload = serde_json::to_value(&params)
            .map_err(|e| ChannelError::Internal(format!("params serialization failed: {e}")))?;

        let ack = channel
            .request(PARAMS, payload, self.cfg.channel.request_timeout)
            .await?;
        tracing::info!(frame_id = %query.frame_id, "plugin acknowledged params");
        Ok(ack)
    }

    /// Record a resource for this `start` unless a `stop` got there first.
    fn publish(&self, generation: u64, f: impl FnOnce(&mut Slot)) -> Result<()> {
        let mut slot = self.slot.lock();
        if slot.generation != generation || slot.lifecycle != Lifecycle::Starting {
            return Err(ChannelError::ChannelClosed);
        }
        f(&mut slot);
        Ok(())
    }

    /// Close the channel, then remove the frame. Idempotent.
    pub fn stop(&self) {
        let generation = self.slot.lock().generation;
        if self.teardown(generation, Lifecycle::Stopped) {
            tracing::info!(origin = %self.router.origin(), "plugin stopped");
        }
    }

    fn teardown(&self, generation: u64, next: Lifecycle) -> bool {
        let (frame, channel) = {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return false;
            }
            if slot.lifecycle != Lifecycle::Idle {
                slot.lifecycle = next;
            }
            (slot.frame.take(), slot.channel.take())
        };

        let had_any = frame.is_some() || channel.is_some();
        if let Some(channel) = channel {
            channel.close();
        }
        if let Some(frame) = frame {
            frame.remove();
        }
        had_any
    }
}

impl Drop for Iframer {
    fn drop(&mut self) {
        self.stop();
    }
}
