//! Plugin side of the frame: responder channel + `params` intake.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tracing::Instrument;
use url::Url;

use framelink_core::error::{ChannelError, Result};
use framelink_core::protocol::{BootstrapParams, PARAMS};

use super::frame::FrameQuery;
use crate::channel::{handler_fn, Channel, ChannelConfig, HandlerError, Incoming, MessageHandler};
use crate::dom::PluginLoader;
use crate::policy::OriginAllowlist;
use crate::transport::{ChannelRouter, MemoryWindow, WindowRef};

/// Message name of the title directive a plugin sends to its host.
pub const SET_TITLE: &str = "setTitle";

/// Everything the plugin document sets up on load.
pub struct PluginBootstrap {
    query: FrameQuery,
    router: ChannelRouter,
    channel: Channel,
    params: watch::Receiver<Option<BootstrapParams>>,
}

impl PluginBootstrap {
    /// Wire the plugin context: read the frame URL, accept messages only
    /// from `parentHost`, open the responder channel and accept `params`.
    pub fn attach(window: WindowRef, parent: WindowRef, src: &Url, cfg: ChannelConfig) -> Result<Self> {
        let query = FrameQuery::from_url(src)?;
        let allowlist = OriginAllowlist::single(&query.parent_host)?;
        let router = ChannelRouter::attach(window, allowlist)?;
        let channel = Channel::responder(
            query.channel_id.clone(),
            router.clone(),
            parent,
            &query.parent_host,
            cfg,
        )?;

        let (tx, rx) = watch::channel(None);
        let tx = Arc::new(tx);
        let expected = query.clone();
        channel.on(
            PARAMS,
            handler_fn(move |msg: Incoming| {
                let tx = Arc::clone(&tx);
                let expected = expected.clone();
                async move {
                    let params: BootstrapParams = serde_json::from_value(msg.payload)?;
                    if params.channel_id != expected.channel_id {
                        return Err(HandlerError::new("params channelId does not match this frame"));
                    }
                    if params.frame_id != expected.frame_id {
                        return Err(HandlerError::new("params frameId does not match this frame"));
                    }
                    tracing::info!(frame_id = %params.frame_id, "bootstrap params received");
                    tx.send_replace(Some(params));
                    Ok::<Value, HandlerError>(json!({ "ack": true }))
                }
            }),
        )?;

        tracing::debug!(frame_id = %query.frame_id, channel_id = %query.channel_id, "plugin attached");
        Ok(Self {
            query,
            router,
            channel,
            params: rx,
        })
    }

    pub fn query(&self) -> &FrameQuery {
        &self.query
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn router(&self) -> &ChannelRouter {
        &self.router
    }

    /// Wait for the host's `params`.
    pub async fn params(&self, timeout: Duration) -> Result<BootstrapParams> {
        let mut rx = self.params.clone();
        let wait = async {
            loop {
                let current = rx.borrow_and_update().clone();
                if let Some(p) = current {
                    return Ok(p);
                }
                // Handler (and its sender) went away with the channel.
                if rx.changed().await.is_err() {
                    return Err(ChannelError::ChannelClosed);
                }
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| ChannelError::request_timeout(PARAMS, timeout))?
    }

    /// Ask the host to change the page title.
    pub fn set_title(&self, title: &str) -> Result<()> {
        self.channel.send(SET_TITLE, json!(title))
    }

    /// Resolves once the channel is closed.
    pub async fn closed(&self) {
        self.channel.closed().await;
    }
}

impl Drop for PluginBootstrap {
    fn drop(&mut self) {
        self.channel.close();
        self.router.dispose();
    }
}

/// Runs a [`PluginBootstrap`] in every frame of a `MemoryDocument`.
///
/// Stands in for the plugin document's script: attaches, waits for
/// `params`, optionally announces a title, then lives until its frame
/// window is destroyed or the channel closes.
#[derive(Clone, Default)]
pub struct InProcessPlugin {
    cfg: ChannelConfig,
    title: Option<String>,
    handlers: Vec<(String, Arc<dyn MessageHandler>)>,
    ready: Option<mpsc::UnboundedSender<BootstrapParams>>,
}

impl InProcessPlugin {
    pub fn new(cfg: ChannelConfig) -> Self {
        Self {
            cfg,
            ..Self::default()
        }
    }

    /// Send `setTitle` to the host once params arrived.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Extra plugin-side handler, registered before the handshake.
    pub fn handle<H>(mut self, name: &str, handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.handlers.push((name.to_string(), Arc::new(handler)));
        self
    }

    /// Receive the params each frame got.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<BootstrapParams> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.ready = Some(tx);
        rx
    }

    async fn run(&self, window: &MemoryWindow, parent: &MemoryWindow, src: &Url) -> Result<()> {
        let plugin = PluginBootstrap::attach(window.handle(), parent.handle(), src, self.cfg.clone())?;
        for (name, handler) in &self.handlers {
            plugin.channel().on_shared(name, Arc::clone(handler))?;
        }

        let params = plugin
            .params(self.cfg.handshake_timeout + self.cfg.request_timeout)
            .await?;
        if let Some(title) = &self.title {
            plugin.set_title(title)?;
        }
        if let Some(ready) = &self.ready {
            let _ = ready.send(params);
        }

        plugin.closed().await;
        Ok(())
    }
}

impl PluginLoader for InProcessPlugin {
    fn load(&self, window: MemoryWindow, src: &Url) {
        let Some(parent) = window.parent() else {
            tracing::warn!(src = %src, "plugin window has no parent; not loaded");
            return;
        };
        let this = self.clone();
        let src = src.clone();
        let span = tracing::info_span!("plugin", origin = %src.origin().ascii_serialization());

        tokio::spawn(
            async move {
                tokio::select! {
                    res = this.run(&window, &parent, &src) => {
                        if let Err(e) = res {
                            tracing::warn!(error = %e, "plugin stopped");
                        }
                    }
                    _ = window.closed() => {
                        tracing::debug!("plugin window destroyed");
                    }
                }
            }
            .instrument(span),
        );
    }
}
