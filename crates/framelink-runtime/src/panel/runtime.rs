use std::sync::Arc;

use serde_json::Value;
use url::Url;

use framelink_core::error::{ChannelError, Result};

use crate::channel::ChannelConfig;
use crate::config::{FramelinkConfig, HostSection, PluginSection};
use crate::policy::{normalize_origin, OriginAllowlist, WILDCARD};
use crate::transport::{ChannelRouter, WindowRef};
use crate::ui::MessageBus;

/// What the host page offers a panel: configuration, the directive bus and
/// the host context's channel router.
#[derive(Clone)]
pub struct HostRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    config: FramelinkConfig,
    base_url: Url,
    router: ChannelRouter,
    bus: MessageBus,
}

impl HostRuntime {
    pub fn new(config: FramelinkConfig, router: ChannelRouter) -> Result<Self> {
        config.validate()?;
        let base_url = config.host.base_url()?;
        Ok(Self {
            inner: Arc::new(RuntimeInner {
                config,
                base_url,
                router,
                bus: MessageBus::new(),
            }),
        })
    }

    /// Attach to the host window: inbound messages are accepted from the
    /// host document's own origin (plus any origin when wildcard is on).
    pub fn attach(config: FramelinkConfig, window: WindowRef) -> Result<Self> {
        let allowlist = host_allowlist(&config.host)?;
        let origin = normalize_origin(&config.host.url)?;
        if origin != window.origin() {
            return Err(ChannelError::Config(format!(
                "host.url origin {origin} does not match window origin {}",
                window.origin()
            )));
        }
        let router = ChannelRouter::attach(window, allowlist)?;
        Self::new(config, router)
    }

    /// Dotted configuration lookup, e.g. `services.Groups.url`.
    pub fn config(&self, key: &str) -> Option<String> {
        let cfg = &self.inner.config;
        let v = match key {
            "host.url" => &cfg.host.url,
            "plugin.path" => &cfg.plugin.path,
            "plugin.title" => &cfg.plugin.title,
            "services.Groups.url" => &cfg.plugin.services.groups_url,
            "services.UserProfile.url" => &cfg.plugin.services.user_profile_url,
            "services.Workspace.url" => &cfg.plugin.services.workspace_url,
            _ => return None,
        };
        Some(v.clone())
    }

    pub fn require(&self, key: &str) -> Result<String> {
        self.config(key)
            .ok_or_else(|| ChannelError::Config(format!("missing config value {key}")))
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    pub fn router(&self) -> &ChannelRouter {
        &self.inner.router
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn plugin(&self) -> &PluginSection {
        &self.inner.config.plugin
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig::from(&self.inner.config.channel)
    }

    /// Shorthand for `bus().send(...)`.
    pub fn send(&self, channel: &str, command: &str, payload: Value) -> usize {
        self.inner.bus.send(channel, command, payload)
    }
}

fn host_allowlist(host: &HostSection) -> Result<OriginAllowlist> {
    let mut raw = vec![host.url.clone()];
    if host.allow_wildcard_origin {
        raw.push(WILDCARD.to_string());
    }
    OriginAllowlist::compile(&raw, host.allow_wildcard_origin)
}
