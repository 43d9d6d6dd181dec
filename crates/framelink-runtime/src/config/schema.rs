use serde::Deserialize;
use url::Url;

use framelink_core::error::{ChannelError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FramelinkConfig {
    pub version: u32,

    pub host: HostSection,

    #[serde(default)]
    pub channel: ChannelSection,

    pub plugin: PluginSection,
}

impl FramelinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(ChannelError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }

        self.host.validate()?;
        self.channel.validate()?;
        self.plugin.validate()?;

        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostSection {
    /// Host document URL. Its origin is the allow-list for inbound messages.
    pub url: String,

    /// Permit `"*"` as allowed origin / target origin.
    #[serde(default)]
    pub allow_wildcard_origin: bool,
}

impl HostSection {
    pub fn validate(&self) -> Result<()> {
        self.base_url().map(|_| ())
    }

    pub fn base_url(&self) -> Result<Url> {
        parse_url("host.url", &self.url)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelSection {
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,

    #[serde(default = "default_handshake_retry_ms")]
    pub handshake_retry_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout_ms(),
            handshake_retry_ms: default_handshake_retry_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ChannelSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=60000).contains(&self.handshake_timeout_ms) {
            return Err(ChannelError::Config(
                "channel.handshake_timeout_ms must be between 100 and 60000".into(),
            ));
        }
        if !(10..=self.handshake_timeout_ms).contains(&self.handshake_retry_ms) {
            return Err(ChannelError::Config(
                "channel.handshake_retry_ms must be between 10 and handshake_timeout_ms".into(),
            ));
        }
        if !(100..=120000).contains(&self.request_timeout_ms) {
            return Err(ChannelError::Config(
                "channel.request_timeout_ms must be between 100 and 120000".into(),
            ));
        }
        Ok(())
    }
}

fn default_handshake_timeout_ms() -> u64 {
    5000
}
fn default_handshake_retry_ms() -> u64 {
    250
}
fn default_request_timeout_ms() -> u64 {
    10000
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginSection {
    /// Plugin document path, relative to the host URL.
    pub path: String,

    #[serde(default = "default_title")]
    pub title: String,

    pub services: ServicesSection,
}

impl PluginSection {
    pub fn validate(&self) -> Result<()> {
        if self.path.trim().is_empty() {
            return Err(ChannelError::Config("plugin.path must not be empty".into()));
        }
        self.services.validate()
    }
}

fn default_title() -> String {
    "Organizations".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServicesSection {
    pub groups_url: String,
    pub user_profile_url: String,
    pub workspace_url: String,
}

impl ServicesSection {
    pub fn validate(&self) -> Result<()> {
        parse_url("plugin.services.groups_url", &self.groups_url)?;
        parse_url("plugin.services.user_profile_url", &self.user_profile_url)?;
        parse_url("plugin.services.workspace_url", &self.workspace_url)?;
        Ok(())
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| ChannelError::Config(format!("{field} is not a valid URL: {e}")))
}
