//! Frame URL: where the plugin document lives and what it is told on load.

use url::Url;
use uuid::Uuid;

use framelink_core::error::{ChannelError, Result};
use framelink_core::protocol::ChannelId;

const FRAME_ID: &str = "frameId";
const CHANNEL_ID: &str = "channelId";
const PARENT_HOST: &str = "parentHost";

/// Identity a frame reads from its own URL query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameQuery {
    pub frame_id: String,
    pub channel_id: ChannelId,
    /// Origin of the embedding document.
    pub parent_host: String,
}

impl FrameQuery {
    pub fn new_frame_id() -> String {
        format!("frame_{}", Uuid::new_v4())
    }

    /// `base` with this query replacing any existing one.
    pub fn apply(&self, base: &Url) -> Url {
        let mut url = base.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair(FRAME_ID, &self.frame_id)
            .append_pair(CHANNEL_ID, self.channel_id.as_str())
            .append_pair(PARENT_HOST, &self.parent_host);
        url
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let mut frame_id = None;
        let mut channel_id = None;
        let mut parent_host = None;

        for (k, v) in url.query_pairs() {
            match k.as_ref() {
                FRAME_ID => frame_id = Some(v.into_owned()),
                CHANNEL_ID => channel_id = Some(v.into_owned()),
                PARENT_HOST => parent_host = Some(v.into_owned()),
                _ => {}
            }
        }

        Ok(Self {
            frame_id: required(frame_id, FRAME_ID)?,
            channel_id: ChannelId::from(required(channel_id, CHANNEL_ID)?),
            parent_host: required(parent_host, PARENT_HOST)?,
        })
    }
}

fn required(v: Option<String>, key: &str) -> Result<String> {
    match v {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ChannelError::Config(format!("frame URL is missing {key}"))),
    }
}

/// Plugin document URL: `path` resolved against the host base URL.
pub fn plugin_url(base: &Url, path: &str) -> Result<Url> {
    base.join(path)
        .map_err(|e| ChannelError::Config(format!("invalid plugin path {path}: {e}")))
}

