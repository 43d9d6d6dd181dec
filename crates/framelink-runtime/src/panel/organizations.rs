use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};

use framelink_core::error::{ChannelError, Result};
use framelink_core::protocol::ServiceUrls;

use super::runtime::HostRuntime;
use crate::channel::{handler_fn, HandlerError, Incoming};
use crate::dom::NodeRef;
use crate::plugin::{Iframer, IframerConfig, SET_TITLE};
use crate::ui::UI;

/// Class of the container the panel appends to its host node.
pub const CONTAINER_CLASS: &str = "organizations-panel";

/// Host-page panel embedding the plugin.
pub struct Panel {
    runtime: HostRuntime,
    state: Mutex<PanelState>,
}

#[derive(Default)]
struct PanelState {
    container: Option<NodeRef>,
    iframer: Option<Arc<Iframer>>,
}

impl Panel {
    pub fn new(runtime: HostRuntime) -> Self {
        Self {
            runtime,
            state: Mutex::new(PanelState::default()),
        }
    }

    pub fn attach(&self, node: NodeRef) -> Result<()> {
        let mut state = self.state.lock();
        if state.container.is_some() {
            return Err(ChannelError::Internal("panel already attached".into()));
        }
        state.container = Some(node.append_container(CONTAINER_CLASS)?);
        Ok(())
    }

    pub fn container(&self) -> Option<NodeRef> {
        self.state.lock().container.clone()
    }

    pub fn iframer(&self) -> Option<Arc<Iframer>> {
        self.state.lock().iframer.clone()
    }

    /// Announce the title and start the plugin. Resolves with the plugin's
    /// acknowledgement of its parameters.
    pub async fn start(&self) -> Result<Value> {
        let params = ServiceUrls {
            groups_service_url: self.runtime.require("services.Groups.url")?,
            user_profile_service_url: self.runtime.require("services.UserProfile.url")?,
            workspace_service_url: self.runtime.require("services.Workspace.url")?,
        };

        let iframer = {
            let mut state = self.state.lock();
            let Some(container) = state.container.clone() else {
                return Err(ChannelError::Internal("panel is not attached".into()));
            };
            if state.iframer.is_some() {
                return Err(ChannelError::Internal("panel already started".into()));
            }
            let iframer = Arc::new(Iframer::new(
                self.runtime.router().clone(),
                container,
                IframerConfig {
                    base_url: self.runtime.base_url().clone(),
                    plugin_path: self.runtime.plugin().path.clone(),
                    params,
                    channel: self.runtime.channel_config(),
                },
            ));
            state.iframer = Some(Arc::clone(&iframer));
            iframer
        };

        // The plugin may retitle the page once it is running.
        let bus = self.runtime.bus().clone();
        iframer.handle(
            SET_TITLE,
            handler_fn(move |msg: Incoming| {
                let bus = bus.clone();
                async move {
                    if !msg.payload.is_string() {
                        return Err(HandlerError::new("setTitle expects a string"));
                    }
                    bus.send(UI, SET_TITLE, msg.payload);
                    Ok::<Value, HandlerError>(Value::Null)
                }
            }),
        )?;

        self.runtime
            .send(UI, SET_TITLE, json!(self.runtime.plugin().title));

        iframer.start().await
    }

    /// Stop the plugin and remove the container. Idempotent.
    pub fn stop(&self) {
        let (iframer, container) = {
            let mut state = self.state.lock();
            (state.iframer.take(), state.container.take())
        };
        if let Some(iframer) = iframer {
            iframer.stop();
        }
        if let Some(container) = container {
            container.remove();
        }
    }
}
