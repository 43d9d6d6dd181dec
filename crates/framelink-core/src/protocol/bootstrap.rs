//! Bootstrap parameters handed from host to plugin over the `params` message.

use serde::{Deserialize, Serialize};

use super::ids::ChannelId;

/// Message name carrying [`BootstrapParams`].
pub const PARAMS: &str = "params";

/// Service endpoints the embedded application talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceUrls {
    #[serde(rename = "groupsServiceURL")]
    pub groups_service_url: String,
    #[serde(rename = "userProfileServiceURL")]
    pub user_profile_service_url: String,
    #[serde(rename = "workspaceServiceURL")]
    pub workspace_service_url: String,
}

/// Everything the plugin needs to reach its services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BootstrapParams {
    pub frame_id: String,
    pub channel_id: ChannelId,
    /// Origin of the host document.
    pub parent_host: String,
    pub params: ServiceUrls,
}
