//! Config loader (strict parsing).

pub mod schema;

use std::fs;

use framelink_core::error::{ChannelError, Result};

pub use schema::{ChannelSection, FramelinkConfig, HostSection, PluginSection, ServicesSection};

pub fn load_from_file(path: &str) -> Result<FramelinkConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| ChannelError::Config(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<FramelinkConfig> {
    let cfg: FramelinkConfig = serde_yaml::from_str(s)
        .map_err(|e| ChannelError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
