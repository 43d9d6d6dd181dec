//! Origin allow-list compilation and matching.
//!
//! Entries are normalized to their serialized origin (`scheme://host[:port]`)
//! at compile time. `"*"` is only accepted when wildcard is explicitly
//! permitted.

use url::Url;

use framelink_core::error::{ChannelError, Result};

/// Wildcard origin (matches anything / posts to any origin).
pub const WILDCARD: &str = "*";

/// Normalize a URL or origin string to its serialized origin.
pub fn normalize_origin(raw: &str) -> Result<String> {
    if raw == WILDCARD {
        return Ok(WILDCARD.to_string());
    }
    let url = Url::parse(raw)
        .map_err(|e| ChannelError::Config(format!("invalid origin {raw}: {e}")))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(ChannelError::Config(format!("opaque origin not allowed: {raw}")));
    }
    Ok(origin.ascii_serialization())
}

/// Compiled origin allow-list.
#[derive(Debug, Clone)]
pub struct OriginAllowlist {
    origins: Vec<String>,
    wildcard: bool,
}

impl OriginAllowlist {
    pub fn compile(raw: &[String], allow_wildcard: bool) -> Result<Self> {
        let mut origins = Vec::with_capacity(raw.len());
        let mut wildcard = false;
        for s in raw {
            if s == WILDCARD {
                if !allow_wildcard {
                    return Err(ChannelError::Config(
                        "wildcard origin requires allow_wildcard_origin".into(),
                    ));
                }
                wildcard = true;
                continue;
            }
            origins.push(normalize_origin(s)?);
        }
        if origins.is_empty() && !wildcard {
            return Err(ChannelError::Config("origin allow-list must not be empty".into()));
        }
        Ok(Self { origins, wildcard })
    }

    /// Allow exactly one origin.
    pub fn single(origin: &str) -> Result<Self> {
        Self::compile(&[origin.to_string()], false)
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.wildcard {
            return true;
        }
        if self.origins.iter().any(|o| o == origin) {
            return true;
        }
        // Inbound origins are normally already serialized; tolerate a trailing
        // path or slash from hand-built events.
        match normalize_origin(origin) {
            Ok(n) if n != WILDCARD => self.origins.iter().any(|o| *o == n),
            _ => false,
        }
    }
}
