use std::time::Duration;

use crate::config::ChannelSection;

/// Which end of the handshake a channel plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the channel id and sends `handshake-syn` (the host).
    Initiator,
    /// Answers `handshake-syn` with `handshake-ack` (the plugin).
    Responder,
}

/// Handshake / lifecycle state.
///
/// Initiator: `Uninitialized -> SynSent -> Established -> Closed`.
/// Responder: `Uninitialized -> SynReceived -> Established -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    SynSent,
    SynReceived,
    Established,
    Closed,
}

/// Channel timing.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Deadline for the handshake ack.
    pub handshake_timeout: Duration,
    /// Interval between repeated `handshake-syn` posts.
    pub handshake_retry: Duration,
    /// Default request deadline (used for the `params` exchange).
    pub request_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(5000),
            handshake_retry: Duration::from_millis(250),
            request_timeout: Duration::from_millis(10000),
        }
    }
}

/// Whole milliseconds in `d`, saturating.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl From<&ChannelSection> for ChannelConfig {
    fn from(s: &ChannelSection) -> Self {
        Self {
            handshake_timeout: Duration::from_millis(s.handshake_timeout_ms),
            handshake_retry: Duration::from_millis(s.handshake_retry_ms),
            request_timeout: Duration::from_millis(s.request_timeout_ms),
        }
    }
}
