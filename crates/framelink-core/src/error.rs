//! Shared error type across framelink crates.

use std::time::Duration;

use thiserror::Error;

/// Stable error codes (the spelling used in diagnostics and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Inbound payload is not a valid envelope.
    MalformedMessage,
    /// No handshake ack within the deadline.
    HandshakeTimeout,
    /// No response within the request deadline.
    RequestTimeout,
    /// Operation attempted on a closed (or not yet established) channel.
    ChannelClosed,
    /// A remote handler failed while processing a request.
    HandlerError,
    /// Invalid configuration.
    BadConfig,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedMessage => "malformed-message",
            ErrorCode::HandshakeTimeout => "handshake-timeout",
            ErrorCode::RequestTimeout => "request-timeout",
            ErrorCode::ChannelClosed => "channel-closed",
            ErrorCode::HandlerError => "handler-error",
            ErrorCode::BadConfig => "bad-config",
            ErrorCode::Internal => "internal",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// Unified error type used by core and runtime.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("handshake timed out after {timeout_ms} ms")]
    HandshakeTimeout { timeout_ms: u64 },
    #[error("request '{name}' timed out after {timeout_ms} ms")]
    RequestTimeout { name: String, timeout_ms: u64 },
    #[error("channel closed")]
    ChannelClosed,
    #[error("channel not established")]
    NotEstablished,
    #[error("handler error: {0}")]
    Handler(String),
    #[error("bad config: {0}")]
    Config(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl ChannelError {
    /// `HandshakeTimeout` for a deadline of `after` (saturating at `u64::MAX` ms).
    pub fn handshake_timeout(after: Duration) -> Self {
        ChannelError::HandshakeTimeout {
            timeout_ms: saturating_ms(after),
        }
    }

    pub fn request_timeout(name: impl Into<String>, after: Duration) -> Self {
        ChannelError::RequestTimeout {
            name: name.into(),
            timeout_ms: saturating_ms(after),
        }
    }

    /// Map to a stable code.
    ///
    /// `NotEstablished` shares `channel-closed`: callers treat "not yet open"
    /// and "no longer open" the same way.
    pub fn code(&self) -> ErrorCode {
        match self {
            ChannelError::Malformed(_) => ErrorCode::MalformedMessage,
            ChannelError::HandshakeTimeout { .. } => ErrorCode::HandshakeTimeout,
            ChannelError::RequestTimeout { .. } => ErrorCode::RequestTimeout,
            ChannelError::ChannelClosed | ChannelError::NotEstablished => {
                ErrorCode::ChannelClosed
            }
            ChannelError::Handler(_) => ErrorCode::HandlerError,
            ChannelError::Config(_) => ErrorCode::BadConfig,
            ChannelError::Internal(_) => ErrorCode::Internal,
        }
    }
}

fn saturating_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
