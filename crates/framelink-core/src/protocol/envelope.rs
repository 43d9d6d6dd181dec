//! Channel envelope: routing, correlation and payload of one message.
//!
//! The in-memory form is a tagged variant, so a `response` without
//! `inReplyTo` or a `send` without `name` cannot be constructed. The flat wire
//! form lives in [`crate::protocol::codec`].

use serde_json::Value;

use super::ids::{ChannelId, EnvelopeId};

/// Wire `kind` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    HandshakeSyn,
    HandshakeAck,
    Send,
    Request,
    Response,
    Error,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::HandshakeSyn => "handshake-syn",
            Kind::HandshakeAck => "handshake-ack",
            Kind::Send => "send",
            Kind::Request => "request",
            Kind::Response => "response",
            Kind::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "handshake-syn" => Some(Kind::HandshakeSyn),
            "handshake-ack" => Some(Kind::HandshakeAck),
            "send" => Some(Kind::Send),
            "request" => Some(Kind::Request),
            "response" => Some(Kind::Response),
            "error" => Some(Kind::Error),
            _ => None,
        }
    }
}

/// Kind-specific content of an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Initiator announces itself; carries its origin.
    HandshakeSyn { origin: String },
    /// Responder confirms its listener is attached.
    HandshakeAck { origin: String },
    /// Fire-and-forget message.
    Send { name: String, payload: Value },
    /// Message expecting exactly one `Response` or `Error`.
    Request { name: String, payload: Value },
    Response {
        in_reply_to: EnvelopeId,
        name: String,
        payload: Value,
    },
    /// Failure answer; only a message crosses the boundary.
    Error {
        in_reply_to: EnvelopeId,
        message: String,
    },
}

impl Body {
    pub fn kind(&self) -> Kind {
        match self {
            Body::HandshakeSyn { .. } => Kind::HandshakeSyn,
            Body::HandshakeAck { .. } => Kind::HandshakeAck,
            Body::Send { .. } => Kind::Send,
            Body::Request { .. } => Kind::Request,
            Body::Response { .. } => Kind::Response,
            Body::Error { .. } => Kind::Error,
        }
    }
}

/// One message on a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub channel_id: ChannelId,
    pub envelope_id: EnvelopeId,
    pub body: Body,
}

impl Envelope {
    fn new(channel_id: ChannelId, body: Body) -> Self {
        Self {
            channel_id,
            envelope_id: EnvelopeId::generate(),
            body,
        }
    }

    pub fn syn(channel_id: ChannelId, origin: impl Into<String>) -> Self {
        Self::new(channel_id, Body::HandshakeSyn { origin: origin.into() })
    }

    pub fn ack(channel_id: ChannelId, origin: impl Into<String>) -> Self {
        Self::new(channel_id, Body::HandshakeAck { origin: origin.into() })
    }

    pub fn send(channel_id: ChannelId, name: impl Into<String>, payload: Value) -> Self {
        Self::new(
            channel_id,
            Body::Send {
                name: name.into(),
                payload,
            },
        )
    }

    pub fn request(channel_id: ChannelId, name: impl Into<String>, payload: Value) -> Self {
        Self::new(
            channel_id,
            Body::Request {
                name: name.into(),
                payload,
            },
        )
    }

    pub fn response(
        channel_id: ChannelId,
        in_reply_to: EnvelopeId,
        name: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::new(
            channel_id,
            Body::Response {
                in_reply_to,
                name: name.into(),
                payload,
            },
        )
    }

    pub fn error(channel_id: ChannelId, in_reply_to: EnvelopeId, message: impl Into<String>) -> Self {
        Self::new(
            channel_id,
            Body::Error {
                in_reply_to,
                message: message.into(),
            },
        )
    }

    pub fn kind(&self) -> Kind {
        self.body.kind()
    }

    /// Application name, for kinds that carry one.
    pub fn name(&self) -> Option<&str> {
        match &self.body {
            Body::Send { name, .. } | Body::Request { name, .. } | Body::Response { name, .. } => {
                Some(name)
            }
            _ => None,
        }
    }
}
