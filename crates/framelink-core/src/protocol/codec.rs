//! Envelope codec: typed [`Envelope`] <-> transport payload (`serde_json::Value`).
//!
//! Decoding rules:
//! - Unknown top-level fields, unknown kinds and empty ids are rejected.
//! - Kind-specific fields are checked here, so nothing past this boundary has
//!   to re-validate shape.
//! - Never panics; every failure is a [`DecodeError`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::error::{ChannelError, Result};

use super::envelope::{Body, Envelope, Kind};
use super::ids::{ChannelId, EnvelopeId};

/// Flat wire form.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct WireEnvelope {
    channel_id: String,
    envelope_id: String,
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in_reply_to: Option<String>,
}

/// Decode failure. `channel_id` is set when the raw payload still named a
/// channel, so the failure can be reported to it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct DecodeError {
    pub channel_id: Option<ChannelId>,
    pub reason: String,
}

impl From<DecodeError> for ChannelError {
    fn from(e: DecodeError) -> Self {
        ChannelError::Malformed(e.reason)
    }
}

/// Encode an envelope into its transport payload.
pub fn encode(env: &Envelope) -> Result<Value> {
    let (name, payload, in_reply_to) = match &env.body {
        Body::HandshakeSyn { origin } | Body::HandshakeAck { origin } => {
            (None, json!({ "origin": origin }), None)
        }
        Body::Send { name, payload } | Body::Request { name, payload } => {
            (Some(name.clone()), payload.clone(), None)
        }
        Body::Response {
            in_reply_to,
            name,
            payload,
        } => (
            Some(name.clone()),
            payload.clone(),
            Some(in_reply_to.as_str().to_string()),
        ),
        Body::Error {
            in_reply_to,
            message,
        } => (
            None,
            json!({ "message": message }),
            Some(in_reply_to.as_str().to_string()),
        ),
    };

    let wire = WireEnvelope {
        channel_id: env.channel_id.as_str().to_string(),
        envelope_id: env.envelope_id.as_str().to_string(),
        kind: env.kind().as_str().to_string(),
        name,
        payload,
        in_reply_to,
    };

    serde_json::to_value(&wire)
        .map_err(|e| ChannelError::Internal(format!("envelope encode failed: {e}")))
}

/// Decode a transport payload into an envelope.
pub fn decode(raw: &Value) -> std::result::Result<Envelope, DecodeError> {
    let hint = raw
        .get("channelId")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(ChannelId::from);
    let fail = |reason: String| DecodeError {
        channel_id: hint.clone(),
        reason,
    };

    let wire = WireEnvelope::deserialize(raw).map_err(|e| fail(format!("invalid envelope: {e}")))?;

    if wire.channel_id.is_empty() {
        return Err(fail("channelId must not be empty".into()));
    }
    if wire.envelope_id.is_empty() {
        return Err(fail("envelopeId must not be empty".into()));
    }
    let kind = Kind::parse(&wire.kind).ok_or_else(|| fail(format!("unknown kind: {}", wire.kind)))?;

    let body = match kind {
        Kind::HandshakeSyn | Kind::HandshakeAck => {
            forbid(wire.name.is_some(), kind, "name").map_err(&fail)?;
            forbid(wire.in_reply_to.is_some(), kind, "inReplyTo").map_err(&fail)?;
            let origin = string_field(&wire.payload, "origin")
                .ok_or_else(|| fail(format!("{} requires payload.origin", kind.as_str())))?;
            if kind == Kind::HandshakeSyn {
                Body::HandshakeSyn { origin }
            } else {
                Body::HandshakeAck { origin }
            }
        }
        Kind::Send | Kind::Request => {
            forbid(wire.in_reply_to.is_some(), kind, "inReplyTo").map_err(&fail)?;
            let name = require_name(wire.name, kind).map_err(&fail)?;
            if kind == Kind::Send {
                Body::Send {
                    name,
                    payload: wire.payload,
                }
            } else {
                Body::Request {
                    name,
                    payload: wire.payload,
                }
            }
        }
        Kind::Response => {
            let name = require_name(wire.name, kind).map_err(&fail)?;
            let in_reply_to = require_reply(wire.in_reply_to, kind).map_err(&fail)?;
            Body::Response {
                in_reply_to,
                name,
                payload: wire.payload,
            }
        }
        Kind::Error => {
            forbid(wire.name.is_some(), kind, "name").map_err(&fail)?;
            let in_reply_to = require_reply(wire.in_reply_to, kind).map_err(&fail)?;
            let message = string_field(&wire.payload, "message")
                .ok_or_else(|| fail("error requires payload.message".into()))?;
            Body::Error {
                in_reply_to,
                message,
            }
        }
    };

    Ok(Envelope {
        channel_id: ChannelId::from(wire.channel_id),
        envelope_id: EnvelopeId::from(wire.envelope_id.as_str()),
        body,
    })
}

fn forbid(present: bool, kind: Kind, field: &str) -> std::result::Result<(), String> {
    if present {
        Err(format!("{} must not carry {field}", kind.as_str()))
    } else {
        Ok(())
    }
}

fn require_name(name: Option<String>, kind: Kind) -> std::result::Result<String, String> {
    match name {
        Some(n) if !n.is_empty() => Ok(n),
        _ => Err(format!("{} requires a non-empty name", kind.as_str())),
    }
}

fn require_reply(id: Option<String>, kind: Kind) -> std::result::Result<EnvelopeId, String> {
    match id {
        Some(id) if !id.is_empty() => Ok(EnvelopeId::from(id.as_str())),
        _ => Err(format!("{} requires inReplyTo", kind.as_str())),
    }
}

fn string_field(payload: &Value, key: &str) -> Option<String> {
    payload.get(key).and_then(Value::as_str).map(str::to_string)
}
