//! Protocol modules (envelope, codec, bootstrap payload).
//!
//! - `envelope`: the typed message unit exchanged over a channel.
//! - `codec`: strict conversion to/from the transport payload.
//! - `bootstrap`: the configuration payload delivered to a plugin.
//!
//! The codec is panic-free: anything that is not a structurally valid
//! envelope comes back as a `DecodeError`, so a stale or hostile context can
//! never crash a channel.

pub mod bootstrap;
pub mod codec;
pub mod envelope;
pub mod ids;

pub use bootstrap::{BootstrapParams, ServiceUrls, PARAMS};
pub use codec::{decode, encode, DecodeError};
pub use envelope::{Body, Envelope, Kind};
pub use ids::{ChannelId, EnvelopeId};
