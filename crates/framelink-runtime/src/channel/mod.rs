//! Channel: handshake state machine + request/response correlation.
//!
//! - `state`: roles, lifecycle states, timing
//! - `handlers`: inbound handler trait and registry
//! - `pending`: outstanding request bookkeeping
//! - `core`: the `Channel` itself

mod core;
pub mod handlers;
mod pending;
pub mod state;

pub use self::core::Channel;
pub use handlers::{handler_fn, FnHandler, HandlerError, HandlerId, Incoming, MessageHandler};
pub use state::{ChannelConfig, ChannelState, Role};
pub(crate) use state::millis;
