//! Host-wide UI directives (`send("ui", "setTitle", ...)`).

pub mod bus;

pub use bus::{BusHandler, MessageBus, SubscriptionId};

/// Bus channel for UI directives.
pub const UI: &str = "ui";
