//! framelink runtime library entry.
//!
//! This crate wires the window transport, origin policy, channel router,
//! channels, plugin host controller and panel into one stack for both ends
//! of an embedded plugin. It is consumed by the demo binary (`main.rs`) and
//! by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod channel;
pub mod config;
pub mod dom;
pub mod obs;
pub mod panel;
pub mod plugin;
pub mod policy;
pub mod transport;
pub mod ui;
