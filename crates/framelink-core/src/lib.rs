//! framelink core: transport-agnostic envelope, codec and error types.
//!
//! This crate defines the wire-level contract shared by both ends of a
//! cross-context channel (host page and embedded plugin). It carries no
//! runtime or transport dependencies so either side can reuse it.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here. Malformed input
//! from another context must surface as `ChannelError`/`DecodeError`, never as
//! a crash.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ChannelError, ErrorCode, Result};
