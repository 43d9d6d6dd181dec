//! Lightweight in-process diagnostics (dependency-free).

pub mod stats;

pub use stats::{StatsSnapshot, TransportStats};
