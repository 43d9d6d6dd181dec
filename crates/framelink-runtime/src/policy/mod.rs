//! Policy layer (origin allow-listing).
//!
//! Compiles configured origins into a normalized lookup consumed by the
//! transport adapter before any inbound payload is decoded.

pub mod allowlist;

pub use allowlist::{normalize_origin, OriginAllowlist, WILDCARD};
