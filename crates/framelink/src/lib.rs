//! Top-level facade crate for framelink.
//!
//! Re-exports the wire contract and the runtime so users can depend on a single crate.

pub mod core {
    pub use framelink_core::*;
}

pub mod runtime {
    pub use framelink_runtime::*;
}
