//! Per-context transport counters.
//!
//! Dropped traffic is never an error surfaced to application code, so these
//! counters (plus the tracing output) are the only record of it.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct TransportStats {
    delivered: AtomicU64,
    origin_rejected: AtomicU64,
    malformed: AtomicU64,
    unrouted: AtomicU64,
}

impl TransportStats {
    pub fn inc_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_origin_rejected(&self) {
        self.origin_rejected.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_unrouted(&self) {
        self.unrouted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.delivered.load(Ordering::Relaxed),
            origin_rejected: self.origin_rejected.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Envelopes handed to a channel.
    pub delivered: u64,
    /// Events discarded by the origin allow-list.
    pub origin_rejected: u64,
    /// Payloads that failed envelope decoding.
    pub malformed: u64,
    /// Envelopes for a channel id nobody registered.
    pub unrouted: u64,
}

impl StatsSnapshot {
    /// Render as `key value` lines (Prometheus text style, no labels).
    pub fn render(&self, prefix: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{prefix}_delivered_total {}", self.delivered);
        let _ = writeln!(out, "{prefix}_origin_rejected_total {}", self.origin_rejected);
        let _ = writeln!(out, "{prefix}_malformed_total {}", self.malformed);
        let _ = writeln!(out, "{prefix}_unrouted_total {}", self.unrouted);
        out
    }
}
