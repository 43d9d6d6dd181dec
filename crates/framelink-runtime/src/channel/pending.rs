//! Pending request table: envelope id -> waiting caller.
//!
//! Removal is the only way to resolve an entry, and removal happens under the
//! table lock, so each request settles at most once no matter whether the
//! response, the timer or `close` gets there first.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use framelink_core::error::{ChannelError, Result};
use framelink_core::protocol::EnvelopeId;

pub(crate) struct PendingRequest {
    name: String,
    created_at: Instant,
    resolve: oneshot::Sender<Result<Value>>,
    timeout_handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct PendingTable {
    map: Mutex<HashMap<EnvelopeId, PendingRequest>>,
}

impl PendingTable {
    /// Register a waiter. `arm_timer` runs under the table lock, so the timer
    /// cannot fire before the entry exists.
    pub(crate) fn register<F>(
        &self,
        id: EnvelopeId,
        name: &str,
        resolve: oneshot::Sender<Result<Value>>,
        arm_timer: F,
    ) where
        F: FnOnce() -> JoinHandle<()>,
    {
        let mut map = self.map.lock();
        let timeout_handle = arm_timer();
        map.insert(
            id,
            PendingRequest {
                name: name.to_string(),
                created_at: Instant::now(),
                resolve,
                timeout_handle,
            },
        );
    }

    /// Resolve and remove one entry. Returns `false` if it was already gone
    /// (late response, duplicate answer, or expired).
    pub(crate) fn settle(&self, id: &EnvelopeId, outcome: Result<Value>) -> bool {
        let Some(req) = self.map.lock().remove(id) else {
            return false;
        };
        req.timeout_handle.abort();
        tracing::trace!(
            envelope_id = %id,
            name = %req.name,
            elapsed_ms = super::state::millis(req.created_at.elapsed()),
            ok = outcome.is_ok(),
            "request settled"
        );
        // The caller may have dropped its receiver; resolving into the void is fine.
        let _ = req.resolve.send(outcome);
        true
    }

    /// Reject everything still waiting.
    pub(crate) fn reject_all(&self, err: &ChannelError) -> usize {
        let drained: Vec<PendingRequest> = self.map.lock().drain().map(|(_, req)| req).collect();
        let n = drained.len();
        for req in drained {
            req.timeout_handle.abort();
            let _ = req.resolve.send(Err(err.clone()));
        }
        n
    }

    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}
