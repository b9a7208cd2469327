//! Correlation table — matches response envelopes to in-flight requests.
//!
//! Each tracked request owns a single-fulfillment oneshot slot.  A request
//! is resolved exactly once: by a matching response, by its own deadline,
//! or by [`fail_all`](CorrelationTable::fail_all) on disconnect.  Tables
//! are connection-scoped; the connection task installs a fresh one on every
//! transition into `Connected` so a response from a previous connection can
//! never resolve a request from the current one.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use devlink_protocol::Envelope;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::types::RequestError;

type Pending = Arc<Mutex<HashMap<String, PendingRequest>>>;

struct PendingRequest {
    created_at: Instant,
    tx: oneshot::Sender<Result<Envelope, RequestError>>,
}

/// Thread-safe map of `message_id` → pending request slot.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct CorrelationTable {
    pending: Pending,
}

/// Removes the tracked entry when the caller's wait ends for any reason —
/// resolution, timeout, or the caller dropping the future.  Removal after
/// resolve is a no-op.
struct Untrack {
    pending: Pending,
    message_id: String,
}

impl Drop for Untrack {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.message_id);
    }
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `message_id` and return the awaitable for its resolution.
    ///
    /// The entry exists before this returns, so the caller may send the
    /// request immediately afterwards without racing the response.  The
    /// returned future enforces `timeout` on its own; dropping it removes
    /// only this entry.
    pub fn track(
        &self,
        message_id: impl Into<String>,
        timeout: Duration,
    ) -> impl Future<Output = Result<Envelope, RequestError>> + Send + 'static {
        let message_id = message_id.into();
        let (tx, rx) = oneshot::channel();
        let prev = self.pending.lock().insert(
            message_id.clone(),
            PendingRequest {
                created_at: Instant::now(),
                tx,
            },
        );
        // message_id is a fresh UUID; assert rather than handle collisions.
        debug_assert!(prev.is_none(), "message_id collision: {message_id}");

        let untrack = Untrack {
            pending: Arc::clone(&self.pending),
            message_id,
        };
        async move {
            let _untrack = untrack;
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(outcome)) => outcome,
                // Sender dropped without resolving: the table was replaced.
                Ok(Err(_)) => Err(RequestError::Disconnected("connection closed".into())),
                Err(_) => Err(RequestError::Timeout),
            }
        }
    }

    /// Fulfill the request matching `correlation_id` with `envelope`.
    ///
    /// An unmatched response is dropped silently — it usually belongs to a
    /// request that already timed out.
    pub fn resolve(&self, correlation_id: &str, envelope: Envelope) {
        match self.pending.lock().remove(correlation_id) {
            Some(entry) => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
                    "resolved in-flight request"
                );
                let _ = entry.tx.send(Ok(envelope));
            }
            None => {
                tracing::debug!(
                    correlation_id = %correlation_id,
                    "dropping response for unknown or expired request"
                );
            }
        }
    }

    /// Fail every still-pending request with `reason` and clear the table.
    /// Called on disconnect.  Returns the number of requests failed.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut pending = self.pending.lock();
            pending.drain().map(|(_, entry)| entry).collect()
        };
        let count = drained.len();
        for entry in drained {
            let _ = entry
                .tx
                .send(Err(RequestError::Disconnected(reason.to_string())));
        }
        if count > 0 {
            tracing::warn!(failed_requests = count, reason = %reason, "failed in-flight requests");
        }
        count
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}
