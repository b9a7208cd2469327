//! Heartbeat scheduler — periodic liveness signal while connected.
//!
//! Acks are informational only: missed `heartbeat_ack`s never declare the
//! connection dead.  Transport-level liveness (WebSocket ping/pong) is the
//! failure detector.

use std::time::Duration;

use devlink_protocol::Envelope;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Emit a `heartbeat` envelope every `interval` until `cancel` fires or the
/// outbound channel closes.  Either way the scheduler stops for good; the
/// connection task spawns a new one per connection.
pub(crate) async fn run(
    device_id: String,
    interval: Duration,
    outbound: mpsc::Sender<Envelope>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if outbound.send(Envelope::heartbeat(&device_id)).await.is_err() {
                    break;
                }
            }
        }
    }
    tracing::debug!(device_id = %device_id, "heartbeat scheduler stopped");
}
