//! Stale order watchdog.
//!
//! An order submitted locally should show up on the stream within a few
//! hundred milliseconds. If the oldest tracked order stays unconfirmed
//! past the threshold, the stream is assumed stalled and the session is
//! torn down.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::state::OrderTracker;

/// Polls `tracker` every `interval` and cancels `session` on the first
/// stale order, then exits.
pub async fn watchdog_loop(
    tracker: Arc<OrderTracker>,
    threshold: Duration,
    interval: Duration,
    session: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);

    loop {
        tokio::select! {
            () = session.cancelled() => return,
            _ = ticker.tick() => {
                if let Some(stale) = tracker.check(std::time::Instant::now(), threshold) {
                    warn!(
                        symbol = %stale.key.symbol,
                        order_id = stale.key.order_id,
                        age_ms = stale.age.as_millis() as u64,
                        dropped = stale.dropped,
                        "Order not confirmed by stream, forcing reconnect"
                    );
                    session.cancel();
                    return;
                }
            }
        }
    }
}
