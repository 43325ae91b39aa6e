//! Listen key refresh loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::ListenKey;
use crate::rest::UserDataApi;

/// Refreshes `key` every `period` until `session` is cancelled.
///
/// The first refresh happens one period after start. Failures are logged
/// and the loop carries on: if the key really lapsed, the server closes
/// the stream and the session is rebuilt.
pub async fn keepalive_loop<A: UserDataApi>(
    api: Arc<A>,
    key: ListenKey,
    period: Duration,
    session: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            () = session.cancelled() => {
                debug!("Keepalive stopped");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = api.keep_alive_listen_key(&key).await {
                    warn!(error = %e, "Listen key keepalive failed");
                }
            }
        }
    }
}
