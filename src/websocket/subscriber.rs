//! Stream read loop.
//!
//! Frames are handed to the dispatcher through a bounded queue. A push
//! that does not complete within the configured timeout drops the frame
//! so the socket keeps being read while the consumer is slow.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, interval_at, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tungstenite::Message;

use super::connect;
use crate::{Result, UserStreamError};

/// Outcome of handing one frame to the dispatcher queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The queue stayed full for the whole push timeout.
    Dropped,
    /// The receiving side is gone.
    Closed,
}

/// Pushes a frame onto the queue, giving up after `push_timeout`.
pub async fn forward_frame(
    tx: &mpsc::Sender<String>,
    frame: String,
    push_timeout: Duration,
) -> Delivery {
    match timeout(push_timeout, tx.send(frame)).await {
        Ok(Ok(())) => Delivery::Delivered,
        Ok(Err(_)) => Delivery::Closed,
        Err(_) => {
            warn!(
                timeout_ms = push_timeout.as_millis() as u64,
                "Frame queue full, dropping frame"
            );
            Delivery::Dropped
        }
    }
}

/// Connects to `url` and forwards every text frame to `tx` until the
/// stream fails or `session` is cancelled.
///
/// When `ping_interval` is set, transport pings are sent on that cadence
/// alongside the read loop.
///
/// # Errors
///
/// Always returns an error describing why the session ended:
/// - [`UserStreamError::WebSocket`] on connect or read failure
/// - [`UserStreamError::StreamClosed`] when the server ends the stream
/// - [`UserStreamError::ForcedReconnect`] when `session` is cancelled
/// - [`UserStreamError::QueueClosed`] when the dispatcher went away
pub async fn subscribe(
    url: &str,
    tls: Option<Arc<rustls::ClientConfig>>,
    tx: mpsc::Sender<String>,
    push_timeout: Duration,
    ping_interval: Option<Duration>,
    session: &CancellationToken,
) -> Result<()> {
    let (mut write, mut read) = tokio::select! {
        biased;
        () = session.cancelled() => {
            return Err(UserStreamError::ForcedReconnect("cancelled while connecting".to_string()));
        }
        pair = connect(url, tls) => pair?,
    };
    info!("User data stream connected");

    let mut ping: Option<Interval> =
        ping_interval.map(|period| interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            () = session.cancelled() => {
                let _ = write.send(Message::Close(None)).await;
                return Err(UserStreamError::ForcedReconnect("session cancelled".to_string()));
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match forward_frame(&tx, text.as_str().to_owned(), push_timeout).await {
                            Delivery::Delivered | Delivery::Dropped => {}
                            Delivery::Closed => return Err(UserStreamError::QueueClosed),
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!(frame = ?frame, "Server sent close frame");
                    }
                    Some(Ok(_)) => {} // Binary/Ping/Pong frames
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        return Err(e.into());
                    }
                    None => {
                        warn!("WebSocket stream ended");
                        return Err(UserStreamError::StreamClosed);
                    }
                }
            }

            () = next_ping(&mut ping) => {
                write.send(Message::Ping(Default::default())).await?;
                debug!("Sent ping");
            }
        }
    }
}

async fn next_ping(ping: &mut Option<Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
