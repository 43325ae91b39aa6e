//! Async user data stream client.
//!
//! This module is organized by concern:
//! - [`subscriber`] - Stream read loop and bounded frame hand-off
//! - [`dispatcher`] - Frame parsing and account state updates
//! - [`keepalive`] - Periodic listen key refresh
//! - [`watchdog`] - Stale order detection
//! - [`supervisor`] - Bootstrap / stream / reconnect state machine

mod dispatcher;
mod keepalive;
mod subscriber;
mod supervisor;
mod watchdog;

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config};
use tracing::info;
use tungstenite::Message;

use crate::Result;
use crate::models::ListenKey;

pub use dispatcher::Dispatcher;
pub use keepalive::keepalive_loop;
pub use subscriber::{Delivery, forward_frame, subscribe};
pub use supervisor::{AccountSync, SessionState};
pub use watchdog::watchdog_loop;

/// Write half of a user data stream connection.
pub type WsWriter = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Read half of a user data stream connection.
pub type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Establishes a WebSocket connection to the given URL.
///
/// A custom TLS config replaces the built-in web PKI roots for `wss://`
/// URLs; it is ignored for plain `ws://`.
///
/// # Errors
///
/// Returns a [`UserStreamError`](crate::UserStreamError) if the connection
/// or TLS handshake fails.
pub async fn connect(
    url: &str,
    tls: Option<Arc<rustls::ClientConfig>>,
) -> Result<(WsWriter, WsReader)> {
    let connector = tls.map(Connector::Rustls);
    let (ws_stream, _) = connect_async_tls_with_config(url, None, false, connector).await?;
    info!("WebSocket handshake completed");

    Ok(ws_stream.split())
}

/// Per-listen-key stream URL: `<base>/ws/<listenKey>`.
pub fn stream_endpoint(base: &str, key: &ListenKey) -> String {
    format!("{}/ws/{}", base.trim_end_matches('/'), key.as_str())
}
