//! Crate-level error types.
//!
//! [`UserStreamError`] unifies every error source (configuration, REST,
//! WebSocket, JSON, decimal parsing) behind a single enum so callers can
//! match on the variant they care about while still using the `?`
//! operator for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, UserStreamError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum UserStreamError {
    /// An environment variable is missing or has an invalid value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The CA bundle or HTTP client could not be set up.
    #[error("tls error: {0}")]
    Tls(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// A REST request could not be sent or its body could not be read.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The exchange answered a REST call with a non-2xx status.
    #[error("upstream error: status {status}, code {code:?}: {msg}")]
    Upstream {
        status: u16,
        code: Option<i64>,
        msg: String,
    },

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stream frame carried a malformed field (decimal, discriminator).
    #[error("parse error: {0}")]
    Parse(String),

    /// The order is neither open nor recently completed.
    #[error("order {order_id} not found for {symbol}")]
    NotFound { symbol: String, order_id: i64 },

    /// The server closed the user data stream.
    #[error("stream closed by server")]
    StreamClosed,

    /// The session was torn down locally to force a fresh bootstrap.
    #[error("forced reconnect: {0}")]
    ForcedReconnect(String),

    /// The dispatcher queue has no receiver anymore.
    #[error("frame queue closed")]
    QueueClosed,
}
