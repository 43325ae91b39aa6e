//! Binance user data stream client library.
//!
//! Keeps a local mirror of an exchange account (balances and open orders)
//! by combining a signed REST snapshot with the listen-key WebSocket
//! stream, and reconnects on its own when the stream breaks or goes
//! quiet.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod rest;
pub mod state;
pub mod tls;
pub mod websocket;

pub use error::{Result, UserStreamError};
