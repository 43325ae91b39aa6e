//! Shared models for the Binance REST and user data stream APIs.
//!
//! Contains account types, the listen-key token, and the event-type
//! discriminators carried in the `e` field of every stream frame.

pub mod account;
pub mod event;
pub mod order;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub use account::{AccountInfo, AccountSnapshot, Balance};
pub use event::UserEvent;
pub use order::{Order, OrderKey, OrderStatus};

/// Which wallet a user data stream is opened for.
///
/// Each variant maps to its own listen-key endpoint and account snapshot
/// endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountType {
    Spot,
    /// Cross margin account.
    Margin,
    /// Isolated margin account for a single symbol.
    IsolatedMargin(String),
}

impl AccountType {
    /// Path of the listen-key endpoint, relative to the API base URL.
    pub fn listen_key_path(&self) -> &'static str {
        match self {
            AccountType::Spot => "/api/v3/userDataStream",
            AccountType::Margin => "/sapi/v1/userDataStream",
            AccountType::IsolatedMargin(_) => "/sapi/v1/userDataStream/isolated",
        }
    }

    /// Symbol the account is bound to, for isolated margin only.
    pub fn isolated_symbol(&self) -> Option<&str> {
        match self {
            AccountType::IsolatedMargin(symbol) => Some(symbol),
            _ => None,
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountType::Spot => f.write_str("spot"),
            AccountType::Margin => f.write_str("margin"),
            AccountType::IsolatedMargin(symbol) => write!(f, "isolated:{symbol}"),
        }
    }
}

impl FromStr for AccountType {
    type Err = crate::UserStreamError;

    /// Parses `spot`, `margin` or `isolated:<SYMBOL>` (case-insensitive prefix).
    fn from_str(s: &str) -> crate::Result<Self> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "spot" => Ok(AccountType::Spot),
            "margin" => Ok(AccountType::Margin),
            _ => match lower.strip_prefix("isolated:") {
                Some(symbol) if !symbol.is_empty() => {
                    Ok(AccountType::IsolatedMargin(symbol.to_ascii_uppercase()))
                }
                _ => Err(crate::UserStreamError::Config(format!(
                    "unknown account type {s:?}, expected spot, margin or isolated:<SYMBOL>"
                ))),
            },
        }
    }
}

/// Exchange-issued token identifying one user data stream session.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ListenKey {
    #[serde(rename = "listenKey")]
    key: String,
}

impl ListenKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

// Listen keys grant read access to the account stream; keep them out of logs.
impl fmt::Debug for ListenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.key.chars().take(6).collect();
        write!(f, "ListenKey({prefix}..)")
    }
}

/// Event types found in the `e` discriminator of user data stream frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Full re-statement of changed balances (wire name: `"outboundAccountPosition"`).
    AccountPosition,
    /// Signed change of a single asset (wire name: `"balanceUpdate"`).
    BalanceUpdate,
    /// Order state transition (wire name: `"executionReport"`).
    ExecutionReport,
    /// Legacy full account event (wire name: `"outboundAccountInfo"`).
    AccountInfo,
    /// The listen key expired server-side (wire name: `"listenKeyExpired"`).
    ListenKeyExpired,
}

impl EventType {
    /// Returns the wire-format discriminator used by the exchange.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::AccountPosition => "outboundAccountPosition",
            EventType::BalanceUpdate => "balanceUpdate",
            EventType::ExecutionReport => "executionReport",
            EventType::AccountInfo => "outboundAccountInfo",
            EventType::ListenKeyExpired => "listenKeyExpired",
        }
    }

    /// Maps a wire discriminator back to an event type, `None` if unknown.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "outboundAccountPosition" => Some(EventType::AccountPosition),
            "balanceUpdate" => Some(EventType::BalanceUpdate),
            "executionReport" => Some(EventType::ExecutionReport),
            "outboundAccountInfo" => Some(EventType::AccountInfo),
            "listenKeyExpired" => Some(EventType::ListenKeyExpired),
            _ => None,
        }
    }
}
