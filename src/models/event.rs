//! User data stream event models.
//!
//! Every frame carries an `e` discriminator; [`UserEvent::from_frame`]
//! switches on it once and decodes the matching payload.

use rust_decimal::Decimal;
use serde::Deserialize;

use super::EventType;
use super::account::{AccountInfo, Balance};
use super::order::{Order, OrderStatus, no_order_list};
use crate::UserStreamError;

/// Balance entry inside `outboundAccountPosition` / `outboundAccountInfo`.
#[derive(Debug, Clone, Deserialize)]
pub struct PayloadBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f")]
    pub free: Decimal,
    #[serde(rename = "l")]
    pub locked: Decimal,
}

impl From<PayloadBalance> for Balance {
    fn from(b: PayloadBalance) -> Self {
        Balance {
            asset: b.asset,
            free: b.free,
            locked: b.locked,
        }
    }
}

/// `outboundAccountPosition`: balances that changed, restated in full.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPositionEvent {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "u")]
    pub last_update: u64,
    #[serde(rename = "B")]
    pub balances: Vec<PayloadBalance>,
}

/// `balanceUpdate`: deposit, withdrawal or transfer of a single asset.
///
/// The delta is kept as the raw decimal string; the store parses it.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceDeltaEvent {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "d")]
    pub delta: String,
    #[serde(rename = "T")]
    pub clear_time: u64,
}

/// `executionReport`: an order changed state.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionReport {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "c")]
    pub client_order_id: String,
    #[serde(rename = "S")]
    pub side: String,
    #[serde(rename = "o")]
    pub order_type: String,
    #[serde(rename = "f")]
    pub time_in_force: String,
    #[serde(rename = "q")]
    pub quantity: Decimal,
    #[serde(rename = "p")]
    pub price: Decimal,
    #[serde(rename = "P", default)]
    pub stop_price: Decimal,
    #[serde(rename = "F", default)]
    pub iceberg_quantity: Decimal,
    #[serde(rename = "g", default = "no_order_list")]
    pub order_list_id: i64,
    /// Client id of the order being canceled, empty otherwise.
    #[serde(rename = "C", default)]
    pub original_client_order_id: String,
    #[serde(rename = "x")]
    pub execution_type: String,
    #[serde(rename = "X")]
    pub status: OrderStatus,
    #[serde(rename = "r", default)]
    pub reject_reason: String,
    #[serde(rename = "i")]
    pub order_id: i64,
    #[serde(rename = "l", default)]
    pub last_executed_quantity: Decimal,
    #[serde(rename = "z")]
    pub cumulative_filled_quantity: Decimal,
    #[serde(rename = "L", default)]
    pub last_executed_price: Decimal,
    #[serde(rename = "n", default)]
    pub commission_amount: Decimal,
    #[serde(rename = "N", default)]
    pub commission_asset: Option<String>,
    #[serde(rename = "T")]
    pub transaction_time: i64,
    #[serde(rename = "t", default)]
    pub trade_id: i64,
    #[serde(rename = "w", default)]
    pub is_working: bool,
    #[serde(rename = "O")]
    pub order_creation_time: i64,
    #[serde(rename = "Z", default)]
    pub cumulative_quote_quantity: Decimal,
    #[serde(rename = "Q", default)]
    pub quote_order_quantity: Decimal,
}

impl ExecutionReport {
    /// Order record reflecting this report.
    ///
    /// Cancel reports carry the canceled order's client id in `C`; that id
    /// is preferred so the record keeps the id the order was placed with.
    pub fn to_order(&self) -> Order {
        let client_order_id = if self.original_client_order_id.is_empty() {
            self.client_order_id.clone()
        } else {
            self.original_client_order_id.clone()
        };

        Order {
            symbol: self.symbol.clone(),
            order_id: self.order_id,
            order_list_id: self.order_list_id,
            client_order_id,
            price: self.price,
            orig_qty: self.quantity,
            executed_qty: self.cumulative_filled_quantity,
            cummulative_quote_qty: self.cumulative_quote_quantity,
            status: self.status,
            time_in_force: self.time_in_force.clone(),
            order_type: self.order_type.clone(),
            side: self.side.clone(),
            stop_price: self.stop_price,
            iceberg_qty: self.iceberg_quantity,
            time: self.order_creation_time,
            update_time: self.transaction_time,
            is_working: self.is_working,
            orig_quote_order_qty: self.quote_order_quantity,
        }
    }
}

/// `outboundAccountInfo`: legacy event restating the whole account.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfoEvent {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "m")]
    pub maker_commission: i64,
    #[serde(rename = "t")]
    pub taker_commission: i64,
    #[serde(rename = "b")]
    pub buyer_commission: i64,
    #[serde(rename = "s")]
    pub seller_commission: i64,
    #[serde(rename = "T")]
    pub can_trade: bool,
    #[serde(rename = "W")]
    pub can_withdraw: bool,
    #[serde(rename = "D")]
    pub can_deposit: bool,
    #[serde(rename = "u")]
    pub last_update: u64,
    #[serde(rename = "B")]
    pub balances: Vec<PayloadBalance>,
    #[serde(rename = "P", default)]
    pub permissions: Vec<String>,
}

impl AccountInfoEvent {
    pub fn into_parts(self) -> (AccountInfo, Vec<Balance>) {
        let permissions = if self.permissions.is_empty() {
            vec!["SPOT".to_string()]
        } else {
            self.permissions
        };
        let info = AccountInfo {
            account_type: "SPOT".to_string(),
            maker_commission: self.maker_commission,
            taker_commission: self.taker_commission,
            buyer_commission: self.buyer_commission,
            seller_commission: self.seller_commission,
            can_trade: self.can_trade,
            can_withdraw: self.can_withdraw,
            can_deposit: self.can_deposit,
            permissions,
            update_time: self.last_update,
        };
        let balances = self.balances.into_iter().map(Balance::from).collect();
        (info, balances)
    }
}

/// `listenKeyExpired`: the session token is no longer valid.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenKeyExpiredEvent {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "listenKey", default)]
    pub listen_key: String,
}

/// A decoded user data stream event.
#[derive(Debug, Clone)]
pub enum UserEvent {
    AccountPosition(AccountPositionEvent),
    BalanceDelta(BalanceDeltaEvent),
    Execution(Box<ExecutionReport>),
    AccountInfo(AccountInfoEvent),
    ListenKeyExpired(ListenKeyExpiredEvent),
}

impl UserEvent {
    /// Decodes a raw frame.
    ///
    /// Returns `Ok(None)` for event types this crate does not handle.
    ///
    /// # Errors
    ///
    /// Returns [`UserStreamError::Json`] if the frame is not JSON or the
    /// payload does not match its event type, and
    /// [`UserStreamError::Parse`] if the `e` discriminator is missing.
    pub fn from_frame(frame: &str) -> crate::Result<Option<Self>> {
        let value: serde_json::Value = serde_json::from_str(frame)?;
        let event = value
            .get("e")
            .and_then(|e| e.as_str())
            .ok_or_else(|| UserStreamError::Parse("missing event type field \"e\"".into()))?;

        let Some(event_type) = EventType::from_wire(event) else {
            return Ok(None);
        };

        let event = match event_type {
            EventType::AccountPosition => UserEvent::AccountPosition(serde_json::from_value(value)?),
            EventType::BalanceUpdate => UserEvent::BalanceDelta(serde_json::from_value(value)?),
            EventType::ExecutionReport => {
                UserEvent::Execution(Box::new(serde_json::from_value(value)?))
            }
            EventType::AccountInfo => UserEvent::AccountInfo(serde_json::from_value(value)?),
            EventType::ListenKeyExpired => {
                UserEvent::ListenKeyExpired(serde_json::from_value(value)?)
            }
        };
        Ok(Some(event))
    }

    pub fn event_type(&self) -> EventType {
        match self {
            UserEvent::AccountPosition(_) => EventType::AccountPosition,
            UserEvent::BalanceDelta(_) => EventType::BalanceUpdate,
            UserEvent::Execution(_) => EventType::ExecutionReport,
            UserEvent::AccountInfo(_) => EventType::AccountInfo,
            UserEvent::ListenKeyExpired(_) => EventType::ListenKeyExpired,
        }
    }
}
