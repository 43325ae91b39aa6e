//! Account and balance models.
//!
//! Covers the REST account responses for spot, cross margin and isolated
//! margin wallets, and the normalized [`AccountSnapshot`] they are folded
//! into before being handed to the state store.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{Order, OrderKey};

/// Free and locked amounts of a single asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Balance {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
}

/// Account-level flags and commissions, everything but balances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountInfo {
    pub account_type: String,
    pub maker_commission: i64,
    pub taker_commission: i64,
    pub buyer_commission: i64,
    pub seller_commission: i64,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    pub permissions: Vec<String>,
    /// Exchange time (ms) of the last account change reflected here.
    pub update_time: u64,
}

/// Normalized account state: the unit the store replaces atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountSnapshot {
    pub info: AccountInfo,
    pub balances: BTreeMap<String, Balance>,
    pub open_orders: BTreeMap<OrderKey, Order>,
}

impl AccountSnapshot {
    /// Builds a snapshot from account info, balances and open orders.
    pub fn new(
        info: AccountInfo,
        balances: impl IntoIterator<Item = Balance>,
        orders: impl IntoIterator<Item = Order>,
    ) -> Self {
        Self {
            info,
            balances: balances
                .into_iter()
                .map(|b| (b.asset.clone(), b))
                .collect(),
            open_orders: orders.into_iter().map(|o| (o.key(), o)).collect(),
        }
    }
}

/// Response of `GET /api/v3/account`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpotAccountResponse {
    pub maker_commission: i64,
    pub taker_commission: i64,
    pub buyer_commission: i64,
    pub seller_commission: i64,
    pub can_trade: bool,
    pub can_withdraw: bool,
    pub can_deposit: bool,
    pub update_time: u64,
    pub account_type: String,
    pub balances: Vec<Balance>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl SpotAccountResponse {
    /// Splits the response into account info and balances.
    pub fn into_parts(self) -> (AccountInfo, Vec<Balance>) {
        let info = AccountInfo {
            account_type: self.account_type,
            maker_commission: self.maker_commission,
            taker_commission: self.taker_commission,
            buyer_commission: self.buyer_commission,
            seller_commission: self.seller_commission,
            can_trade: self.can_trade,
            can_withdraw: self.can_withdraw,
            can_deposit: self.can_deposit,
            permissions: self.permissions,
            update_time: self.update_time,
        };
        (info, self.balances)
    }
}

/// Response of `GET /sapi/v1/margin/account`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginAccountResponse {
    pub borrow_enabled: bool,
    pub trade_enabled: bool,
    pub transfer_enabled: bool,
    pub margin_level: Decimal,
    pub user_assets: Vec<MarginAsset>,
}

/// One asset of a margin account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarginAsset {
    pub asset: String,
    pub free: Decimal,
    pub locked: Decimal,
    #[serde(default)]
    pub borrowed: Decimal,
    #[serde(default)]
    pub interest: Decimal,
    #[serde(default)]
    pub net_asset: Decimal,
}

impl MarginAsset {
    fn into_balance(self) -> Balance {
        Balance {
            asset: self.asset,
            free: self.free,
            locked: self.locked,
        }
    }
}

impl MarginAccountResponse {
    /// Splits the response into account info and balances.
    ///
    /// The margin endpoint carries no update time, so the caller supplies
    /// the time the request was sent.
    pub fn into_parts(self, update_time: u64) -> (AccountInfo, Vec<Balance>) {
        let info = AccountInfo {
            account_type: "MARGIN".to_string(),
            update_time,
            can_trade: self.trade_enabled,
            can_withdraw: self.transfer_enabled,
            can_deposit: self.transfer_enabled,
            permissions: vec!["MARGIN".to_string()],
            ..AccountInfo::default()
        };
        let balances = self
            .user_assets
            .into_iter()
            .map(MarginAsset::into_balance)
            .collect();
        (info, balances)
    }
}

/// Response of `GET /sapi/v1/margin/isolated/account`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolatedAccountResponse {
    pub assets: Vec<IsolatedPair>,
}

/// Base and quote assets of one isolated margin pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolatedPair {
    pub symbol: String,
    pub base_asset: MarginAsset,
    pub quote_asset: MarginAsset,
    #[serde(default)]
    pub trade_enabled: bool,
}

impl IsolatedAccountResponse {
    /// Splits the response into account info and balances.
    ///
    /// Both legs of every pair are flattened into one balance list.
    /// `update_time` stamps the info as for [`MarginAccountResponse`].
    pub fn into_parts(self, update_time: u64) -> (AccountInfo, Vec<Balance>) {
        let can_trade = self.assets.iter().any(|p| p.trade_enabled);
        let info = AccountInfo {
            account_type: "ISOLATED_MARGIN".to_string(),
            update_time,
            can_trade,
            permissions: vec!["ISOLATED_MARGIN".to_string()],
            ..AccountInfo::default()
        };
        let balances = self
            .assets
            .into_iter()
            .flat_map(|p| [p.base_asset.into_balance(), p.quote_asset.into_balance()])
            .collect();
        (info, balances)
    }
}
