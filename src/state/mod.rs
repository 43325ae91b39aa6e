//! In-memory mirror of the account.
//!
//! [`AccountStore`] holds balances, account flags and open orders behind a
//! single mutex. Every mutation is one short critical section, so readers
//! always observe a state where each applied event is either fully in or
//! fully out.

mod completed;
mod tracker;

use std::collections::BTreeMap;
use std::str::FromStr;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, info};

pub use completed::CompletedOrders;
pub use tracker::{OrderTracker, StaleOrder};

use crate::models::event::{BalanceDeltaEvent, ExecutionReport};
use crate::models::{AccountInfo, AccountSnapshot, Balance, Order, OrderKey};
use crate::{Result, UserStreamError};

/// Outcome of [`AccountStore::upsert_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderUpdate {
    /// The order as it stands after the report was applied.
    pub order: Order,
    /// `true` if the order reached a terminal status and left the live map.
    pub removed: bool,
}

/// Thread-safe account state shared by the dispatcher and readers.
#[derive(Debug, Default)]
pub struct AccountStore {
    inner: Mutex<AccountSnapshot>,
}

impl AccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces balances, account info and open orders in one step.
    pub fn replace_snapshot(&self, snapshot: AccountSnapshot) {
        let balances = snapshot.balances.len();
        let orders = snapshot.open_orders.len();
        *self.inner.lock() = snapshot;
        info!(balances, orders, "Account snapshot replaced");
    }

    /// Adds a signed delta to the free amount of an existing asset.
    ///
    /// Returns `Ok(false)` when the asset is unknown: only position and
    /// snapshot events introduce new assets.
    ///
    /// # Errors
    ///
    /// Returns [`UserStreamError::Parse`] if the delta is not a decimal or
    /// the sum overflows. The balance is unchanged in both cases.
    pub fn apply_balance_delta(&self, event: &BalanceDeltaEvent) -> Result<bool> {
        let raw = event.delta.trim();
        let delta = Decimal::from_str(raw.strip_prefix('+').unwrap_or(raw)).map_err(|e| {
            UserStreamError::Parse(format!(
                "invalid balance delta {:?} for {}: {e}",
                event.delta, event.asset
            ))
        })?;

        let mut state = self.inner.lock();
        let Some(balance) = state.balances.get_mut(&event.asset) else {
            debug!(asset = %event.asset, "Balance delta for unknown asset ignored");
            return Ok(false);
        };
        balance.free = balance.free.checked_add(delta).ok_or_else(|| {
            UserStreamError::Parse(format!(
                "balance delta {} overflows {} free amount {}",
                event.delta, event.asset, balance.free
            ))
        })?;
        state.info.update_time = state.info.update_time.max(event.event_time);
        Ok(true)
    }

    /// Upserts the given balances, leaving all other assets untouched.
    pub fn apply_balance_position(&self, balances: Vec<Balance>, update_time: u64) {
        let mut state = self.inner.lock();
        for balance in balances {
            state.balances.insert(balance.asset.clone(), balance);
        }
        state.info.update_time = state.info.update_time.max(update_time);
    }

    /// Replaces account info and every balance, leaving open orders untouched.
    pub fn replace_account(&self, info: AccountInfo, balances: Vec<Balance>) {
        let mut state = self.inner.lock();
        state.info = info;
        state.balances = balances
            .into_iter()
            .map(|b| (b.asset.clone(), b))
            .collect::<BTreeMap<_, _>>();
    }

    /// Applies a REST account refresh unless the stream already moved past it.
    ///
    /// Returns `false` when the refresh is older than the last applied
    /// balance update and was discarded.
    pub fn apply_account_refresh(&self, info: AccountInfo, balances: Vec<Balance>) -> bool {
        let mut state = self.inner.lock();
        if info.update_time < state.info.update_time {
            debug!(
                refresh = info.update_time,
                current = state.info.update_time,
                "Stale account refresh discarded"
            );
            return false;
        }
        state.info = info;
        for balance in balances {
            state.balances.insert(balance.asset.clone(), balance);
        }
        true
    }

    /// Inserts or updates the order an execution report refers to.
    ///
    /// When the new status is terminal the order is removed from the live
    /// map and returned with `removed = true` so the caller can archive it.
    pub fn upsert_order(&self, report: &ExecutionReport) -> OrderUpdate {
        let order = report.to_order();
        let key = order.key();
        let mut state = self.inner.lock();

        if order.status.is_terminal() {
            state.open_orders.remove(&key);
            return OrderUpdate {
                order,
                removed: true,
            };
        }

        state.open_orders.insert(key, order.clone());
        OrderUpdate {
            order,
            removed: false,
        }
    }

    /// Copy of the whole account state.
    pub fn snapshot(&self) -> AccountSnapshot {
        self.inner.lock().clone()
    }

    pub fn account_info(&self) -> AccountInfo {
        self.inner.lock().info.clone()
    }

    pub fn balances(&self) -> Vec<Balance> {
        self.inner.lock().balances.values().cloned().collect()
    }

    pub fn balance(&self, asset: &str) -> Option<Balance> {
        self.inner.lock().balances.get(asset).cloned()
    }

    /// Open orders sorted by symbol, then order id.
    pub fn open_orders(&self) -> Vec<Order> {
        self.inner.lock().open_orders.values().cloned().collect()
    }

    /// Looks up a live order.
    ///
    /// # Errors
    ///
    /// Returns [`UserStreamError::NotFound`] if the order is not open.
    pub fn order_status(&self, symbol: &str, order_id: i64) -> Result<Order> {
        let key = OrderKey::new(symbol, order_id);
        self.inner
            .lock()
            .open_orders
            .get(&key)
            .cloned()
            .ok_or_else(|| UserStreamError::NotFound {
                symbol: symbol.to_string(),
                order_id,
            })
    }
}
