//! Short-lived archive of orders that reached a terminal status.
//!
//! Status queries that race the removal from the live map still find the
//! order here until its entry expires.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::{Order, OrderKey};

#[derive(Debug)]
pub struct CompletedOrders {
    ttl: Duration,
    entries: Mutex<HashMap<OrderKey, (Order, Instant)>>,
}

impl CompletedOrders {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Archives a completed order, dropping expired entries on the way.
    pub fn insert(&self, order: Order) {
        self.insert_at(order, Instant::now());
    }

    pub fn get(&self, symbol: &str, order_id: i64) -> Option<Order> {
        self.get_at(&OrderKey::new(symbol, order_id), Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert_at(&self, order: Order, now: Instant) {
        let mut entries = self.entries.lock();
        entries.retain(|_, (_, at)| now.saturating_duration_since(*at) < self.ttl);
        entries.insert(order.key(), (order, now));
    }

    fn get_at(&self, key: &OrderKey, now: Instant) -> Option<Order> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|(_, at)| now.saturating_duration_since(*at) < self.ttl)
            .map(|(order, _)| order.clone())
    }
}
