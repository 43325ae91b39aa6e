//! Outstanding orders waiting for their first stream confirmation.
//!
//! Orders are pushed when submitted locally and popped when an execution
//! report for them arrives. The watchdog polls [`OrderTracker::check`];
//! an entry older than the threshold means the stream has likely stalled.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::OrderKey;

/// The oldest unconfirmed order of a staleness episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleOrder {
    pub key: OrderKey,
    pub age: Duration,
    /// Number of entries dropped together with this one.
    pub dropped: usize,
}

/// Submission-ordered watch list, oldest entry first.
#[derive(Debug, Default)]
pub struct OrderTracker {
    pending: Mutex<VecDeque<(OrderKey, Instant)>>,
}

impl OrderTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts watching an order submitted just now.
    pub fn track(&self, key: OrderKey) {
        self.track_at(key, Instant::now());
    }

    pub fn track_at(&self, key: OrderKey, submitted_at: Instant) {
        let mut pending = self.pending.lock();
        // Keep oldest-first even if a caller passes an earlier timestamp.
        let pos = pending
            .iter()
            .rposition(|(_, at)| *at <= submitted_at)
            .map_or(0, |i| i + 1);
        pending.insert(pos, (key, submitted_at));
    }

    /// Stops watching an order; returns `false` if it was not tracked.
    pub fn confirm(&self, key: &OrderKey) -> bool {
        let mut pending = self.pending.lock();
        match pending.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                pending.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drops entries a fresh snapshot already accounts for.
    ///
    /// An order tracked before `taken_at` is either in the snapshot or
    /// finished before it was taken; either way the stream owes no report
    /// for it. Later entries are dropped only if `in_snapshot` holds.
    /// Returns the number of entries removed.
    pub fn reconcile(&self, taken_at: Instant, in_snapshot: impl Fn(&OrderKey) -> bool) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|(key, at)| *at > taken_at && !in_snapshot(key));
        before - pending.len()
    }

    /// Reports a staleness episode if the oldest entry exceeds `threshold`.
    ///
    /// All entries past the threshold are dropped in the same call, so one
    /// episode is reported once. The snapshot taken by the following
    /// bootstrap covers whatever those orders did in the meantime.
    pub fn check(&self, now: Instant, threshold: Duration) -> Option<StaleOrder> {
        let mut pending = self.pending.lock();
        let (key, submitted_at) = pending.front()?.clone();
        let age = now.saturating_duration_since(submitted_at);
        if age <= threshold {
            return None;
        }

        let mut dropped = 0;
        while let Some((_, at)) = pending.front() {
            if now.saturating_duration_since(*at) <= threshold {
                break;
            }
            pending.pop_front();
            dropped += 1;
        }
        Some(StaleOrder { key, age, dropped })
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
